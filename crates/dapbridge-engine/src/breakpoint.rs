//! Breakpoint table shared between the debuggee thread and the adapter.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Breakpoint lines per source path, as stored.
pub type BreakMap = BTreeMap<String, BTreeSet<i64>>;

/// Line breakpoints keyed by source path; unique per (path, line).
#[derive(Debug, Clone, Default)]
pub struct BreakTable {
    breaks: BreakMap,
}

impl BreakTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint. Returns `false` if it already existed.
    pub fn set(&mut self, path: &str, line: i64) -> bool {
        self.breaks.entry(path.to_string()).or_default().insert(line)
    }

    /// Remove a breakpoint at the given path and line.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn clear(&mut self, path: &str, line: i64) -> bool {
        let Some(lines) = self.breaks.get_mut(path) else {
            return false;
        };
        let removed = lines.remove(&line);
        if lines.is_empty() {
            self.breaks.remove(path);
        }
        removed
    }

    /// Whether execution at (`path`, `line`) should stop.
    ///
    /// Paths match when one ends with the other on a component boundary,
    /// so a client's absolute path hits a probe's crate-relative `file!()`.
    pub fn hits(&self, path: &str, line: i64) -> bool {
        self.breaks
            .iter()
            .any(|(bp_path, lines)| lines.contains(&line) && paths_match(bp_path, path))
    }

    /// Snapshot of every breakpoint.
    pub fn all(&self) -> BreakMap {
        self.breaks.clone()
    }
}

/// Component-wise suffix match between two source paths.
pub fn paths_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (a, b) = (Path::new(a), Path::new(b));
    a.ends_with(b) || b.ends_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(table: &BreakTable) -> usize {
        table.all().values().map(BTreeSet::len).sum()
    }

    fn lines(table: &BreakTable, path: &str) -> Vec<i64> {
        table.all().get(path).map(|l| l.iter().copied().collect()).unwrap_or_default()
    }

    #[test]
    fn breakpoint_set_is_unique() {
        let mut table = BreakTable::new();
        assert!(table.set("a.py", 5));
        assert!(!table.set("a.py", 5));
        assert_eq!(count(&table), 1);
    }

    #[test]
    fn breakpoint_clear() {
        let mut table = BreakTable::new();
        table.set("main.rs", 10);
        table.set("main.rs", 20);

        assert!(table.clear("main.rs", 10));
        assert_eq!(lines(&table, "main.rs"), vec![20]);
        assert!(!table.clear("main.rs", 999));
        assert!(!table.clear("other.rs", 20));
    }

    #[test]
    fn breakpoint_clear_last_drops_path() {
        let mut table = BreakTable::new();
        table.set("single.rs", 1);
        assert!(table.clear("single.rs", 1));
        assert!(table.all().is_empty());
    }

    #[test]
    fn breakpoint_multiple_files() {
        let mut table = BreakTable::new();
        table.set("a.rs", 2);
        table.set("a.rs", 1);
        table.set("b.rs", 10);

        let all = table.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a.rs"].iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(count(&table), 3);
    }

    #[test]
    fn breakpoint_hits_on_path_suffix() {
        let mut table = BreakTable::new();
        table.set("/home/dev/demo/src/main.rs", 12);
        assert!(table.hits("src/main.rs", 12));
        assert!(!table.hits("src/main.rs", 13));
        assert!(!table.hits("src/lib.rs", 12));
    }

    #[test]
    fn paths_match_requires_component_boundary() {
        assert!(paths_match("src/main.rs", "/x/src/main.rs"));
        assert!(!paths_match("ain.rs", "src/main.rs"));
        assert!(paths_match("a.py", "a.py"));
    }
}
