//! Native command-line parsing for the stop prompt.

use thiserror::Error;

use crate::engine::StepKind;

/// Help text printed by `h` / `help`.
pub const HELP: &str = "\
Commands:
  c, cont, continue     resume until the next breakpoint
  s, step               stop at the next line, entering calls
  n, next               stop at the next line in this frame
  r, return             stop after the current frame returns
  q, quit, exit         stop debugging and let the program finish
  p <expr>              evaluate an expression in the current frame
  b [path:]line         set a breakpoint
  cl [path:]line        clear a breakpoint
  w, where, bt          print the stack
  h, help               show this help";

/// A breakpoint location as typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source path; `None` means the current frame's file.
    pub path: Option<String>,
    pub line: i64,
}

/// One parsed prompt command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Resume(StepKind),
    Quit,
    Print(String),
    Break(Location),
    Clear(Location),
    Where,
    Help,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'h' for help")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid location '{0}': expected [path:]line")]
    InvalidLocation(String),
}

/// Parse one line typed at the prompt.
pub fn parse(input: &str) -> Result<Command, CommandError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Command::Empty);
    }
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (input, ""),
    };

    let cmd = match word {
        "c" | "cont" | "continue" => Command::Resume(StepKind::Continue),
        "s" | "step" => Command::Resume(StepKind::Step),
        "n" | "next" => Command::Resume(StepKind::Next),
        "r" | "return" => Command::Resume(StepKind::Return),
        "q" | "quit" | "exit" => Command::Quit,
        "w" | "where" | "bt" => Command::Where,
        "h" | "help" => Command::Help,
        "p" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("p"));
            }
            Command::Print(rest.to_string())
        }
        "b" | "break" => Command::Break(parse_location("b", rest)?),
        "cl" | "clear" => Command::Clear(parse_location("cl", rest)?),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(cmd)
}

fn parse_location(cmd: &'static str, arg: &str) -> Result<Location, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument(cmd));
    }
    // rsplit keeps drive letters and colons inside the path intact.
    let (path, line) = match arg.rsplit_once(':') {
        Some((path, line)) => (Some(path.trim().to_string()), line.trim()),
        None => (None, arg),
    };
    let line = line
        .parse::<i64>()
        .ok()
        .filter(|l| *l > 0)
        .ok_or_else(|| CommandError::InvalidLocation(arg.to_string()))?;
    if matches!(&path, Some(p) if p.is_empty()) {
        return Err(CommandError::InvalidLocation(arg.to_string()));
    }
    Ok(Location { path, line })
}
