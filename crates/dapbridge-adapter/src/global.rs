//! Process-wide adapter.
//!
//! Programs that want a debugger without threading an [`Adapter`] through
//! their code call [`set_trace`] at the point they want to stop; the
//! adapter is created from the default configuration on first use.

use std::sync::{Arc, Mutex, MutexGuard};

use dapbridge_config::{AdapterConfig, Config};
use dapbridge_engine::Probe;

use crate::adapter::Adapter;
use crate::error::AdapterError;

static GLOBAL: Mutex<Option<Arc<Adapter>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<Adapter>>> {
    GLOBAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// Create and start the process-wide adapter.
pub fn init(config: &AdapterConfig) -> Result<Arc<Adapter>, AdapterError> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(AdapterError::AlreadyStarted);
    }
    let adapter = Arc::new(Adapter::new(config)?);
    adapter.start()?;
    *slot = Some(Arc::clone(&adapter));
    Ok(adapter)
}

/// The process-wide adapter, if one is running.
pub fn get() -> Option<Arc<Adapter>> {
    slot().clone()
}

/// The process-wide adapter, started from `Config::default()` if needed.
pub fn get_or_init() -> Result<Arc<Adapter>, AdapterError> {
    if let Some(adapter) = get() {
        return Ok(adapter);
    }
    match init(&Config::default().adapter) {
        // Lost a race with another initializer.
        Err(AdapterError::AlreadyStarted) => get().ok_or(AdapterError::AlreadyStarted),
        other => other,
    }
}

/// Stop at the next line the calling thread reports through the returned
/// probe.
pub fn set_trace() -> Result<Probe, AdapterError> {
    let probe = get_or_init()?.probe();
    probe.set_trace();
    Ok(probe)
}

/// Shut down and forget the process-wide adapter. A no-op if none exists.
///
/// A refused shutdown (from the debuggee thread, say) leaves the adapter
/// installed so another thread can tear it down.
pub fn teardown() -> Result<(), AdapterError> {
    let Some(adapter) = slot().take() else {
        return Ok(());
    };
    match adapter.shutdown() {
        Err(AdapterError::ShutdownMisuse(why)) => {
            let mut slot = slot();
            if slot.is_none() {
                *slot = Some(adapter);
            }
            Err(AdapterError::ShutdownMisuse(why))
        }
        other => other,
    }
}
