//! dapbridge-adapter: serves one DAP client over TCP on behalf of a
//! stepping engine that runs on the debuggee's own thread.
//!
//! The network side lives on a dedicated `dapbridge-net` thread running a
//! current-thread tokio runtime. Everything that crosses between it and
//! the debuggee goes through the [`Notifier`] channel or a short mutex
//! hold on the [`Session`].

pub mod adapter;
pub mod dispatcher;
pub mod error;
pub mod global;
pub mod notifier;
mod server;
pub mod session;

pub use adapter::Adapter;
pub use dispatcher::{Dispatcher, Reply};
pub use error::{AdapterError, DispatchError, SessionError};
pub use notifier::{Notification, Notifier};
pub use session::{Session, SessionState};
