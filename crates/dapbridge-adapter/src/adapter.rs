//! The adapter: owns the engine, the session and the network thread.
//!
//! ```ignore
//! let adapter = Adapter::new(&config.adapter)?;
//! adapter.start()?;
//! adapter.launch("main", |probe| run_program(&probe))?;
//! adapter.wait();
//! adapter.shutdown()?;
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};

use dapbridge_config::AdapterConfig;
use dapbridge_engine::{
    build_engine, BackendKind, DebuggerBridge, ExitReason, Frame, Probe, ScriptHandle, StepKind,
    StopReason, UpcallResult, Upcalls,
};
use dapbridge_protocol::StopReason as WireStopReason;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::dispatcher::Dispatcher;
use crate::error::{display_addr, AdapterError, SessionError};
use crate::notifier::{Notification, Notifier};
use crate::server::NetContext;
use crate::session::{Session, SessionState};

/// Path reported for the root frame `launch` pushes.
pub const LAUNCH_PATH: &str = "<launch>";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn wire_reason(reason: StopReason) -> WireStopReason {
    match reason {
        StopReason::Breakpoint => WireStopReason::Breakpoint,
        StopReason::Step => WireStopReason::Step,
        StopReason::Entry => WireStopReason::Entry,
    }
}

/// Engine upcalls: move the session, then hand the event to the network.
struct AdapterUpcalls {
    session: Arc<Mutex<Session>>,
    notifier: Arc<Notifier>,
}

impl Upcalls for AdapterUpcalls {
    fn on_stop(&self, frame: Arc<Frame>, reason: StopReason) -> UpcallResult {
        lock(&self.session).on_stop()?;
        self.notifier.stopped(frame, wire_reason(reason));
        Ok(())
    }

    fn on_resume(&self, kind: StepKind) -> UpcallResult {
        lock(&self.session).on_resume()?;
        tracing::debug!(kind = kind.as_str(), "debuggee resumed");
        self.notifier.continued();
        Ok(())
    }

    fn on_exit(&self, reason: ExitReason) -> UpcallResult {
        match lock(&self.session).on_exit() {
            Ok(()) => {}
            Err(SessionError::Closed) => {
                tracing::debug!(%reason, "debuggee exited after shutdown");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(%reason, "debuggee exited");
        // The network context sends exited, then terminated, then closes.
        self.notifier.exited(reason.exit_code());
        Ok(())
    }
}

/// A DAP server bound to one stepping engine.
pub struct Adapter {
    config: AdapterConfig,
    backend: BackendKind,
    bridge: DebuggerBridge,
    probe: Probe,
    script: Option<ScriptHandle>,
    session: Arc<Mutex<Session>>,
    notifier: Arc<Notifier>,
    notifications: Mutex<Option<UnboundedReceiver<Notification>>>,
    addrs: OnceLock<(SocketAddr, Option<SocketAddr>)>,
    net: Mutex<Option<JoinHandle<()>>>,
    debuggee: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown: AtomicBool,
}

impl Adapter {
    /// Build the engine named by `config.backend`. Nothing is bound yet.
    pub fn new(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let backend: BackendKind = config.backend.parse()?;
        let (engine, script) = build_engine(backend);

        let session = Arc::new(Mutex::new(Session::new()));
        let (notifier, notifications) = Notifier::channel();
        let notifier = Arc::new(notifier);
        let upcalls = Arc::new(AdapterUpcalls {
            session: Arc::clone(&session),
            notifier: Arc::clone(&notifier),
        });
        let bridge = DebuggerBridge::new(Arc::clone(&engine), upcalls);

        Ok(Self {
            config: config.clone(),
            backend,
            bridge,
            probe: Probe::new(engine),
            script,
            session,
            notifier,
            notifications: Mutex::new(Some(notifications)),
            addrs: OnceLock::new(),
            net: Mutex::new(None),
            debuggee: Mutex::new(None),
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Bind the listener (and the trigger listener, if configured) and
    /// start the network thread. Returns the bound address.
    pub fn start(&self) -> Result<SocketAddr, AdapterError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AdapterError::AlreadyStarted);
        }
        let result = self.spawn_network();
        if result.is_err() {
            self.started.store(false, Ordering::SeqCst);
        }
        result
    }

    fn spawn_network(&self) -> Result<SocketAddr, AdapterError> {
        let listener = bind(&self.config.host, self.config.port)?;
        let local = listener.local_addr()?;
        let trigger = match self.config.trigger_port {
            Some(port) => Some(bind(&self.config.host, port)?),
            None => None,
        };
        let trigger_addr = match &trigger {
            Some(t) => Some(t.local_addr()?),
            None => None,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(AdapterError::Runtime)?;

        let Some(notifications) = lock(&self.notifications).take() else {
            return Err(AdapterError::AlreadyStarted);
        };

        if let Err(e) = lock(&self.session).listen(local) {
            tracing::warn!(error = %e, "session did not enter listening state");
        }

        let context = NetContext {
            listener,
            trigger,
            session: Arc::clone(&self.session),
            dispatcher: Dispatcher::new(self.bridge.clone(), Arc::clone(&self.session)),
            bridge: self.bridge.clone(),
            notifications,
        };
        let handle = context.spawn(runtime)?;
        *lock(&self.net) = Some(handle);
        let _ = self.addrs.set((local, trigger_addr));

        tracing::info!(
            addr = %local,
            trigger = %display_addr(trigger_addr),
            backend = self.backend.as_str(),
            "adapter listening"
        );
        Ok(local)
    }

    /// Run `program` on a new debuggee thread under a root frame `name`.
    ///
    /// The engine reports `finished` when `program` returns.
    pub fn launch<F>(&self, name: &str, program: F) -> Result<(), AdapterError>
    where
        F: FnOnce(Probe) + Send + 'static,
    {
        let mut slot = lock(&self.debuggee);
        if slot.is_some() {
            return Err(AdapterError::AlreadyStarted);
        }
        let probe = self.probe.clone();
        let name = name.to_string();
        let handle = thread::Builder::new()
            .name("dapbridge-debuggee".into())
            .spawn(move || {
                let _root = probe.enter(&name, LAUNCH_PATH, 0);
                program(probe.clone());
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Wait for the launched debuggee to return.
    pub fn wait(&self) {
        let handle = lock(&self.debuggee).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("debuggee thread panicked");
            }
        }
    }

    /// Tear everything down.
    ///
    /// Sends `terminated` if it has not gone out yet, closes the client
    /// and the listener, interrupts and joins the debuggee, then drops
    /// the notifier. Repeated calls return `Ok`.
    pub fn shutdown(&self) -> Result<(), AdapterError> {
        if self.on_debuggee_thread() {
            return Err(AdapterError::ShutdownMisuse(
                "shutdown called on the debuggee thread",
            ));
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(AdapterError::ShutdownMisuse("adapter was never started"));
        }
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("adapter shutting down");

        self.notifier.shutdown();
        let net = lock(&self.net).take();
        if let Some(net) = net {
            if net.join().is_err() {
                tracing::error!("network thread panicked");
            }
        }

        if let Err(e) = lock(&self.session).close() {
            tracing::debug!(error = %e, "session already closed");
        }

        if let Err(e) = self.bridge.interrupt() {
            tracing::debug!(error = %e, "interrupt not delivered");
        }
        self.wait();

        self.notifier.close();
        tracing::info!("adapter shut down");
        Ok(())
    }

    fn on_debuggee_thread(&self) -> bool {
        if self.bridge.on_debugger_context() {
            return true;
        }
        let current = thread::current().id();
        lock(&self.debuggee)
            .as_ref()
            .is_some_and(|h| h.thread().id() == current)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn bridge(&self) -> &DebuggerBridge {
        &self.bridge
    }

    /// Probe for instrumenting the debuggee.
    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    /// Native command handle, for the `script` backend only.
    pub fn script(&self) -> Option<&ScriptHandle> {
        self.script.as_ref()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addrs.get().map(|(addr, _)| *addr)
    }

    pub fn trigger_addr(&self) -> Option<SocketAddr> {
        self.addrs.get().and_then(|(_, trigger)| *trigger)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) && !self.is_shut_down() {
            if let Err(e) = self.shutdown() {
                tracing::debug!(error = %e, "shutdown on drop skipped");
            }
        }
    }
}

fn bind(host: &str, port: u16) -> Result<TcpListener, AdapterError> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).map_err(|e| AdapterError::bind(&addr, e))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}
