//! The network context: listener, single client, event delivery.
//!
//! All socket writes happen in [`NetContext::run`]'s select loop, which
//! is what keeps responses and events in order. The client's reader runs
//! as a separate task and only forwards decoded messages back into the
//! loop.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use dapbridge_engine::DebuggerBridge;
use dapbridge_protocol::{read_message, write_message, CodecError, Event, Request};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::notifier::Notification;
use crate::session::Session;

/// How long a trigger connection may take to send its line.
const TRIGGER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Line a trigger client sends to arm tracing.
const TRIGGER_COMMAND: &str = "START";

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// Everything the network thread owns.
pub(crate) struct NetContext {
    pub(crate) listener: std::net::TcpListener,
    pub(crate) trigger: Option<std::net::TcpListener>,
    pub(crate) session: Arc<Mutex<Session>>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) bridge: DebuggerBridge,
    pub(crate) notifications: UnboundedReceiver<Notification>,
}

/// Input forwarded from a client's reader task.
enum ClientInput {
    Message { id: u64, value: Value },
    Closed { id: u64, error: CodecError },
}

struct Client {
    id: u64,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

/// Loop state that select branches mutate.
struct Connection {
    session: Arc<Mutex<Session>>,
    client: Option<Client>,
    next_id: u64,
}

impl NetContext {
    /// Run the loop on a new `dapbridge-net` thread.
    pub(crate) fn spawn(self, runtime: Runtime) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("dapbridge-net".into())
            .spawn(move || runtime.block_on(self.run()))
    }

    async fn run(self) {
        let NetContext {
            listener,
            trigger,
            session,
            dispatcher,
            bridge,
            mut notifications,
        } = self;

        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "failed to register listener");
                return;
            }
        };
        let trigger = trigger.and_then(|t| match TcpListener::from_std(t) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::error!(error = %e, "failed to register trigger listener");
                None
            }
        });

        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let mut conn = Connection {
            session,
            client: None,
            next_id: 0,
        };

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => conn.accept(stream, peer, &input_tx),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                Some(input) = input_rx.recv() => match input {
                    ClientInput::Message { id, value } => {
                        conn.handle_message(id, value, &dispatcher).await;
                    }
                    ClientInput::Closed { id, error } => conn.reader_closed(id, error).await,
                },
                note = notifications.recv() => match note {
                    Some(Notification::Exited { exit_code }) => {
                        conn.send(&Event::exited(exit_code)).await;
                        break;
                    }
                    Some(Notification::Shutdown) | None => break,
                    Some(note) => conn.deliver(note).await,
                },
                accepted = accept_optional(trigger.as_ref()) => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_trigger(stream, peer, bridge.clone()));
                    }
                    Err(e) => tracing::warn!(error = %e, "trigger accept failed"),
                },
            }
        }

        conn.finish().await;
        tracing::info!("network context stopped");
    }
}

impl Connection {
    fn accept(&mut self, stream: TcpStream, peer: SocketAddr, input: &UnboundedSender<ClientInput>) {
        if !lock(&self.session).connect(peer) {
            tracing::warn!(%peer, "rejecting connection: a client is already attached");
            drop(stream);
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }

        self.next_id += 1;
        let id = self.next_id;
        let (read_half, writer) = stream.into_split();
        let reader = tokio::spawn(read_loop(id, read_half, input.clone()));
        self.client = Some(Client {
            id,
            peer,
            writer,
            reader,
        });
        tracing::info!(%peer, "client connected");
    }

    async fn handle_message(&mut self, id: u64, value: Value, dispatcher: &Dispatcher) {
        if self.client.as_ref().map(|c| c.id) != Some(id) {
            return;
        }
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring message that is not a request");
                return;
            }
        };
        if request.message_type != "request" {
            tracing::warn!(kind = %request.message_type, "ignoring non-request message");
            return;
        }
        tracing::debug!(command = %request.command, seq = request.seq, "request");

        let reply = dispatcher.dispatch(&request);
        self.send(&reply.response).await;
        for event in &reply.events {
            self.send(event).await;
        }
        if reply.close {
            self.close_client().await;
        }
    }

    async fn reader_closed(&mut self, id: u64, error: CodecError) {
        if self.client.as_ref().map(|c| c.id) != Some(id) {
            return;
        }
        if error.is_closed() {
            tracing::info!("client disconnected");
        } else {
            tracing::warn!(error = %error, "closing client after read error");
        }
        self.close_client().await;
    }

    /// Write a debuggee notification to the client, adopting stop frames.
    async fn deliver(&mut self, note: Notification) {
        match &note {
            Notification::Stopped { frame, .. } => lock(&self.session).adopt(Arc::clone(frame)),
            Notification::Continued => lock(&self.session).clear_frame(),
            _ => {}
        }
        if let Some(event) = note.to_event() {
            self.send(&event).await;
        }
    }

    /// Serialize and write `message`; a failed write drops the client.
    async fn send<T: Serialize>(&mut self, message: &T) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outgoing message");
                return;
            }
        };
        if let Err(e) = write_message(&mut client.writer, &value).await {
            tracing::warn!(peer = %client.peer, error = %e, "write failed, dropping client");
            self.close_client().await;
        }
    }

    async fn close_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            let _ = client.writer.shutdown().await;
            client.reader.abort();
            tracing::debug!(peer = %client.peer, "client closed");
        }
        lock(&self.session).disconnect();
    }

    /// Send `terminated` once and drop the client.
    async fn finish(&mut self) {
        if self.client.is_some() && lock(&self.session).mark_terminated() {
            self.send(&Event::terminated()).await;
        }
        self.close_client().await;
    }
}

async fn read_loop(id: u64, read_half: OwnedReadHalf, input: UnboundedSender<ClientInput>) {
    let mut reader = BufReader::new(read_half);
    loop {
        match read_message(&mut reader).await {
            Ok(value) => {
                if input.send(ClientInput::Message { id, value }).is_err() {
                    return;
                }
            }
            Err(error) => {
                let _ = input.send(ClientInput::Closed { id, error });
                return;
            }
        }
    }
}

async fn accept_optional(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Read one line from a trigger client; `START` arms tracing.
async fn serve_trigger(stream: TcpStream, peer: SocketAddr, bridge: DebuggerBridge) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match tokio::time::timeout(TRIGGER_READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(Ok(_)) if line.trim() == TRIGGER_COMMAND => {
            tracing::info!(%peer, "trigger received, arming trace");
            bridge.set_trace();
        }
        Ok(Ok(_)) => tracing::warn!(%peer, line = line.trim(), "unexpected trigger line"),
        Ok(Err(e)) => tracing::warn!(%peer, error = %e, "trigger read failed"),
        Err(_) => tracing::warn!(%peer, "trigger client timed out"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dapbridge_engine::{
        build_engine, BackendKind, ExitReason, Frame, StepKind, UpcallResult, Upcalls,
    };
    use dapbridge_protocol::StopReason;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    use super::*;
    use crate::notifier::Notifier;

    struct NoUpcalls;

    impl Upcalls for NoUpcalls {
        fn on_stop(&self, _: Arc<Frame>, _: dapbridge_engine::StopReason) -> UpcallResult {
            Ok(())
        }
        fn on_resume(&self, _: StepKind) -> UpcallResult {
            Ok(())
        }
        fn on_exit(&self, _: ExitReason) -> UpcallResult {
            Ok(())
        }
    }

    struct Harness {
        addr: SocketAddr,
        session: Arc<Mutex<Session>>,
        notifier: Notifier,
        net: thread::JoinHandle<()>,
    }

    fn spawn_net() -> Harness {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let (engine, _) = build_engine(BackendKind::Script);
        let bridge = DebuggerBridge::new(engine, Arc::new(NoUpcalls));
        let session = Arc::new(Mutex::new(Session::new()));
        lock(&session).listen(addr).unwrap();
        let (notifier, notifications) = Notifier::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let net = NetContext {
            listener,
            trigger: None,
            session: Arc::clone(&session),
            dispatcher: Dispatcher::new(bridge.clone(), Arc::clone(&session)),
            bridge,
            notifications,
        }
        .spawn(runtime)
        .unwrap();

        Harness {
            addr,
            session,
            notifier,
            net,
        }
    }

    fn frame(line: i64) -> Arc<Frame> {
        Arc::new(Frame {
            id: 0,
            name: "main".into(),
            path: "demo.rs".into(),
            line,
            column: 1,
            locals: Vec::new(),
            globals: Arc::new(Vec::new()),
            back: None,
        })
    }

    async fn recv(reader: &mut BufReader<OwnedReadHalf>) -> Value {
        timeout(Duration::from_secs(5), read_message(reader))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn net_adopts_frame_with_stop_event() {
        let h = spawn_net();
        let stream = TcpStream::connect(h.addr).await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        // A response proves the client is attached before events flow.
        let request = json!({"seq": 1, "type": "request", "command": "threads"});
        write_message(&mut writer, &request).await.unwrap();
        assert_eq!(recv(&mut reader).await["request_seq"], 1);

        h.notifier.stopped(frame(12), StopReason::Step);
        let event = recv(&mut reader).await;
        assert_eq!(event["event"], "stopped");
        assert_eq!(event["body"]["reason"], "step");
        assert_eq!(lock(&h.session).frame().map(|f| f.line), Some(12));

        h.notifier.continued();
        assert_eq!(recv(&mut reader).await["event"], "continued");
        assert!(lock(&h.session).frame().is_none());

        h.notifier.shutdown();
        assert_eq!(recv(&mut reader).await["event"], "terminated");
        assert!(read_message(&mut reader).await.unwrap_err().is_closed());
        h.net.join().unwrap();
        assert!(lock(&h.session).client().is_none());
    }

    #[tokio::test]
    async fn net_ignores_non_request_messages() {
        let h = spawn_net();
        let stream = TcpStream::connect(h.addr).await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_message(&mut writer, &json!({"hello": "world"}))
            .await
            .unwrap();
        let stray = json!({"seq": 3, "type": "response", "command": "threads"});
        write_message(&mut writer, &stray).await.unwrap();
        let request = json!({"seq": 7, "type": "request", "command": "threads"});
        write_message(&mut writer, &request).await.unwrap();
        let response = recv(&mut reader).await;
        assert_eq!(response["request_seq"], 7);
        assert_eq!(response["success"], true);

        writer.shutdown().await.unwrap();
        drop(writer);
        h.notifier.exited(0);
        h.net.join().unwrap();
        assert!(lock(&h.session).client().is_none());
    }

    #[tokio::test]
    async fn net_exit_without_client_stops_loop() {
        let h = spawn_net();
        h.notifier.exited(1);
        h.net.join().unwrap();
        assert!(std::net::TcpListener::bind(h.addr).is_ok());
    }
}
