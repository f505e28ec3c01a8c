//! End-to-end tests: a real TCP client against an adapter running the
//! `script` backend.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dapbridge_adapter::{Adapter, SessionState};
use dapbridge_config::AdapterConfig;
use dapbridge_engine::{bindings, ExitReason};
use dapbridge_protocol::{read_message, write_message, CodecError, Request};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn script_config() -> AdapterConfig {
    AdapterConfig {
        host: "127.0.0.1".into(),
        port: 0,
        backend: "script".into(),
        trigger_port: None,
    }
}

fn start_adapter(config: AdapterConfig) -> (Arc<Adapter>, SocketAddr) {
    let adapter = Arc::new(Adapter::new(&config).unwrap());
    let addr = adapter.start().unwrap();
    (adapter, addr)
}

async fn shutdown(adapter: &Arc<Adapter>) {
    let adapter = Arc::clone(adapter);
    tokio::task::spawn_blocking(move || adapter.shutdown())
        .await
        .unwrap()
        .unwrap();
}

async fn wait_debuggee(adapter: &Arc<Adapter>) {
    let adapter = Arc::clone(adapter);
    timeout(WAIT, tokio::task::spawn_blocking(move || adapter.wait()))
        .await
        .expect("debuggee did not finish")
        .unwrap();
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    seq: i64,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
            seq: 0,
        }
    }

    async fn send(&mut self, command: &str, arguments: Option<Value>) -> i64 {
        self.seq += 1;
        let request = Request::new(self.seq, command, arguments);
        write_message(&mut self.writer, &serde_json::to_value(&request).unwrap())
            .await
            .unwrap();
        self.seq
    }

    async fn recv(&mut self) -> Result<Value, CodecError> {
        timeout(WAIT, read_message(&mut self.reader))
            .await
            .expect("timed out waiting for a message")
    }

    async fn next(&mut self) -> Value {
        self.recv().await.unwrap()
    }

    /// Send a request and return its response, which must come next.
    async fn request(&mut self, command: &str, arguments: Option<Value>) -> Value {
        let seq = self.send(command, arguments).await;
        let response = self.next().await;
        assert_eq!(response["type"], "response", "got {response}");
        assert_eq!(response["request_seq"], seq);
        assert_eq!(response["command"], command);
        response
    }

    async fn event(&mut self, name: &str) -> Value {
        let event = self.next().await;
        assert_eq!(event["type"], "event", "got {event}");
        assert_eq!(event["event"], name, "got {event}");
        assert_eq!(event["seq"], 0);
        event
    }

    async fn assert_closed(&mut self) {
        match self.recv().await {
            Err(e) => assert!(e.is_closed(), "expected clean close, got {e}"),
            Ok(message) => panic!("expected close, got {message}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initialize_breakpoints_and_rejected_control() {
    let (adapter, addr) = start_adapter(script_config());
    let mut client = Client::connect(addr).await;

    let response = client.request("initialize", Some(json!({"adapterID": "test"}))).await;
    assert_eq!(response["success"], true);
    assert_eq!(response["seq"], 1);
    assert_eq!(response["body"]["supportsConfigurationDoneRequest"], true);

    let response = client
        .request(
            "setBreakpoints",
            Some(json!({
                "source": {"path": "a.py"},
                "breakpoints": [{"line": 5}, {"line": 9}],
            })),
        )
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(
        response["body"]["breakpoints"],
        json!([{"line": 5, "verified": true}, {"line": 9, "verified": true}])
    );
    let breaks = adapter.bridge().list_breaks();
    assert_eq!(breaks.get("a.py"), Some(&BTreeSet::from([5, 9])));

    let response = client.request("continue", Some(json!({"threadId": 1}))).await;
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("native command loop"));
    assert_eq!(adapter.state(), SessionState::Listening);
    assert!(!adapter.bridge().is_exited());

    let response = client.request("restartFrame", None).await;
    assert_eq!(response["message"], "Unsupported command: restartFrame");

    // The connection survived both failures.
    let response = client.request("threads", None).await;
    assert_eq!(response["body"]["threads"], json!([{"id": 1, "name": "main"}]));

    shutdown(&adapter).await;
    client.event("terminated").await;
    client.assert_closed().await;
    assert_eq!(adapter.state(), SessionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_inspect_resume_and_exit() {
    let (adapter, addr) = start_adapter(script_config());
    let mut client = Client::connect(addr).await;

    let response = client
        .request(
            "setBreakpoints",
            Some(json!({"source": {"path": "demo.rs"}, "lines": [3]})),
        )
        .await;
    assert_eq!(response["body"]["breakpoints"][0]["verified"], true);

    adapter
        .launch("worker", |probe| {
            probe.global("answer", &42);
            let _frame = probe.enter("compute", "demo.rs", 1);
            let x = 6;
            probe.line("demo.rs", 2, 5, bindings!(x));
            let label = "six";
            probe.line("demo.rs", 3, 5, bindings!(x, label));
        })
        .unwrap();

    // Nothing else is in flight, so the stop is the next message.
    let stopped = client.event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "breakpoint");
    assert_eq!(stopped["body"]["threadId"], 1);
    assert_eq!(stopped["body"]["allThreadsStopped"], true);
    assert_eq!(adapter.state(), SessionState::Stopped);

    let response = client.request("stackTrace", Some(json!({"threadId": 1}))).await;
    let frames = response["body"]["stackFrames"].as_array().unwrap().clone();
    assert_eq!(response["body"]["totalFrames"], 2);
    assert_eq!(frames[0]["id"], 0);
    assert_eq!(frames[0]["name"], "compute");
    assert_eq!(frames[0]["line"], 3);
    assert_eq!(frames[0]["source"]["path"], "demo.rs");
    assert_eq!(frames[1]["name"], "worker");

    let response = client.request("scopes", Some(json!({"frameId": 0}))).await;
    assert_eq!(response["body"]["scopes"][0]["variablesReference"], 1000);
    assert_eq!(response["body"]["scopes"][1]["variablesReference"], 2000);

    let response = client
        .request("variables", Some(json!({"variablesReference": 1000})))
        .await;
    assert_eq!(
        response["body"]["variables"],
        json!([
            {"name": "x", "value": "6", "variablesReference": 0},
            {"name": "label", "value": "\"six\"", "variablesReference": 0},
        ])
    );
    let response = client
        .request("variables", Some(json!({"variablesReference": 2000})))
        .await;
    assert_eq!(response["body"]["variables"][0]["name"], "answer");

    let response = client
        .request("evaluate", Some(json!({"expression": "x * 7", "frameId": 0})))
        .await;
    assert_eq!(response["body"]["result"], "42");
    let response = client
        .request("evaluate", Some(json!({"expression": "y", "frameId": 0})))
        .await;
    assert_eq!(response["body"]["result"], "Error: name 'y' is not defined");

    adapter.script().unwrap().send("c").unwrap();
    client.event("continued").await;
    let exited = client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 0);
    client.event("terminated").await;
    client.assert_closed().await;

    wait_debuggee(&adapter).await;
    assert_eq!(adapter.bridge().exit_reason(), Some(ExitReason::Finished));
    assert_eq!(adapter.state(), SessionState::Exited);

    // The listener goes away with the network context.
    let refused = timeout(WAIT, async {
        loop {
            if TcpStream::connect(addr).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(refused.is_ok(), "listener still accepting after exit");

    shutdown(&adapter).await;
    shutdown(&adapter).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_client_is_rejected() {
    let (adapter, addr) = start_adapter(script_config());
    let mut first = Client::connect(addr).await;
    first.request("initialize", None).await;

    let mut second = Client::connect(addr).await;
    second.assert_closed().await;

    let response = first.request("threads", None).await;
    assert_eq!(response["success"], true);

    shutdown(&adapter).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_keeps_listener_open() {
    let (adapter, addr) = start_adapter(script_config());
    let mut client = Client::connect(addr).await;
    let response = client.request("disconnect", None).await;
    assert_eq!(response["success"], true);
    client.assert_closed().await;

    let mut again = Client::connect(addr).await;
    let response = again.request("initialize", None).await;
    assert_eq!(response["success"], true);

    shutdown(&adapter).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn framing_error_drops_client_only() {
    let (adapter, addr) = start_adapter(script_config());
    let mut client = Client::connect(addr).await;
    client
        .writer
        .write_all(b"Content-Length: nope\r\n\r\n{}")
        .await
        .unwrap();
    // Closed or reset, depending on what the server had left unread.
    assert!(client.recv().await.is_err());

    let mut again = Client::connect(addr).await;
    let response = again.request("threads", None).await;
    assert_eq!(response["success"], true);

    shutdown(&adapter).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configuration_done_reports_entry_stop() {
    let (adapter, addr) = start_adapter(script_config());
    let mut client = Client::connect(addr).await;

    client.request("launch", None).await;
    client.event("initialized").await;

    let response = client.request("configurationDone", None).await;
    assert_eq!(response["success"], true);
    let stopped = client.event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "entry");
    assert_eq!(adapter.state(), SessionState::Listening);

    shutdown(&adapter).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trigger_start_arms_trace() {
    let mut config = script_config();
    config.trigger_port = Some(0);
    let (adapter, addr) = start_adapter(config);
    let trigger = adapter.trigger_addr().unwrap();
    let mut client = Client::connect(addr).await;
    client.request("initialize", None).await;

    let bridge = adapter.bridge().clone();
    adapter
        .launch("spin", move |probe| {
            for i in 0..500 {
                if bridge.is_exited() {
                    break;
                }
                probe.line("spin.rs", 1, 1, bindings!(i));
                std::thread::sleep(Duration::from_millis(10));
            }
        })
        .unwrap();

    let mut trigger = TcpStream::connect(trigger).await.unwrap();
    trigger.write_all(b"START\n").await.unwrap();

    let stopped = client.event("stopped").await;
    assert_eq!(stopped["body"]["reason"], "breakpoint");

    adapter.script().unwrap().send("q").unwrap();
    let exited = client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 1);
    client.event("terminated").await;

    wait_debuggee(&adapter).await;
    assert_eq!(adapter.bridge().exit_reason(), Some(ExitReason::Quit));
    shutdown(&adapter).await;
}
