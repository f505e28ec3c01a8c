//! Hand-off from the debuggee thread into the network context.

use std::sync::{Arc, Mutex};

use dapbridge_engine::Frame;
use dapbridge_protocol::{Event, StopReason};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Something the network context must act on.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The debuggee stopped. The frame is adopted when the event is sent.
    Stopped {
        frame: Arc<Frame>,
        reason: StopReason,
    },
    Continued,
    /// The debuggee exited; followed by `terminated` and server close.
    Exited { exit_code: i64 },
    /// Close the listener and the client.
    Shutdown,
}

impl Notification {
    /// Wire event for this notification, if it has one.
    pub fn to_event(&self) -> Option<Event> {
        match self {
            Notification::Stopped { frame, reason } => {
                let at = format!("{} ({}:{})", frame.name, frame.path, frame.line);
                Some(Event::stopped(*reason, Some(at)))
            }
            Notification::Continued => Some(Event::continued()),
            Notification::Exited { exit_code } => Some(Event::exited(*exit_code)),
            Notification::Shutdown => None,
        }
    }
}

/// Thread-safe sender side of the notification channel.
///
/// Sends never block and never fail loudly: with the network context gone
/// there is nobody left to tell.
#[derive(Debug)]
pub struct Notifier {
    tx: Mutex<Option<UnboundedSender<Notification>>>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Queue `note`. Returns `false` if it was dropped.
    pub fn send(&self, note: Notification) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) => match tx.send(note) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(notification = ?e.0, "network context gone, dropping");
                    false
                }
            },
            None => false,
        }
    }

    pub fn stopped(&self, frame: Arc<Frame>, reason: StopReason) -> bool {
        self.send(Notification::Stopped { frame, reason })
    }

    pub fn continued(&self) -> bool {
        self.send(Notification::Continued)
    }

    pub fn exited(&self, exit_code: i64) -> bool {
        self.send(Notification::Exited { exit_code })
    }

    pub fn shutdown(&self) -> bool {
        self.send(Notification::Shutdown)
    }

    /// Drop the sender; later sends are discarded.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(true, UnboundedSender::is_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_delivers_in_order() {
        let (notifier, mut rx) = Notifier::channel();
        assert!(notifier.continued());
        assert!(notifier.exited(0));
        assert!(matches!(rx.try_recv().unwrap(), Notification::Continued));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Notification::Exited { exit_code: 0 }
        ));
    }

    #[test]
    fn notifier_drops_after_close() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.close();
        assert!(notifier.is_closed());
        assert!(!notifier.shutdown());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn notifier_drops_without_receiver() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        assert!(notifier.is_closed());
        assert!(!notifier.continued());
    }

    #[test]
    fn notification_events() {
        let frame = Arc::new(Frame {
            id: 0,
            name: "main".into(),
            path: "demo.rs".into(),
            line: 4,
            column: 1,
            locals: Vec::new(),
            globals: Arc::new(Vec::new()),
            back: None,
        });
        let stop = Notification::Stopped {
            frame,
            reason: StopReason::Breakpoint,
        };
        let event = stop.to_event().unwrap();
        assert_eq!(event.event, "stopped");
        assert_eq!(event.seq, 0);
        let body = event.body.unwrap();
        assert_eq!(body["reason"], "breakpoint");
        assert_eq!(body["threadId"], 1);
        assert_eq!(body["allThreadsStopped"], true);
        assert_eq!(body["description"], "main (demo.rs:4)");

        assert_eq!(
            Notification::Exited { exit_code: 1 }.to_event().unwrap().event,
            "exited"
        );
        assert!(Notification::Shutdown.to_event().is_none());
    }
}
