//! Adapter session state machine.
//!
//! One [`Session`] exists per adapter. It sits behind a `std::sync::Mutex`
//! shared by the debuggee thread (stop, resume and exit upcalls) and the
//! network thread (client commands, event delivery); whoever holds the
//! lock owns the transition.

use std::net::SocketAddr;
use std::sync::Arc;

use dapbridge_engine::Frame;

use crate::error::SessionError;

/// Lifecycle state of the adapter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet listening.
    Idle,
    /// Listener bound; the debuggee has not stopped yet.
    Listening,
    /// The debuggee is parked in the native command loop.
    Stopped,
    /// The debuggee resumed.
    Running,
    /// The debuggee finished or tracing ended. Requests are still served.
    Exited,
    /// Shut down. Terminal.
    Closed,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    addr: Option<SocketAddr>,
    client: Option<SocketAddr>,
    frame: Option<Arc<Frame>>,
    terminated_sent: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            addr: None,
            client: None,
            frame: None,
            terminated_sent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bound listener address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Idle → Listening.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<(), SessionError> {
        self.transition(&[SessionState::Idle], SessionState::Listening)?;
        self.addr = Some(addr);
        Ok(())
    }

    /// Listening | Running → Stopped.
    pub fn on_stop(&mut self) -> Result<(), SessionError> {
        self.transition(
            &[SessionState::Listening, SessionState::Running],
            SessionState::Stopped,
        )
    }

    /// Stopped → Running.
    pub fn on_resume(&mut self) -> Result<(), SessionError> {
        self.transition(&[SessionState::Stopped], SessionState::Running)
    }

    /// Listening | Stopped | Running → Exited.
    pub fn on_exit(&mut self) -> Result<(), SessionError> {
        self.transition(
            &[
                SessionState::Listening,
                SessionState::Stopped,
                SessionState::Running,
            ],
            SessionState::Exited,
        )?;
        self.frame = None;
        Ok(())
    }

    /// Any state → Closed.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        self.state = SessionState::Closed;
        self.client = None;
        self.frame = None;
        Ok(())
    }

    /// Record a client connection. Returns `false` if one is already active.
    pub fn connect(&mut self, peer: SocketAddr) -> bool {
        if self.client.is_some() || self.state == SessionState::Closed {
            return false;
        }
        self.client = Some(peer);
        true
    }

    pub fn disconnect(&mut self) {
        self.client = None;
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Make `frame` the frame requests are answered from.
    pub fn adopt(&mut self, frame: Arc<Frame>) {
        self.frame = Some(frame);
    }

    pub fn clear_frame(&mut self) {
        self.frame = None;
    }

    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.frame.clone()
    }

    /// Mark `terminated` as sent. Returns `false` if it already was.
    pub fn mark_terminated(&mut self) -> bool {
        !std::mem::replace(&mut self.terminated_sent, true)
    }

    fn transition(
        &mut self,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if !from.contains(&self.state) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = ?self.state, ?to, "session transition");
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn frame() -> Arc<Frame> {
        Arc::new(Frame {
            id: 0,
            name: "main".into(),
            path: "demo.rs".into(),
            line: 1,
            column: 1,
            locals: Vec::new(),
            globals: Arc::new(Vec::new()),
            back: None,
        })
    }

    #[test]
    fn session_initial_state() {
        let s = Session::new();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.local_addr().is_none());
        assert!(s.client().is_none());
    }

    #[test]
    fn session_full_lifecycle() {
        let mut s = Session::new();
        s.listen(addr(9000)).unwrap();
        assert_eq!(s.local_addr(), Some(addr(9000)));
        s.on_stop().unwrap();
        s.on_resume().unwrap();
        s.on_stop().unwrap();
        s.on_exit().unwrap();
        assert_eq!(s.state(), SessionState::Exited);
        s.close().unwrap();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn session_rejects_resume_while_listening() {
        let mut s = Session::new();
        s.listen(addr(9000)).unwrap();
        assert_eq!(
            s.on_resume(),
            Err(SessionError::InvalidTransition {
                from: SessionState::Listening,
                to: SessionState::Running,
            })
        );
    }

    #[test]
    fn session_rejects_stop_before_listen() {
        let mut s = Session::new();
        assert!(matches!(
            s.on_stop(),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn session_closed_is_terminal() {
        let mut s = Session::new();
        s.close().unwrap();
        assert_eq!(s.close(), Err(SessionError::Closed));
        assert_eq!(s.listen(addr(1)), Err(SessionError::Closed));
        assert_eq!(s.on_exit(), Err(SessionError::Closed));
        assert!(!s.connect(addr(2)));
    }

    #[test]
    fn session_single_client() {
        let mut s = Session::new();
        assert!(s.connect(addr(5000)));
        assert!(!s.connect(addr(5001)));
        assert_eq!(s.client(), Some(addr(5000)));
        s.disconnect();
        assert!(s.connect(addr(5001)));
    }

    #[test]
    fn session_client_does_not_change_state() {
        let mut s = Session::new();
        s.listen(addr(9000)).unwrap();
        s.connect(addr(5000));
        assert_eq!(s.state(), SessionState::Listening);
        s.disconnect();
        assert_eq!(s.state(), SessionState::Listening);
    }

    #[test]
    fn session_frame_cleared_on_exit() {
        let mut s = Session::new();
        s.listen(addr(9000)).unwrap();
        s.on_stop().unwrap();
        s.adopt(frame());
        assert!(s.frame().is_some());
        s.on_exit().unwrap();
        assert!(s.frame().is_none());
    }

    #[test]
    fn session_terminated_marked_once() {
        let mut s = Session::new();
        assert!(s.mark_terminated());
        assert!(!s.mark_terminated());
    }
}
