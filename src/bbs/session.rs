use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::logutil::escape_log;

/// # User Session
///
/// The transport-facing half of a connected caller: identity, authorization
/// state and the queue of output waiting to be written to the socket.
///
/// ## Session Lifecycle
///
/// 1. **Connected** - Telnet connection accepted, logon sequence running
/// 2. **Authorized** - A logon module verified the caller's credentials
/// 3. **Disconnected** - Logoff, idle timeout or connection loss
///
/// Output is never written directly: [`deliver`](Session::deliver) queues text
/// and the server drains it with [`take_output`](Session::take_output) after
/// every input chunk and whenever the [`waker`](Session::waker) fires.
///
/// ```rust
/// use termbbs::bbs::session::{Session, SessionState};
///
/// let mut session = Session::new("s1".to_string(), "127.0.0.1:5000".to_string());
/// assert!(matches!(session.state, SessionState::Connected));
/// session.deliver("hello");
/// assert_eq!(session.take_output(), vec!["hello".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub peer: String,
    pub username: Option<String>,
    pub user_level: u8,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: SessionState,
    outbox: Vec<String>,
    wake: Arc<Notify>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authorized,
    Disconnected,
}

impl Session {
    pub fn new(id: String, peer: String) -> Self {
        let now = Utc::now();
        Session {
            id,
            peer,
            username: None,
            user_level: 0,
            login_time: now,
            last_activity: now,
            state: SessionState::Connected,
            outbox: Vec::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Queue text for the caller. Ignored once the session is disconnected.
    pub fn deliver(&mut self, text: impl Into<String>) {
        if self.state == SessionState::Disconnected {
            return;
        }
        let text = text.into();
        if !text.is_empty() {
            self.outbox.push(text);
        }
    }

    /// Drain queued output.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// Signalled by background work finishing for this session. The server
    /// waits on it next to the socket and then calls `MenuSystem::poll`.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Mark the caller as authenticated.
    pub fn authorize(&mut self, username: String, user_level: u8) {
        self.username = Some(username);
        self.user_level = user_level;
        self.state = SessionState::Authorized;
    }

    /// Terminate the session. Output queued before this call is still flushed.
    pub fn logoff(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        info!(
            "session.logoff id={} user={} peer={} duration_s={}",
            escape_log(&self.id),
            escape_log(&self.display_name()),
            escape_log(&self.peer),
            self.session_duration().num_seconds()
        );
        self.state = SessionState::Disconnected;
    }

    pub fn is_authorized(&self) -> bool {
        self.state == SessionState::Authorized
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    /// Get the username, or "Guest" if not logged in
    pub fn display_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| "Guest".to_string())
    }

    /// Update the last activity timestamp
    pub fn update_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Get session duration
    pub fn session_duration(&self) -> chrono::Duration {
        self.last_activity - self.login_time
    }

    /// Check if session is inactive (for idle disconnect)
    pub fn is_inactive(&self, timeout_minutes: i64) -> bool {
        Utc::now() - self.last_activity > chrono::Duration::minutes(timeout_minutes)
    }
}
