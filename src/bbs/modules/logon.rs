use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::{Module, ModuleKind};
use crate::bbs::line_input::{LineEvent, LineInput};
use crate::bbs::session::Session;
use crate::errors::BbsError;
use crate::logutil::escape_log;
use crate::storage::{User, UserStore};

type Verdict = Result<Option<User>, BbsError>;

enum Step {
    Username,
    Password { username: String },
    /// Credentials are being checked on the blocking pool; input is ignored.
    Verifying { username: String, rx: oneshot::Receiver<Verdict> },
}

/// Username and password prompt. Deactivates after a successful logon, an
/// empty user name, or too many failed attempts.
pub struct LogonModule {
    users: Arc<UserStore>,
    max_attempts: u32,
    attempts: u32,
    step: Step,
    line: LineInput,
    active: bool,
}

impl LogonModule {
    pub fn new(users: Arc<UserStore>, max_attempts: u32) -> Self {
        LogonModule {
            users,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            step: Step::Username,
            line: LineInput::new(),
            active: false,
        }
    }

    fn handle_char(&mut self, session: &mut Session, ch: char) {
        let event = match self.step {
            Step::Username => self.line.push(ch),
            Step::Password { .. } => self.line.push_masked(ch),
            Step::Verifying { .. } => return,
        };
        match event {
            LineEvent::None => {}
            LineEvent::Echo(text) => session.deliver(text),
            LineEvent::Line(line) => match std::mem::replace(&mut self.step, Step::Username) {
                Step::Username => self.submit_username(session, line),
                Step::Password { username } => self.submit_password(session, username, line),
                step @ Step::Verifying { .. } => self.step = step,
            },
        }
    }

    fn submit_username(&mut self, session: &mut Session, line: String) {
        let username = line.trim();
        if username.is_empty() {
            session.deliver("\r\nLogon cancelled.\r\n");
            self.active = false;
            return;
        }
        self.step = Step::Password {
            username: username.to_string(),
        };
        session.deliver("\r\nPassword: ");
    }

    /// Start the argon2 check off the session task. The result comes back
    /// through [`Module::poll`].
    fn submit_password(&mut self, session: &mut Session, username: String, password: String) {
        let (tx, rx) = oneshot::channel();
        let users = self.users.clone();
        let wake = session.waker();
        let name = username.clone();
        tokio::task::spawn_blocking(move || {
            let verdict = users.verify(&name, &password).map(|found| {
                found.map(|user| {
                    if let Err(e) = users.record_login(&user.username) {
                        warn!("Could not record login for {}: {}", escape_log(&user.username), e);
                    }
                    user
                })
            });
            // The module may already be gone if the caller hung up
            let _ = tx.send(verdict);
            wake.notify_one();
        });
        self.step = Step::Verifying { username, rx };
    }

    fn finish_verification(&mut self, session: &mut Session, username: String, verdict: Verdict) {
        match verdict {
            Ok(Some(user)) => {
                info!(
                    "session.logon id={} user={} level={}",
                    escape_log(&session.id),
                    escape_log(&user.username),
                    user.user_level
                );
                session.deliver(format!("\r\nWelcome back, {}!\r\n", user.username));
                session.authorize(user.username, user.user_level);
                self.active = false;
            }
            Ok(None) => {
                self.attempts += 1;
                warn!(
                    target: "security",
                    "failed logon user={} peer={} attempt={}/{}",
                    escape_log(&username),
                    escape_log(&session.peer),
                    self.attempts,
                    self.max_attempts
                );
                if self.attempts >= self.max_attempts {
                    session.deliver("\r\nToo many failed attempts.\r\n");
                    self.active = false;
                } else {
                    session.deliver("\r\nInvalid username or password.\r\nUsername: ");
                }
            }
            Err(e) => {
                error!("Logon failed for {}: {}", escape_log(&username), e);
                session.deliver("\r\nLogon is unavailable right now.\r\n");
                self.active = false;
            }
        }
    }
}

impl Module for LogonModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Logon
    }

    fn on_enter(&mut self, session: &mut Session) {
        self.active = true;
        self.attempts = 0;
        self.step = Step::Username;
        self.line.clear();
        session.deliver("\r\nUsername: ");
    }

    fn on_exit(&mut self, _session: &mut Session) {
        self.active = false;
        self.line.clear();
    }

    fn update(&mut self, session: &mut Session, input: &str, _multibyte: bool) {
        for ch in input.chars() {
            if !self.active {
                break;
            }
            self.handle_char(session, ch);
        }
    }

    fn poll(&mut self, session: &mut Session) {
        let Step::Verifying { rx, .. } = &mut self.step else {
            return;
        };
        let verdict = match rx.try_recv() {
            Ok(verdict) => verdict,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(BbsError::Internal("password check did not complete".to_string()))
            }
        };
        if let Step::Verifying { username, .. } = std::mem::replace(&mut self.step, Step::Username) {
            self.finish_verification(session, username, verdict);
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.step, Step::Verifying { .. })
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
