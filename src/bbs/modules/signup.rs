use log::{error, info};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::{Module, ModuleKind};
use crate::bbs::line_input::{LineEvent, LineInput};
use crate::bbs::roles::LEVEL_USER;
use crate::bbs::session::Session;
use crate::errors::BbsError;
use crate::logutil::escape_log;
use crate::storage::{User, UserStore};
use crate::validation::{validate_password, validate_user_name};

enum Step {
    Username,
    Password { username: String },
    Confirm { username: String, password: String },
    /// The account is being hashed and written on the blocking pool.
    Registering { username: String, rx: oneshot::Receiver<Result<User, BbsError>> },
}

/// New account application: name, password, confirmation.
pub struct SignupModule {
    users: Arc<UserStore>,
    min_password_length: usize,
    step: Step,
    line: LineInput,
    active: bool,
}

impl SignupModule {
    pub fn new(users: Arc<UserStore>, min_password_length: usize) -> Self {
        SignupModule {
            users,
            min_password_length,
            step: Step::Username,
            line: LineInput::new(),
            active: false,
        }
    }

    fn handle_char(&mut self, session: &mut Session, ch: char) {
        let event = match self.step {
            Step::Username => self.line.push(ch),
            Step::Registering { .. } => return,
            _ => self.line.push_masked(ch),
        };
        match event {
            LineEvent::None => {}
            LineEvent::Echo(text) => session.deliver(text),
            LineEvent::Line(line) => match std::mem::replace(&mut self.step, Step::Username) {
                Step::Username => self.submit_username(session, line),
                Step::Password { username } => self.submit_password(session, username, line),
                Step::Confirm { username, password } => {
                    self.submit_confirmation(session, username, password, line)
                }
                step @ Step::Registering { .. } => self.step = step,
            },
        }
    }

    fn submit_username(&mut self, session: &mut Session, line: String) {
        if line.trim().is_empty() {
            session.deliver("\r\nApplication cancelled.\r\n");
            self.active = false;
            return;
        }
        match validate_user_name(&line) {
            Err(e) => session.deliver(format!("\r\n{}\r\nNew username: ", e)),
            Ok(username) if self.users.exists(&username) => {
                session.deliver("\r\nThat name is already taken.\r\nNew username: ")
            }
            Ok(username) => {
                self.step = Step::Password { username };
                session.deliver(format!(
                    "\r\nPassword (at least {} characters): ",
                    self.min_password_length
                ));
            }
        }
    }

    fn submit_password(&mut self, session: &mut Session, username: String, password: String) {
        if let Err(e) = validate_password(&password, self.min_password_length) {
            session.deliver(format!("\r\n{}\r\nPassword: ", e));
            self.step = Step::Password { username };
            return;
        }
        self.step = Step::Confirm { username, password };
        session.deliver("\r\nConfirm password: ");
    }

    fn submit_confirmation(
        &mut self,
        session: &mut Session,
        username: String,
        password: String,
        confirmation: String,
    ) {
        if confirmation != password {
            session.deliver("\r\nPasswords do not match.\r\nPassword: ");
            self.step = Step::Password { username };
            return;
        }
        let (tx, rx) = oneshot::channel();
        let users = self.users.clone();
        let wake = session.waker();
        let name = username.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(users.register(&name, &password, LEVEL_USER));
            wake.notify_one();
        });
        self.step = Step::Registering { username, rx };
    }

    fn finish_registration(&mut self, session: &mut Session, username: String, outcome: Result<User, BbsError>) {
        match outcome {
            Ok(user) => {
                info!(
                    "user.created name={} session={}",
                    escape_log(&user.username),
                    escape_log(&session.id)
                );
                session.deliver(format!(
                    "\r\nAccount {} created. You may now log on.\r\n",
                    user.username
                ));
                self.active = false;
            }
            Err(BbsError::AlreadyExists(_)) => {
                session.deliver("\r\nThat name is already taken.\r\nNew username: ");
            }
            Err(e) => {
                error!("Signup failed for {}: {}", escape_log(&username), e);
                session.deliver("\r\nCould not create the account.\r\n");
                self.active = false;
            }
        }
    }
}

impl Module for SignupModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Signup
    }

    fn on_enter(&mut self, session: &mut Session) {
        self.active = true;
        self.step = Step::Username;
        self.line.clear();
        session.deliver("\r\nNew user application\r\nNew username: ");
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
        let Step::Registering { rx, .. } = &mut self.step else {
            return;
        };
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(BbsError::Internal("account write did not complete".to_string()))
            }
        };
        if let Step::Registering { username, .. } = std::mem::replace(&mut self.step, Step::Username) {
            self.finish_registration(session, username, outcome);
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.step, Step::Registering { .. })
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
