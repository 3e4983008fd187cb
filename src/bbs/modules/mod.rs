//! Sub-session modules and the single-slot module stack.
//!
//! A module temporarily owns a session's input (pre-logon banner, logon,
//! signup). The menu system only talks to it through [`Module`]: it forwards
//! input, then polls [`Module::is_active`] once per update and shuts the
//! module down when it reports inactive. Password hashing and account writes
//! run on the blocking pool; the module parks in a busy step until
//! [`Module::poll`] picks the result up.

use log::{debug, warn};
use std::sync::Arc;

use super::session::Session;
use crate::config::Config;
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::UserStore;

mod logon;
mod prelogon;
mod signup;

pub use logon::LogonModule;
pub use prelogon::PreLogonModule;
pub use signup::SignupModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    PreLogon,
    Logon,
    Signup,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::PreLogon => "prelogon",
            ModuleKind::Logon => "logon",
            ModuleKind::Signup => "signup",
        }
    }
}

/// Capability set every sub-session module exposes.
pub trait Module: Send {
    fn kind(&self) -> ModuleKind;

    /// Called once when the module is installed in the stack.
    fn on_enter(&mut self, session: &mut Session);

    /// Called once when the module is removed, including forced teardown.
    fn on_exit(&mut self, session: &mut Session);

    /// Consume an input chunk. Must return without waiting for more input.
    fn update(&mut self, session: &mut Session, input: &str, multibyte: bool);

    /// Collect the result of background work started by `update`. The
    /// session's waker fires when such a result is ready.
    fn poll(&mut self, _session: &mut Session) {}

    /// True while the module waits on background work and ignores input.
    fn is_busy(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool;
}

/// Builds modules by kind so servers and tests can substitute their own.
pub trait ModuleFactory: Send + Sync {
    fn create(&self, kind: ModuleKind) -> Box<dyn Module>;
}

/// Factory for the built-in modules.
pub struct StandardModules {
    config: Arc<Config>,
    users: Arc<UserStore>,
}

impl StandardModules {
    pub fn new(config: Arc<Config>, users: Arc<UserStore>) -> Self {
        StandardModules { config, users }
    }
}

impl ModuleFactory for StandardModules {
    fn create(&self, kind: ModuleKind) -> Box<dyn Module> {
        match kind {
            ModuleKind::PreLogon => Box::new(PreLogonModule::new(&self.config.bbs)),
            ModuleKind::Logon => Box::new(LogonModule::new(
                self.users.clone(),
                self.config.security.max_login_attempts,
            )),
            ModuleKind::Signup => Box::new(SignupModule::new(
                self.users.clone(),
                self.config.security.min_password_length,
            )),
        }
    }
}

/// Capacity-one stack of running modules.
#[derive(Default)]
pub struct ModuleStack {
    slot: Option<Box<dyn Module>>,
}

impl ModuleStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Kind of the installed module, if any.
    pub fn kind(&self) -> Option<ModuleKind> {
        self.slot.as_ref().map(|m| m.kind())
    }

    /// Install `module` and call its `on_enter`.
    ///
    /// A leftover occupant means an earlier shutdown was skipped: it still gets
    /// its `on_exit`, the inconsistency is logged and counted, and it is dropped
    /// before the new module goes in. Returns true when that happened.
    pub fn startup(&mut self, mut module: Box<dyn Module>, session: &mut Session) -> bool {
        let discarded = match self.slot.take() {
            Some(mut stale) => {
                warn!(
                    "module stack inconsistency: {} still installed while starting {} (session {})",
                    stale.kind().as_str(),
                    module.kind().as_str(),
                    escape_log(&session.id)
                );
                metrics::inc_module_stack_inconsistency();
                stale.on_exit(session);
                metrics::record_module_exit(stale.kind().as_str());
                true
            }
            None => false,
        };

        let kind = module.kind();
        let counter = metrics::record_module_entry(kind.as_str());
        debug!(
            "module.enter kind={} session={} active_now={}",
            kind.as_str(),
            escape_log(&session.id),
            counter.currently_active
        );
        module.on_enter(session);
        self.slot = Some(module);
        discarded
    }

    /// Call `on_exit` on the installed module and release it.
    pub fn shutdown(&mut self, session: &mut Session) -> Option<ModuleKind> {
        let mut module = self.slot.take()?;
        let kind = module.kind();
        module.on_exit(session);
        metrics::record_module_exit(kind.as_str());
        debug!("module.exit kind={} session={}", kind.as_str(), escape_log(&session.id));
        Some(kind)
    }

    /// Forward input to the installed module.
    ///
    /// Returns `None` when the slot is empty or the chunk is empty, otherwise
    /// whether the module is still active afterwards.
    pub fn update(&mut self, session: &mut Session, input: &str, multibyte: bool) -> Option<bool> {
        if input.is_empty() {
            return None;
        }
        let module = self.slot.as_mut()?;
        module.update(session, input, multibyte);
        Some(module.is_active())
    }

    /// Let the installed module collect finished background work. Same
    /// return convention as [`update`](Self::update).
    pub fn poll(&mut self, session: &mut Session) -> Option<bool> {
        let module = self.slot.as_mut()?;
        module.poll(session);
        Some(module.is_active())
    }

    pub fn is_busy(&self) -> bool {
        self.slot.as_ref().is_some_and(|m| m.is_busy())
    }
}
