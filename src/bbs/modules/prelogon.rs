use super::{Module, ModuleKind};
use crate::bbs::session::Session;
use crate::config::BbsConfig;

/// Connection banner. Any keystroke dismisses it.
pub struct PreLogonModule {
    banner: String,
    active: bool,
}

impl PreLogonModule {
    pub fn new(bbs: &BbsConfig) -> Self {
        let mut banner = format!("\r\n{}\r\n", bbs.name);
        if !bbs.location.is_empty() {
            banner.push_str(&format!("{}\r\n", bbs.location));
        }
        if !bbs.welcome_message.is_empty() {
            banner.push_str(&format!("\r\n{}\r\n", bbs.welcome_message.replace('\n', "\r\n")));
        }
        banner.push_str("\r\nPress any key to continue...");
        PreLogonModule {
            banner,
            active: false,
        }
    }
}

impl Module for PreLogonModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::PreLogon
    }

    fn on_enter(&mut self, session: &mut Session) {
        self.active = true;
        session.deliver(self.banner.clone());
    }

    fn on_exit(&mut self, session: &mut Session) {
        self.active = false;
        session.deliver("\r\n");
    }

    fn update(&mut self, _session: &mut Session, input: &str, _multibyte: bool) {
        if !input.is_empty() {
            self.active = false;
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
