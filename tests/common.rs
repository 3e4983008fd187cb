//! Test utilities & fixtures.
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use termbbs::bbs::menu::{default_menus, MenuDefinition, MenuOption};
use termbbs::bbs::menu_store::{MemoryMenuStore, MenuStore};
use termbbs::bbs::menu_system::{MenuSystem, Services};
use termbbs::bbs::modules::{Module, ModuleFactory, ModuleKind};
use termbbs::bbs::session::Session;
use termbbs::config::{Argon2Config, Config};
use termbbs::storage::UserStore;

/// Default config pointed at `data_dir`, with cheap argon2 parameters.
pub fn test_config(data_dir: &str) -> Config {
    let mut cfg = Config::default();
    cfg.storage.data_dir = data_dir.to_string();
    cfg.logging.file = None;
    cfg.logging.security_file = None;
    cfg.security.argon2 = Some(Argon2Config {
        memory_kib: Some(8),
        time_cost: Some(1),
        parallelism: Some(1),
    });
    cfg
}

pub async fn open_users(cfg: &Config) -> Arc<UserStore> {
    Arc::new(
        UserStore::open(&cfg.storage.data_dir, cfg.security.argon2.as_ref())
            .await
            .expect("user store"),
    )
}

/// The built-in `matrix` and `main` menus held in memory.
pub fn default_store() -> MemoryMenuStore {
    default_menus()
        .into_iter()
        .fold(MemoryMenuStore::new(), |store, (name, menu)| store.with_menu(name, menu))
}

pub fn option(menu_key: &str, command_key: &str, command_string: &str) -> MenuOption {
    MenuOption::new(menu_key, command_key, command_string)
}

pub fn menu(title: &str, options: Vec<MenuOption>) -> MenuDefinition {
    options
        .into_iter()
        .fold(MenuDefinition::new(title).with_screen(title).with_prompt("p", "> "), |m, o| m.with_option(o))
}

pub fn system_with(cfg: Config, menus: Arc<dyn MenuStore>, users: Arc<UserStore>) -> MenuSystem {
    let cfg = Arc::new(cfg);
    let services = Services::standard(cfg.clone(), menus, users);
    MenuSystem::new(cfg, services, Session::new("test".into(), "127.0.0.1:9".into())).expect("menu system")
}

pub fn system_with_modules(cfg: Config, menus: Arc<dyn MenuStore>, modules: Arc<dyn ModuleFactory>, users: Arc<UserStore>) -> MenuSystem {
    let cfg = Arc::new(cfg);
    let mut services = Services::standard(cfg.clone(), menus, users);
    services.modules = modules;
    MenuSystem::new(cfg, services, Session::new("test".into(), "127.0.0.1:9".into())).expect("menu system")
}

/// Feed text one character per update, the way the telnet server does.
pub fn feed(system: &mut MenuSystem, text: &str) {
    for ch in text.chars() {
        let mut buf = [0u8; 4];
        system.update(ch.encode_utf8(&mut buf), ch.len_utf8() > 1);
    }
}

/// Wait for password checks and account writes a module handed to the
/// blocking pool, then let the system pick them up, as the server does when
/// the session's waker fires.
pub async fn settle(system: &mut MenuSystem) {
    let wake = system.session().waker();
    while system.is_busy() {
        tokio::time::timeout(Duration::from_secs(5), wake.notified())
            .await
            .expect("background work stalled");
        system.poll();
    }
}

/// Drain and concatenate queued output.
pub fn drain(system: &mut MenuSystem) -> String {
    system.session_mut().take_output().concat()
}

/// Module whose behaviour is driven by its input: `q` deactivates it, `a`
/// authorizes the session and deactivates it. Counts `on_exit` calls.
pub struct ScriptedModule {
    kind: ModuleKind,
    exits: Arc<AtomicUsize>,
    active: bool,
}

impl Module for ScriptedModule {
    fn kind(&self) -> ModuleKind {
        self.kind
    }

    fn on_enter(&mut self, session: &mut Session) {
        self.active = true;
        session.deliver(format!("[{} enter]", self.kind.as_str()));
    }

    fn on_exit(&mut self, _session: &mut Session) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&mut self, session: &mut Session, input: &str, _multibyte: bool) {
        match input {
            "q" => self.active = false,
            "a" => {
                session.authorize("tester".into(), 1);
                self.active = false;
            }
            _ => {}
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Factory for [`ScriptedModule`]s sharing one exit counter per module created.
#[derive(Default)]
pub struct ScriptedModules {
    pub created: std::sync::Mutex<Vec<Arc<AtomicUsize>>>,
}

impl ScriptedModules {
    pub fn exits(&self, index: usize) -> usize {
        self.created.lock().unwrap()[index].load(Ordering::SeqCst)
    }
}

impl ModuleFactory for ScriptedModules {
    fn create(&self, kind: ModuleKind) -> Box<dyn Module> {
        let exits = Arc::new(AtomicUsize::new(0));
        self.created.lock().unwrap().push(exits.clone());
        Box::new(ScriptedModule {
            kind,
            exits,
            active: false,
        })
    }
}
