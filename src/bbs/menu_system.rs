//! # Session State Machine
//!
//! [`MenuSystem`] is the single entry point for a connected caller's input.
//! Every chunk goes through [`MenuSystem::update`], which hands it to the
//! handler of the current [`InputMode`]:
//!
//! | Mode            | Handler                                   |
//! |-----------------|-------------------------------------------|
//! | `Menu`          | hotkey / line input resolved against options |
//! | `MenuEditor`    | sysop menu add / change / delete          |
//! | `PreLogonModule`| forwards to the banner module             |
//! | `LogonModule`   | forwards to the logon module              |
//! | `GenericModule` | forwards to any other module (signup)     |
//!
//! Handlers never wait. Anything multi-step is a mode change plus state kept
//! between calls, so the next chunk can always be accepted.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termbbs::bbs::menu_system::{MenuSystem, Services};
//! use termbbs::bbs::session::Session;
//! use termbbs::bbs::menu_store::JsonMenuStore;
//! use termbbs::config::Config;
//! use termbbs::storage::UserStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::default());
//!     let menus = Arc::new(JsonMenuStore::open(&config.storage.data_dir).await?);
//!     let users = Arc::new(UserStore::open(&config.storage.data_dir, None).await?);
//!     let services = Services::standard(config.clone(), menus, users);
//!     let session = Session::new("s1".into(), "127.0.0.1:4000".into());
//!     let mut system = MenuSystem::new(config, services, session)?;
//!     system.on_enter();
//!     system.update("x", false);
//!     for chunk in system.session_mut().take_output() {
//!         print!("{}", chunk);
//!     }
//!     Ok(())
//! }
//! ```

use log::{debug, error, info, warn};
use std::sync::Arc;

use super::commands::{CommandDispatchTable, MenuAction};
use super::line_input::{LineEvent, LineInput};
use super::menu::{MenuDefinition, MenuOption, ENTER_KEY};
use super::menu_base::{KeyInput, MenuEngine, MenuLoad};
use super::menu_store::MenuStore;
use super::modules::{ModuleFactory, ModuleKind, ModuleStack, StandardModules};
use super::render::{AnsiRenderer, ScreenRenderer};
use super::roles::{AccessControl, LevelAccess};
use super::session::Session;
use crate::config::Config;
use crate::errors::BbsError;
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::UserStore;

/// Nesting limit for menus started automatically by `FIRSTCMD` options.
pub const MAX_AUTORUN_DEPTH: u8 = 8;

const EDITOR_PROMPT: &str = "\r\nMenu Editor: (A)dd (C)hange (D)elete (Q)uit : ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Menu,
    MenuEditor,
    PreLogonModule,
    LogonModule,
    GenericModule,
}

/// Handler signature: returns how many bytes of the chunk it consumed, so
/// whatever follows a mode change goes to the new handler.
type InputHandler = fn(&mut MenuSystem, &str, bool) -> usize;

impl InputMode {
    fn handler(self) -> InputHandler {
        match self {
            InputMode::Menu => MenuSystem::menu_input,
            InputMode::MenuEditor => MenuSystem::menu_editor_input,
            InputMode::PreLogonModule => MenuSystem::module_prelogon_input,
            InputMode::LogonModule => MenuSystem::module_logon_input,
            InputMode::GenericModule => MenuSystem::module_generic_input,
        }
    }
}

/// Interprets a resolved option. Tried in order until one reports handled.
type ExecuteCallback = fn(&mut MenuSystem, &MenuOption) -> bool;

const EXECUTE_CHAIN: &[ExecuteCallback] = &[MenuSystem::menu_options_callback];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorState {
    Command,
    AddName,
    ChangeName,
    DeleteName,
}

/// Collaborators injected into every session.
#[derive(Clone)]
pub struct Services {
    pub menus: Arc<dyn MenuStore>,
    pub renderer: Arc<dyn ScreenRenderer>,
    pub access: Arc<dyn AccessControl>,
    pub modules: Arc<dyn ModuleFactory>,
}

impl Services {
    /// ANSI renderer, level-based access control and the built-in modules.
    pub fn standard(config: Arc<Config>, menus: Arc<dyn MenuStore>, users: Arc<UserStore>) -> Self {
        Services {
            menus,
            renderer: Arc::new(AnsiRenderer),
            access: Arc::new(LevelAccess),
            modules: Arc::new(StandardModules::new(config, users)),
        }
    }
}

pub struct MenuSystem {
    config: Arc<Config>,
    services: Services,
    session: Session,
    engine: MenuEngine,
    commands: CommandDispatchTable,
    modules: ModuleStack,
    input_mode: InputMode,
    editor_state: EditorState,
    editor_line: LineInput,
    autorun_depth: u8,
    active: bool,
}

impl MenuSystem {
    /// Build the state machine for one session. An invalid configuration is fatal.
    pub fn new(config: Arc<Config>, services: Services, session: Session) -> Result<Self, BbsError> {
        config.validate()?;
        let engine = MenuEngine::new(
            services.menus.clone(),
            services.renderer.clone(),
            &config.menus.fallback_menu,
            config.menus.use_hotkeys,
        );
        Ok(MenuSystem {
            config,
            services,
            session,
            engine,
            commands: CommandDispatchTable::new(),
            modules: ModuleStack::new(),
            input_mode: InputMode::PreLogonModule,
            editor_state: EditorState::Command,
            editor_line: LineInput::new(),
            autorun_depth: 0,
            active: false,
        })
    }

    /// Session start: run the pre-logon module.
    pub fn on_enter(&mut self) {
        self.active = true;
        metrics::inc_session_started();
        info!(
            "session.start id={} peer={}",
            escape_log(&self.session.id),
            escape_log(&self.session.peer)
        );
        self.reset_input_mode(InputMode::PreLogonModule);
        self.startup_module(ModuleKind::PreLogon);
    }

    /// Session teardown. Any running module still gets its `on_exit`.
    pub fn on_exit(&mut self) {
        if !self.active {
            return;
        }
        self.shutdown_module();
        self.active = false;
        metrics::inc_session_ended();
        debug!("session.end id={}", escape_log(&self.session.id));
    }

    /// Route an input chunk to the current handler. No-op once the session is
    /// inactive or logged off.
    pub fn update(&mut self, input: &str, multibyte: bool) {
        if !self.is_active() {
            return;
        }
        self.session.update_activity();
        let mut rest = input;
        while !rest.is_empty() && self.is_active() {
            let handler = self.input_mode.handler();
            let used = handler(self, rest, multibyte).min(rest.len());
            if used == 0 {
                break;
            }
            rest = &rest[used..];
        }
    }

    /// Pick up background work a module finished since the last call. The
    /// server calls this whenever the session's waker fires.
    pub fn poll(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.modules.poll(&mut self.session) == Some(false) {
            self.finish_module();
        }
    }

    /// True while a module waits on a password check or an account write.
    pub fn is_busy(&self) -> bool {
        self.modules.is_busy()
    }

    pub fn is_active(&self) -> bool {
        self.active && self.session.is_connected()
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    /// Switch the input handler. The only place the mode changes.
    pub fn reset_input_mode(&mut self, mode: InputMode) {
        if self.input_mode != mode {
            debug!("input mode {:?} -> {:?}", self.input_mode, mode);
        }
        self.input_mode = mode;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn engine(&self) -> &MenuEngine {
        &self.engine
    }

    pub fn module_kind(&self) -> Option<ModuleKind> {
        self.modules.kind()
    }

    pub fn startup_module(&mut self, kind: ModuleKind) {
        let module = self.services.modules.create(kind);
        self.modules.startup(module, &mut self.session);
    }

    pub fn shutdown_module(&mut self) {
        self.modules.shutdown(&mut self.session);
    }

    // ---- menu mode ----

    fn menu_input(&mut self, input: &str, _multibyte: bool) -> usize {
        for (offset, ch) in input.char_indices() {
            self.menu_key(ch);
            if self.input_mode != InputMode::Menu || !self.is_active() {
                return offset + ch.len_utf8();
            }
        }
        input.len()
    }

    fn menu_key(&mut self, ch: char) {
        match self.engine.accept(ch) {
            KeyInput::None => {}
            KeyInput::Echo(text) => self.session.deliver(text),
            KeyInput::Arrow(arrow) => {
                if let Some(repaint) = self.engine.lightbar_update(arrow) {
                    self.session.deliver(repaint);
                }
            }
            KeyInput::Enter => match self.engine.active_pulldown_option().cloned() {
                Some(option) => self.execute_stack(vec![option]),
                None => self.run_matching(ENTER_KEY),
            },
            KeyInput::Hotkey(key) => self.run_matching(&key.to_string()),
            KeyInput::Line(line) => self.run_matching(line.trim()),
        }
    }

    fn run_matching(&mut self, input: &str) {
        let matched = self
            .engine
            .matching_options(input, self.services.access.as_ref(), &self.session);
        if matched.is_empty() {
            if !self.engine.use_hotkey() {
                self.deliver_prompt();
            }
            return;
        }
        self.execute_stack(matched);
    }

    fn deliver_prompt(&mut self) {
        if let Some(prompt) = self.engine.prompt_text() {
            let prompt = prompt.to_string();
            self.session.deliver(prompt);
        }
    }

    /// Run stacked options in order, stopping once one navigates, changes the
    /// input mode or ends the session.
    fn execute_stack(&mut self, options: Vec<MenuOption>) {
        let loads = self.engine.load_count();
        let mode = self.input_mode;
        for option in options {
            self.execute_menu_option(&option);
            if self.engine.load_count() != loads || self.input_mode != mode || !self.is_active() {
                break;
            }
        }
    }

    /// Pass an option through the execute chain. Returns whether it was handled.
    pub fn execute_menu_option(&mut self, option: &MenuOption) -> bool {
        let handled = EXECUTE_CHAIN.iter().any(|callback| callback(self, option));
        metrics::inc_dispatch(handled);
        if !handled {
            debug!(
                "command not handled key={} menu={}",
                escape_log(&option.command_key),
                self.engine.current_menu
            );
            self.session.deliver("\r\nThat option is not available.\r\n");
        }
        handled
    }

    fn menu_options_callback(&mut self, option: &MenuOption) -> bool {
        match self.commands.dispatch(option) {
            Some(action) => self.apply_action(action),
            None => false,
        }
    }

    fn apply_action(&mut self, action: MenuAction) -> bool {
        match action {
            MenuAction::Goto(name) => {
                self.load_and_start_menu(&name);
                true
            }
            MenuAction::Gosub(name) => {
                let from = self.engine.current_menu.clone();
                self.start_menu(&name, Some(from));
                true
            }
            MenuAction::Return => match self.engine.take_previous() {
                Some(previous) => {
                    self.load_and_start_menu(&previous);
                    true
                }
                None => false,
            },
            MenuAction::PulldownReentrance(on) => {
                self.engine.set_reentrance(on);
                true
            }
            MenuAction::StartLogon => {
                self.reset_input_mode(InputMode::LogonModule);
                self.startup_module(ModuleKind::Logon);
                true
            }
            MenuAction::StartSignup => {
                self.reset_input_mode(InputMode::GenericModule);
                self.startup_module(ModuleKind::Signup);
                true
            }
            MenuAction::Logoff => {
                let goodbye = format!("\r\n{}\r\n", self.config.bbs.goodbye_message);
                self.session.deliver(goodbye);
                self.session.logoff();
                true
            }
            MenuAction::StartMenuEditor => {
                self.editor_state = EditorState::Command;
                self.editor_line.clear();
                self.reset_input_mode(InputMode::MenuEditor);
                self.session.deliver(EDITOR_PROMPT);
                true
            }
        }
    }

    /// Load a menu, run its `FIRSTCMD` options and draw it.
    pub fn load_and_start_menu(&mut self, name: &str) {
        self.start_menu(name, None);
    }

    /// `return_to` becomes the remembered menu, but only when `name` itself loads.
    fn start_menu(&mut self, name: &str, return_to: Option<String>) {
        let outcome = self
            .engine
            .load_menu(name, self.services.access.as_ref(), &self.session);
        match outcome {
            MenuLoad::Loaded => {
                if let Some(previous) = return_to {
                    self.engine.previous_menu = previous;
                }
            }
            MenuLoad::FellBack { requested } => {
                self.session
                    .deliver(format!("\r\nMenu {} is not available.\r\n", requested.trim()));
            }
            MenuLoad::Empty { requested } => {
                error!(
                    "No menu could be loaded (requested {}, fallback {}) for session {}",
                    escape_log(&requested),
                    escape_log(&self.engine.fallback_menu),
                    escape_log(&self.session.id)
                );
                self.session.deliver(format!(
                    "\r\nError: menu {} could not be loaded.\r\n",
                    requested.trim()
                ));
                return;
            }
        }

        let first = self
            .engine
            .first_commands(self.services.access.as_ref(), &self.session);
        if !first.is_empty() {
            if self.autorun_depth >= MAX_AUTORUN_DEPTH {
                warn!(
                    "FIRSTCMD nesting limit reached at menu {}; not running its automatic commands",
                    self.engine.current_menu
                );
            } else {
                let loads = self.engine.load_count();
                let mode = self.input_mode;
                self.autorun_depth += 1;
                self.execute_stack(first);
                self.autorun_depth -= 1;
                if self.engine.load_count() != loads || self.input_mode != mode || !self.is_active() {
                    return;
                }
            }
        }
        let screen = self.engine.redisplay_screen();
        self.session.deliver(screen);
    }

    // ---- menu editor ----

    fn menu_editor_input(&mut self, input: &str, _multibyte: bool) -> usize {
        for (offset, ch) in input.char_indices() {
            self.editor_key(ch);
            if self.input_mode != InputMode::MenuEditor || !self.is_active() {
                return offset + ch.len_utf8();
            }
        }
        input.len()
    }

    fn editor_key(&mut self, ch: char) {
        if self.editor_state == EditorState::Command && self.engine.use_hotkey() {
            if !ch.is_control() {
                self.editor_command(ch);
            }
            return;
        }
        match self.editor_line.push(ch) {
            LineEvent::None => {}
            LineEvent::Echo(text) => self.session.deliver(text),
            LineEvent::Line(line) => match self.editor_state {
                EditorState::Command => {
                    if let Some(first) = line.trim().chars().next() {
                        self.editor_command(first);
                    }
                }
                state => self.editor_name(state, line.trim()),
            },
        }
    }

    fn editor_command(&mut self, command: char) {
        let (state, prompt) = match command.to_ascii_uppercase() {
            'A' => (EditorState::AddName, "\r\nEnter Menu Name to Add : "),
            'C' => (EditorState::ChangeName, "\r\nEnter Menu Name to Change : "),
            'D' => (EditorState::DeleteName, "\r\nEnter Menu to Delete : "),
            'Q' => {
                self.editor_line.clear();
                self.reset_input_mode(InputMode::Menu);
                let screen = self.engine.redisplay_screen();
                self.session.deliver(screen);
                return;
            }
            _ => return,
        };
        self.editor_state = state;
        self.session.deliver(prompt);
    }

    fn editor_name(&mut self, state: EditorState, name: &str) {
        self.editor_state = EditorState::Command;
        if !name.is_empty() {
            let message = match self.edit_menu(state, name) {
                Ok(message) => message,
                Err(e) => format!("Error: {}", e),
            };
            self.session.deliver(format!("\r\n{}\r\n", message));
        }
        self.session.deliver(EDITOR_PROMPT);
    }

    fn edit_menu(&mut self, state: EditorState, name: &str) -> Result<String, BbsError> {
        let store = self.engine.store().clone();
        match state {
            EditorState::AddName => {
                if store.contains(name) {
                    return Err(BbsError::AlreadyExists(format!("menu {}", name)));
                }
                store.save_menu(name, &MenuDefinition::new(name))?;
                info!(
                    "menu.created name={} by={}",
                    escape_log(name),
                    escape_log(&self.session.display_name())
                );
                Ok(format!("Menu {} created.", name))
            }
            EditorState::ChangeName => {
                let menu = store.load_menu(name)?;
                let mut listing = format!("{} ({} options)", menu.info.title, menu.options.len() + menu.pulldowns.len());
                for option in menu.options.iter().chain(menu.pulldowns.iter()) {
                    listing.push_str(&format!(
                        "\r\n  {:<8} {:<3} {} {}",
                        option.menu_key, option.command_key, option.name, option.command_string
                    ));
                    if option.hidden {
                        listing.push_str(" (hidden)");
                    }
                }
                Ok(listing)
            }
            EditorState::DeleteName => {
                if name.eq_ignore_ascii_case(&self.engine.current_menu) {
                    return Ok(format!("Menu {} is in use and cannot be deleted.", name));
                }
                store.delete_menu(name)?;
                info!(
                    "menu.deleted name={} by={}",
                    escape_log(name),
                    escape_log(&self.session.display_name())
                );
                Ok(format!("Menu {} deleted.", name))
            }
            EditorState::Command => Ok(String::new()),
        }
    }

    // ---- module modes ----

    fn module_prelogon_input(&mut self, input: &str, multibyte: bool) -> usize {
        self.module_login_family_input(input, multibyte)
    }

    fn module_logon_input(&mut self, input: &str, multibyte: bool) -> usize {
        self.module_login_family_input(input, multibyte)
    }

    fn module_login_family_input(&mut self, input: &str, multibyte: bool) -> usize {
        if self.modules.update(&mut self.session, input, multibyte) == Some(false) {
            self.finish_module();
        }
        input.len()
    }

    fn module_generic_input(&mut self, input: &str, multibyte: bool) -> usize {
        if self.modules.update(&mut self.session, input, multibyte) == Some(false) {
            self.finish_module();
        }
        input.len()
    }

    /// Tear down a module that went inactive. Login-family modules route by
    /// authorization state; modules started from a menu return to that menu
    /// without reloading it.
    fn finish_module(&mut self) {
        let mode = self.input_mode;
        self.shutdown_module();
        self.reset_input_mode(InputMode::Menu);
        if mode == InputMode::GenericModule {
            let screen = self.engine.redisplay_screen();
            self.session.deliver(screen);
            return;
        }
        let next = if self.session.is_authorized() {
            self.config.menus.main_menu.clone()
        } else {
            self.config.menus.matrix_menu.clone()
        };
        self.load_and_start_menu(&next);
    }
}
