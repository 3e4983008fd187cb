//! Loaded-menu state shared by all input modes of a session.
//!
//! [`MenuEngine`] owns the current menu's options, prompts and pulldowns, the
//! navigation context, the lightbar position and the keystroke accumulation
//! policy. It never executes commands; the menu system decides what a resolved
//! keystroke means.

use log::{debug, warn};
use std::sync::Arc;

use super::line_input::{Arrow, Key, KeyDecoder, LineEvent, LineInput};
use super::menu::{MenuDefinition, MenuInfo, MenuOption, MenuPrompt};
use super::menu_store::MenuStore;
use super::render::{build_lightbar_matrix, LightbarMatrix, ScreenRenderer, ScreenRequest};
use super::roles::AccessControl;
use super::session::Session;
use crate::errors::BbsError;
use crate::logutil::escape_log;

/// Result of accepting one character in menu mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    None,
    /// Echo for a character added to (or erased from) the line buffer.
    Echo(String),
    /// Line mode: a completed, non-empty line.
    Line(String),
    /// Hotkey mode: a single command character.
    Hotkey(char),
    /// ENTER with nothing typed.
    Enter,
    Arrow(Arrow),
}

/// Outcome of [`MenuEngine::load_menu`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuLoad {
    Loaded,
    /// The requested menu was unavailable and the fallback menu was loaded instead.
    FellBack { requested: String },
    /// Neither the requested menu nor the fallback could be loaded; state is empty.
    Empty { requested: String },
}

pub struct MenuEngine {
    store: Arc<dyn MenuStore>,
    renderer: Arc<dyn ScreenRenderer>,
    default_fallback: String,
    default_hotkeys: bool,

    pub current_menu: String,
    pub previous_menu: String,
    pub fallback_menu: String,
    pub fail_flag: bool,

    info: MenuInfo,
    options: Vec<MenuOption>,
    prompts: Vec<MenuPrompt>,
    pulldowns: Vec<MenuOption>,
    matrix: LightbarMatrix,

    active_pulldown: Option<usize>,
    reentrance: bool,

    use_hotkey: bool,
    line: LineInput,
    keys: KeyDecoder,
    loads: u64,
}

impl MenuEngine {
    pub fn new(
        store: Arc<dyn MenuStore>,
        renderer: Arc<dyn ScreenRenderer>,
        fallback_menu: &str,
        use_hotkeys: bool,
    ) -> Self {
        MenuEngine {
            store,
            renderer,
            default_fallback: fallback_menu.to_string(),
            default_hotkeys: use_hotkeys,
            current_menu: String::new(),
            previous_menu: String::new(),
            fallback_menu: fallback_menu.to_string(),
            fail_flag: false,
            info: MenuInfo::default(),
            options: Vec::new(),
            prompts: Vec::new(),
            pulldowns: Vec::new(),
            matrix: LightbarMatrix::default(),
            active_pulldown: None,
            reentrance: false,
            use_hotkey: use_hotkeys,
            line: LineInput::new(),
            keys: KeyDecoder::new(),
            loads: 0,
        }
    }

    pub fn store(&self) -> &Arc<dyn MenuStore> {
        &self.store
    }

    /// Replace the loaded menu with `name`.
    ///
    /// A missing menu, or one whose access string the session fails, loads the
    /// fallback menu instead and sets `fail_flag`. If the fallback fails too the
    /// loaded state is cleared and `current_menu` becomes empty.
    pub fn load_menu(&mut self, name: &str, access: &dyn AccessControl, session: &Session) -> MenuLoad {
        self.loads += 1;
        match self.fetch(name, access, session) {
            Ok((key, definition)) => {
                self.install(key, definition);
                self.fail_flag = false;
                MenuLoad::Loaded
            }
            Err(e) => {
                warn!("Menu {} unavailable: {}", escape_log(name), e);
                self.fail_flag = true;
                let fallback = self.fallback_menu.clone();
                if !fallback.eq_ignore_ascii_case(name.trim()) {
                    match self.fetch(&fallback, access, session) {
                        Ok((key, definition)) => {
                            self.install(key, definition);
                            return MenuLoad::FellBack {
                                requested: name.to_string(),
                            };
                        }
                        Err(e) => warn!("Fallback menu {} unavailable: {}", escape_log(&fallback), e),
                    }
                }
                self.clear_options();
                self.clear_pulldown_options();
                self.clear_all_prompts();
                self.info = MenuInfo::default();
                self.matrix = LightbarMatrix::default();
                self.current_menu.clear();
                MenuLoad::Empty {
                    requested: name.to_string(),
                }
            }
        }
    }

    fn fetch(
        &self,
        name: &str,
        access: &dyn AccessControl,
        session: &Session,
    ) -> Result<(String, MenuDefinition), BbsError> {
        let key = name.trim().to_ascii_lowercase();
        let definition = self.store.load_menu(&key)?;
        if !access.allows(&definition.info.acs, session) {
            return Err(BbsError::NotFound(format!("menu {} (access denied)", key)));
        }
        Ok((key, definition))
    }

    fn install(&mut self, name: String, definition: MenuDefinition) {
        let same_menu = self.current_menu == name;
        let remembered = self.active_pulldown;

        self.clear_options();
        self.clear_pulldown_options();
        self.clear_all_prompts();

        let MenuDefinition {
            info,
            options,
            pulldowns,
            prompts,
        } = definition;
        self.use_hotkey = info.use_hotkeys.unwrap_or(self.default_hotkeys);
        self.fallback_menu = info
            .fallback
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.default_fallback.clone());
        self.info = info;
        self.options = options;
        self.pulldowns = pulldowns;
        self.prompts = prompts;
        self.matrix = self.build_lightbar_matrix();
        self.current_menu = name;

        self.active_pulldown = match remembered {
            Some(i) if self.reentrance && same_menu && i < self.pulldowns.len() => Some(i),
            _ if self.pulldowns.is_empty() => None,
            _ => Some(0),
        };
        self.line.clear();
        self.keys = KeyDecoder::new();
        debug!(
            "menu.load name={} options={} pulldowns={} hotkeys={}",
            self.current_menu,
            self.options.len(),
            self.pulldowns.len(),
            self.use_hotkey
        );
    }

    pub fn clear_options(&mut self) {
        self.options.clear();
    }

    pub fn clear_pulldown_options(&mut self) {
        self.pulldowns.clear();
        self.active_pulldown = None;
    }

    pub fn clear_all_prompts(&mut self) {
        self.prompts.clear();
    }

    /// Cell positions for the loaded pulldowns, derived from the screen template.
    pub fn build_lightbar_matrix(&self) -> LightbarMatrix {
        build_lightbar_matrix(&self.info.screen, &self.pulldowns)
    }

    /// Render the loaded menu again without reloading it.
    pub fn redisplay_screen(&self) -> String {
        self.renderer.render_screen(&ScreenRequest {
            title: &self.info.title,
            screen: &self.matrix.screen,
            cells: &self.matrix.cells,
            active: self.active_pulldown,
            prompt: self.prompt_text(),
        })
    }

    /// The prompt named by the menu info, otherwise the first prompt.
    pub fn prompt_text(&self) -> Option<&str> {
        let named = self
            .info
            .prompt
            .as_deref()
            .and_then(|name| self.prompts.iter().find(|p| p.name.eq_ignore_ascii_case(name)));
        named.or_else(|| self.prompts.first()).map(|p| p.data.as_str())
    }

    /// Feed one character through the escape decoder and the hotkey or line policy.
    pub fn accept(&mut self, ch: char) -> KeyInput {
        let ch = match self.keys.feed(ch) {
            Key::Ignored => return KeyInput::None,
            Key::Arrow(arrow) => return KeyInput::Arrow(arrow),
            Key::Char(ch) => ch,
        };
        if self.use_hotkey {
            return match ch {
                '\r' => KeyInput::Enter,
                c if c.is_control() => KeyInput::None,
                c => KeyInput::Hotkey(c),
            };
        }
        match self.line.push(ch) {
            LineEvent::None => KeyInput::None,
            LineEvent::Echo(text) => KeyInput::Echo(text),
            LineEvent::Line(line) if line.trim().is_empty() => KeyInput::Enter,
            LineEvent::Line(line) => KeyInput::Line(line),
        }
    }

    /// Move the lightbar. Returns the repaint for the two affected cells.
    pub fn lightbar_update(&mut self, arrow: Arrow) -> Option<String> {
        let count = self.pulldowns.len();
        let current = self.active_pulldown?;
        if count == 0 {
            return None;
        }
        let next = match arrow {
            Arrow::Up | Arrow::Left => (current + count - 1) % count,
            Arrow::Down | Arrow::Right => (current + 1) % count,
        };
        if next == current {
            return None;
        }
        self.active_pulldown = Some(next);
        let cell = |i: usize| self.matrix.cells.iter().find(|c| c.index == i);
        let mut out = String::new();
        if let Some(old) = cell(current) {
            out.push_str(&self.renderer.render_cell(old, false));
        }
        if let Some(new) = cell(next) {
            out.push_str(&self.renderer.render_cell(new, true));
        }
        Some(out)
    }

    pub fn active_pulldown(&self) -> Option<usize> {
        self.active_pulldown
    }

    pub fn active_pulldown_option(&self) -> Option<&MenuOption> {
        self.pulldowns.get(self.active_pulldown?)
    }

    pub fn set_reentrance(&mut self, on: bool) {
        self.reentrance = on;
    }

    pub fn reentrance(&self) -> bool {
        self.reentrance
    }

    /// Options (then pulldowns) selected by `input` that the session may use,
    /// in definition order.
    pub fn matching_options(
        &self,
        input: &str,
        access: &dyn AccessControl,
        session: &Session,
    ) -> Vec<MenuOption> {
        self.options
            .iter()
            .chain(self.pulldowns.iter())
            .filter(|o| o.matches_input(input) && access.allows(&o.acs, session))
            .cloned()
            .collect()
    }

    /// Options that run automatically when the menu starts.
    pub fn first_commands(&self, access: &dyn AccessControl, session: &Session) -> Vec<MenuOption> {
        self.options
            .iter()
            .filter(|o| o.is_first_command() && access.allows(&o.acs, session))
            .cloned()
            .collect()
    }

    /// Take the remembered menu, leaving none behind.
    pub fn take_previous(&mut self) -> Option<String> {
        let previous = std::mem::take(&mut self.previous_menu);
        (!previous.is_empty()).then_some(previous)
    }

    pub fn options(&self) -> &[MenuOption] {
        &self.options
    }

    pub fn pulldowns(&self) -> &[MenuOption] {
        &self.pulldowns
    }

    pub fn prompts(&self) -> &[MenuPrompt] {
        &self.prompts
    }

    pub fn info(&self) -> &MenuInfo {
        &self.info
    }

    pub fn use_hotkey(&self) -> bool {
        self.use_hotkey
    }

    pub fn line_buffer(&self) -> &str {
        self.line.as_str()
    }

    /// Incremented on every load attempt; lets callers notice navigation.
    pub fn load_count(&self) -> u64 {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbs::menu_store::MemoryMenuStore;
    use crate::bbs::render::AnsiRenderer;
    use crate::bbs::roles::LevelAccess;

    fn engine_with(store: MemoryMenuStore) -> MenuEngine {
        MenuEngine::new(Arc::new(store), Arc::new(AnsiRenderer), "main", false)
    }

    fn pulldown_menu() -> MenuDefinition {
        MenuDefinition::new("Bars")
            .with_screen("%PD01\r\n%PD02\r\n%PD03")
            .with_pulldown(MenuOption::new("A", "-^", "main").named("One").with_pulldown(1))
            .with_pulldown(MenuOption::new("B", "-^", "main").named("Two").with_pulldown(2))
            .with_pulldown(MenuOption::new("C", "-^", "main").named("Three").with_pulldown(3))
    }

    #[test]
    fn line_mode_buffers_until_cr() {
        let mut engine = engine_with(MemoryMenuStore::new());
        for c in "HEL".chars() {
            assert_eq!(engine.accept(c), KeyInput::Echo(c.to_string()));
        }
        assert_eq!(engine.line_buffer(), "HEL");
        engine.accept('L');
        engine.accept('O');
        assert_eq!(engine.accept('\r'), KeyInput::Line("HELLO".into()));
        assert_eq!(engine.line_buffer(), "");
        assert_eq!(engine.accept('\r'), KeyInput::Enter);
    }

    #[test]
    fn hotkey_mode_acts_per_character() {
        let mut engine = MenuEngine::new(Arc::new(MemoryMenuStore::new()), Arc::new(AnsiRenderer), "main", true);
        assert_eq!(engine.accept('g'), KeyInput::Hotkey('g'));
        assert_eq!(engine.accept('\n'), KeyInput::None);
        assert_eq!(engine.accept('\r'), KeyInput::Enter);
        assert_eq!(engine.line_buffer(), "");
    }

    #[test]
    fn lightbar_wraps_both_ways() {
        let store = MemoryMenuStore::new().with_menu("bars", pulldown_menu());
        let mut engine = engine_with(store);
        let session = Session::new("t".into(), "p".into());
        assert_eq!(engine.load_menu("bars", &LevelAccess, &session), MenuLoad::Loaded);
        assert_eq!(engine.active_pulldown(), Some(0));
        let repaint = engine.lightbar_update(Arrow::Up).unwrap();
        assert_eq!(engine.active_pulldown(), Some(2));
        assert!(repaint.contains("\x1b[1;1HOne"));
        assert!(repaint.contains("\x1b[3;1H\x1b[7mThree"));
        engine.lightbar_update(Arrow::Right);
        assert_eq!(engine.active_pulldown(), Some(0));
        assert_eq!(engine.active_pulldown_option().map(|o| o.name.as_str()), Some("One"));
    }

    #[test]
    fn reentrance_keeps_position_on_same_menu_only() {
        let store = MemoryMenuStore::new()
            .with_menu("bars", pulldown_menu())
            .with_menu("main", MenuDefinition::new("Main"));
        let mut engine = engine_with(store);
        let session = Session::new("t".into(), "p".into());
        engine.load_menu("bars", &LevelAccess, &session);
        engine.lightbar_update(Arrow::Down);
        engine.load_menu("bars", &LevelAccess, &session);
        assert_eq!(engine.active_pulldown(), Some(0));

        engine.set_reentrance(true);
        engine.lightbar_update(Arrow::Down);
        engine.load_menu("bars", &LevelAccess, &session);
        assert_eq!(engine.active_pulldown(), Some(1));

        engine.load_menu("main", &LevelAccess, &session);
        assert_eq!(engine.active_pulldown(), None);
        engine.load_menu("bars", &LevelAccess, &session);
        assert_eq!(engine.active_pulldown(), Some(0));
    }

    #[test]
    fn access_denied_menu_falls_back() {
        let mut locked = MenuDefinition::new("Sysop");
        locked.info.acs = "s10".into();
        let store = MemoryMenuStore::new()
            .with_menu("sysop", locked)
            .with_menu("main", MenuDefinition::new("Main"));
        let mut engine = engine_with(store);
        let session = Session::new("t".into(), "p".into());
        assert_eq!(
            engine.load_menu("sysop", &LevelAccess, &session),
            MenuLoad::FellBack { requested: "sysop".into() }
        );
        assert_eq!(engine.current_menu, "main");
        assert!(engine.fail_flag);
    }

    #[test]
    fn prompt_defaults_to_first() {
        let store = MemoryMenuStore::new().with_menu(
            "main",
            MenuDefinition::new("Main").with_prompt("a", "A> ").with_prompt("b", "B> "),
        );
        let mut engine = engine_with(store);
        let session = Session::new("t".into(), "p".into());
        engine.load_menu("main", &LevelAccess, &session);
        assert_eq!(engine.prompt_text(), Some("A> "));
        assert!(engine.redisplay_screen().ends_with("A> "));
    }
}
