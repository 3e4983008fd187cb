//! Menu definition records: options, pulldown options, prompts and menu info.
//!
//! These are plain data loaded from a [`MenuStore`](super::menu_store::MenuStore).
//! Nothing here knows how a command is executed; see [`commands`](super::commands).

use serde::{Deserialize, Serialize};

/// Menu key that runs an option automatically whenever its menu starts.
pub const FIRSTCMD: &str = "FIRSTCMD";

/// Menu key that matches a bare ENTER.
pub const ENTER_KEY: &str = "ENTER";

/// One selectable/executable entry in a menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Display text used by listings and lightbars.
    #[serde(default)]
    pub name: String,
    /// Access control string, evaluated by [`AccessControl`](super::roles::AccessControl).
    #[serde(default)]
    pub acs: String,
    /// Left out of the menu screen; still reachable by its key. Flagged in editor listings.
    #[serde(default)]
    pub hidden: bool,
    /// Two characters: category, then action.
    pub command_key: String,
    /// Keystroke (hotkey) or word (line mode) that selects this option.
    #[serde(default)]
    pub menu_key: String,
    /// Free-form argument interpreted by the category handler, e.g. a menu name.
    #[serde(default)]
    pub command_string: String,
    /// Lightbar slot id; 0 means the option is not part of a lightbar.
    #[serde(default)]
    pub pulldown_id: u16,
}

impl MenuOption {
    pub fn new(menu_key: &str, command_key: &str, command_string: &str) -> Self {
        MenuOption {
            name: String::new(),
            acs: String::new(),
            hidden: false,
            command_key: command_key.to_string(),
            menu_key: menu_key.to_string(),
            command_string: command_string.to_string(),
            pulldown_id: 0,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_acs(mut self, acs: &str) -> Self {
        self.acs = acs.to_string();
        self
    }

    pub fn with_pulldown(mut self, id: u16) -> Self {
        self.pulldown_id = id;
        self
    }

    /// Split the command key into (category, action). `None` unless exactly two characters.
    pub fn command_chars(&self) -> Option<(char, char)> {
        let mut chars = self.command_key.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(category), Some(action), None) => Some((category, action)),
            _ => None,
        }
    }

    /// Case-insensitive comparison of typed input with `menu_key`.
    pub fn matches_input(&self, input: &str) -> bool {
        !self.menu_key.is_empty() && self.menu_key.eq_ignore_ascii_case(input)
    }

    pub fn is_first_command(&self) -> bool {
        self.menu_key.eq_ignore_ascii_case(FIRSTCMD)
    }
}

/// A named text fragment shown with a menu (the command prompt).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuPrompt {
    pub name: String,
    pub data: String,
}

/// Menu-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuInfo {
    #[serde(default)]
    pub title: String,
    /// Access required to enter the menu.
    #[serde(default)]
    pub acs: String,
    /// Overrides the configured fallback menu while this menu is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Overrides the configured hotkey/line input style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_hotkeys: Option<bool>,
    /// Name of the prompt drawn after the screen; defaults to the first prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Screen template. `%PDnn` marks where pulldown `nn` is drawn.
    #[serde(default)]
    pub screen: String,
}

/// Everything the store returns for one menu. Also the on-disk JSON layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuDefinition {
    #[serde(default)]
    pub info: MenuInfo,
    #[serde(default)]
    pub options: Vec<MenuOption>,
    #[serde(default)]
    pub pulldowns: Vec<MenuOption>,
    #[serde(default)]
    pub prompts: Vec<MenuPrompt>,
}

impl MenuDefinition {
    pub fn new(title: &str) -> Self {
        MenuDefinition {
            info: MenuInfo {
                title: title.to_string(),
                ..MenuInfo::default()
            },
            ..MenuDefinition::default()
        }
    }

    pub fn with_screen(mut self, screen: &str) -> Self {
        self.info.screen = screen.to_string();
        self
    }

    pub fn with_option(mut self, option: MenuOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_pulldown(mut self, option: MenuOption) -> Self {
        self.pulldowns.push(option);
        self
    }

    pub fn with_prompt(mut self, name: &str, data: &str) -> Self {
        self.prompts.push(MenuPrompt {
            name: name.to_string(),
            data: data.to_string(),
        });
        self
    }

    pub fn with_hotkeys(mut self, use_hotkeys: bool) -> Self {
        self.info.use_hotkeys = Some(use_hotkeys);
        self
    }
}

/// Built-in menus written by `termbbs init`.
pub fn default_menus() -> Vec<(&'static str, MenuDefinition)> {
    let matrix = MenuDefinition::new("Matrix")
        .with_screen(
            "\r\n  Welcome to the matrix\r\n\r\n  %PD01\r\n  %PD02\r\n  %PD03\r\n",
        )
        .with_pulldown(MenuOption::new("L", "{S", "").named("Logon").with_pulldown(1))
        .with_pulldown(MenuOption::new("A", "{A", "").named("Apply").with_pulldown(2))
        .with_pulldown(MenuOption::new("G", "{G", "").named("Goodbye").with_pulldown(3))
        .with_prompt("matrix", "\r\nMatrix: ");
    let main = MenuDefinition::new("Main")
        .with_screen("\r\n  Main Menu\r\n\r\n  (*) Menu editor\r\n  (G) Goodbye\r\n")
        .with_option(MenuOption::new("*", "*#", "").named("Menu editor").with_acs("s10"))
        .with_option(MenuOption::new("G", "{G", "").named("Goodbye"))
        .with_prompt("main", "\r\nCommand: ");
    vec![("matrix", matrix), ("main", main)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_chars_requires_exactly_two() {
        assert_eq!(MenuOption::new("G", "{G", "").command_chars(), Some(('{', 'G')));
        assert_eq!(MenuOption::new("G", "{", "").command_chars(), None);
        assert_eq!(MenuOption::new("G", "{GX", "").command_chars(), None);
        assert_eq!(MenuOption::new("G", "", "").command_chars(), None);
    }

    #[test]
    fn menu_key_matching_ignores_case() {
        let opt = MenuOption::new("g", "{G", "");
        assert!(opt.matches_input("G"));
        assert!(opt.matches_input("g"));
        assert!(!opt.matches_input("GG"));
        assert!(!MenuOption::new("", "{G", "").matches_input(""));
        assert!(MenuOption::new("firstcmd", "-^", "main").is_first_command());
    }

    #[test]
    fn menu_definition_parses_with_missing_sections() {
        let def: MenuDefinition =
            serde_json::from_str(r#"{"options":[{"command_key":"{G","menu_key":"G"}]}"#).unwrap();
        assert_eq!(def.options.len(), 1);
        assert!(def.pulldowns.is_empty());
        assert!(def.info.use_hotkeys.is_none());
    }
}
