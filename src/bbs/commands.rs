//! Command key dispatch.
//!
//! A menu option's two-character command key selects a category with its first
//! character and an action within that category with its second. The table
//! below maps every recognised category prefix to a handler that turns the
//! option into a [`MenuAction`]; the session state machine then carries the
//! action out. Menus are user-editable data, so anything the table does not
//! know resolves to `None` ("not handled") instead of an error.

use std::collections::HashMap;

use super::menu::MenuOption;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Control,
    MultiNode,
    Matrix,
    GlobalNewScan,
    MainMenu,
    Door,
    Sysop,
    NewUserVoting,
    ConferenceEditor,
    DataArea,
    Email,
    File,
    JoinConference,
    Message,
    QwkMail,
    TopTen,
    MessageBaseSponsor,
    FileBaseSponsor,
    Voting,
    ColorSetting,
}

/// What a resolved command asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    /// `-^` load the named menu.
    Goto(String),
    /// `-/` remember the current menu, then load the named one.
    Gosub(String),
    /// `-!` go back to the menu remembered by the last gosub.
    Return,
    /// `-'` on, `` -` `` off.
    PulldownReentrance(bool),
    /// `{S`
    StartLogon,
    /// `{A`
    StartSignup,
    /// `{G`
    Logoff,
    /// `*#`
    StartMenuEditor,
}

type CategoryHandler = fn(char, &MenuOption) -> Option<MenuAction>;

const CATEGORIES: &[(char, CommandCategory, CategoryHandler)] = &[
    ('-', CommandCategory::Control, control_commands),
    ('&', CommandCategory::MultiNode, not_available),
    ('{', CommandCategory::Matrix, matrix_commands),
    ('!', CommandCategory::GlobalNewScan, not_available),
    ('[', CommandCategory::MainMenu, not_available),
    ('.', CommandCategory::Door, not_available),
    ('*', CommandCategory::Sysop, sysop_commands),
    ('^', CommandCategory::NewUserVoting, not_available),
    ('C', CommandCategory::ConferenceEditor, not_available),
    ('D', CommandCategory::DataArea, not_available),
    ('E', CommandCategory::Email, not_available),
    ('F', CommandCategory::File, not_available),
    ('J', CommandCategory::JoinConference, not_available),
    ('M', CommandCategory::Message, not_available),
    ('Q', CommandCategory::QwkMail, not_available),
    ('R', CommandCategory::TopTen, not_available),
    ('S', CommandCategory::MessageBaseSponsor, not_available),
    ('T', CommandCategory::FileBaseSponsor, not_available),
    ('V', CommandCategory::Voting, not_available),
    ('+', CommandCategory::ColorSetting, not_available),
];

fn menu_argument(option: &MenuOption) -> Option<String> {
    let name = option.command_string.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn control_commands(action: char, option: &MenuOption) -> Option<MenuAction> {
    match action {
        '^' => menu_argument(option).map(MenuAction::Goto),
        '/' => menu_argument(option).map(MenuAction::Gosub),
        '!' => Some(MenuAction::Return),
        // Re-entrance: coming back to the same pulldown menu keeps the selected
        // bar. Only meaningful when the executed command stays on this menu.
        '\'' => Some(MenuAction::PulldownReentrance(true)),
        '`' => Some(MenuAction::PulldownReentrance(false)),
        _ => None,
    }
}

fn matrix_commands(action: char, _option: &MenuOption) -> Option<MenuAction> {
    match action {
        'S' => Some(MenuAction::StartLogon),
        'A' => Some(MenuAction::StartSignup),
        'G' => Some(MenuAction::Logoff),
        // T (system password), C (check), F (feedback), P (chat), X (drop to BBS)
        _ => None,
    }
}

fn sysop_commands(action: char, _option: &MenuOption) -> Option<MenuAction> {
    match action {
        '#' => Some(MenuAction::StartMenuEditor),
        _ => None,
    }
}

fn not_available(_action: char, _option: &MenuOption) -> Option<MenuAction> {
    None
}

/// Fixed map from category prefix to handler, built once per session.
pub struct CommandDispatchTable {
    handlers: HashMap<char, (CommandCategory, CategoryHandler)>,
}

impl CommandDispatchTable {
    pub fn new() -> Self {
        let handlers = CATEGORIES
            .iter()
            .map(|&(prefix, category, handler)| (prefix, (category, handler)))
            .collect();
        CommandDispatchTable { handlers }
    }

    /// Category bound to a prefix character, if any.
    pub fn category(&self, prefix: char) -> Option<CommandCategory> {
        self.handlers.get(&prefix).map(|(category, _)| *category)
    }

    /// Recognised prefixes in table order.
    pub fn prefixes() -> impl Iterator<Item = char> {
        CATEGORIES.iter().map(|(prefix, _, _)| *prefix)
    }

    /// Resolve an option to an action. `None` when the command key is not
    /// exactly two characters, the category is unknown, or the category has no
    /// such action.
    pub fn dispatch(&self, option: &MenuOption) -> Option<MenuAction> {
        let (prefix, action) = option.command_chars()?;
        let (_, handler) = self.handlers.get(&prefix)?;
        handler(action, option)
    }
}

impl Default for CommandDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}
