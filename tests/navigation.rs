use std::sync::Arc;

use termbbs::bbs::menu::{MenuDefinition, MenuOption};
use termbbs::bbs::menu_store::{MemoryMenuStore, MenuStore};
use termbbs::bbs::menu_system::{InputMode, MenuSystem};
use termbbs::config::Config;
use tempfile::tempdir;

mod common;
use common::{default_store, drain, feed, menu, open_users, option, system_with, test_config};

async fn started(cfg: Config, store: MemoryMenuStore) -> (tempfile::TempDir, MenuSystem) {
    let tmp = tempdir().unwrap();
    let mut cfg = cfg;
    cfg.storage.data_dir = tmp.path().to_str().unwrap().to_string();
    let users = open_users(&cfg).await;
    let mut system = system_with(cfg, Arc::new(store), users);
    system.on_enter();
    feed(&mut system, "x");
    drain(&mut system);
    (tmp, system)
}

fn nav_store() -> MemoryMenuStore {
    MemoryMenuStore::new()
        .with_menu(
            "matrix",
            menu(
                "Matrix",
                vec![
                    option("F", "-/", "files"),
                    option("J", "-^", "files"),
                    option("Z", "-^", "nowhere"),
                    option("G", "{G", ""),
                ],
            ),
        )
        .with_menu(
            "files",
            menu(
                "Files",
                vec![
                    option("B", "-!", ""),
                    option("M", "-^", "matrix"),
                    option("N", "-/", "nowhere"),
                ],
            ),
        )
        .with_menu("main", menu("Main", vec![option("B", "-!", "")]))
}

#[tokio::test]
async fn gosub_and_return() {
    let (_tmp, mut system) = started(test_config(""), nav_store()).await;

    feed(&mut system, "F");
    assert_eq!(system.engine().current_menu, "files");
    assert_eq!(system.engine().previous_menu, "matrix");

    feed(&mut system, "B");
    assert_eq!(system.engine().current_menu, "matrix");
    assert_eq!(system.engine().previous_menu, "");

    // Goto does not touch the remembered menu
    feed(&mut system, "J");
    assert_eq!(system.engine().current_menu, "files");
    assert_eq!(system.engine().previous_menu, "");
    drain(&mut system);

    // Nothing to return to
    feed(&mut system, "b");
    assert_eq!(system.engine().current_menu, "files");
    assert!(drain(&mut system).contains("not available"));
}

#[tokio::test]
async fn missing_menu_uses_fallback_without_touching_previous() {
    let (_tmp, mut system) = started(test_config(""), nav_store()).await;
    feed(&mut system, "F");
    feed(&mut system, "M");
    assert_eq!(system.engine().previous_menu, "matrix");
    drain(&mut system);

    feed(&mut system, "Z");
    assert_eq!(system.engine().current_menu, "main");
    assert!(system.engine().fail_flag);
    assert_eq!(system.engine().previous_menu, "matrix");
    let out = drain(&mut system);
    assert!(out.contains("Menu nowhere is not available."));
    assert!(out.contains("Main"));
}

#[tokio::test]
async fn gosub_to_missing_menu_keeps_previous() {
    let (_tmp, mut system) = started(test_config(""), nav_store()).await;
    feed(&mut system, "F");
    assert_eq!(system.engine().previous_menu, "matrix");

    feed(&mut system, "N");
    assert_eq!(system.engine().current_menu, "main");
    assert!(system.engine().fail_flag);
    assert_eq!(system.engine().previous_menu, "matrix", "fallback must not remember files");

    // Return still goes to the menu remembered by the successful gosub
    feed(&mut system, "B");
    assert_eq!(system.engine().current_menu, "matrix");
}

#[tokio::test]
async fn missing_menu_and_fallback_leave_empty_state() {
    let store = nav_store();
    store.delete_menu("main").unwrap();
    let (_tmp, mut system) = started(test_config(""), store).await;
    feed(&mut system, "Z");
    let engine = system.engine();
    assert_eq!(engine.current_menu, "");
    assert!(engine.fail_flag);
    assert!(engine.options().is_empty());
    assert!(engine.prompts().is_empty());
    assert!(engine.pulldowns().is_empty());
    assert!(drain(&mut system).contains("Error: menu nowhere could not be loaded."));
    assert_eq!(system.input_mode(), InputMode::Menu);
}

#[tokio::test]
async fn loading_replaces_everything() {
    let store = default_store();
    let (_tmp, mut system) = started(test_config(""), store).await;
    system.load_and_start_menu("main");
    assert_eq!(system.engine().current_menu, "main");
    assert!(!system.engine().options().is_empty());

    system.load_and_start_menu("matrix");
    let engine = system.engine();
    assert_eq!(engine.current_menu, "matrix");
    assert!(engine.options().is_empty(), "main options must be gone");
    assert!(engine.prompts().iter().all(|p| p.name == "matrix"));
    assert_eq!(engine.pulldowns().len(), 3);
}

#[tokio::test]
async fn firstcmd_runs_on_start_and_nesting_is_capped() {
    let store = MemoryMenuStore::new()
        .with_menu("matrix", menu("Matrix", vec![option("FIRSTCMD", "-^", "main")]))
        .with_menu("main", menu("Main", vec![option("L", "-^", "loop1")]))
        .with_menu("loop1", menu("Loop1", vec![option("FIRSTCMD", "-^", "loop2")]))
        .with_menu("loop2", menu("Loop2", vec![option("FIRSTCMD", "-^", "loop1")]));
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path().to_str().unwrap());
    let users = open_users(&cfg).await;
    let mut system = system_with(cfg, Arc::new(store), users);
    system.on_enter();
    feed(&mut system, "x");
    assert_eq!(system.engine().current_menu, "main");
    let out = drain(&mut system);
    assert!(!out.contains("Matrix"), "auto-run menu is never drawn");

    feed(&mut system, "L");
    let current = system.engine().current_menu.clone();
    assert!(current == "loop1" || current == "loop2");
    assert_eq!(system.input_mode(), InputMode::Menu);
    // exactly one screen is drawn, by the menu where the chain stopped
    assert_eq!(drain(&mut system).matches("\x1b[2J").count(), 1);
}

#[tokio::test]
async fn stacked_options_stop_after_navigation() {
    let store = MemoryMenuStore::new()
        .with_menu(
            "matrix",
            menu(
                "Matrix",
                vec![
                    option("S", "-'", ""),
                    option("S", "-^", "main"),
                    option("S", "{G", ""),
                ],
            ),
        )
        .with_menu("main", menu("Main", vec![]));
    let (_tmp, mut system) = started(test_config(""), store).await;
    feed(&mut system, "s");
    assert!(system.engine().reentrance());
    assert_eq!(system.engine().current_menu, "main");
    assert!(system.session().is_connected(), "logoff after the goto must not run");
}

#[tokio::test]
async fn unknown_commands_are_not_handled() {
    let store = MemoryMenuStore::new().with_menu(
        "matrix",
        menu(
            "Matrix",
            vec![
                option("A", "AX", "main"),
                option("B", "{", "main"),
                option("C", "-^^", "main"),
                option("D", "F1", ""),
            ],
        ),
    );
    let (_tmp, mut system) = started(test_config(""), store).await;
    let loads = system.engine().load_count();
    for key in ["A", "B", "C", "D"] {
        feed(&mut system, key);
        assert!(drain(&mut system).contains("That option is not available."), "{key}");
    }
    assert_eq!(system.engine().load_count(), loads);
    assert_eq!(system.engine().current_menu, "matrix");
    assert_eq!(system.input_mode(), InputMode::Menu);
}

#[tokio::test]
async fn access_string_hides_options() {
    let store = MemoryMenuStore::new()
        .with_menu(
            "matrix",
            menu("Matrix", vec![option("X", "-^", "main").with_acs("s10")]),
        )
        .with_menu("main", menu("Main", vec![]));
    let (_tmp, mut system) = started(test_config(""), store).await;
    feed(&mut system, "X");
    assert_eq!(system.engine().current_menu, "matrix");
    assert!(drain(&mut system).is_empty());
}

#[tokio::test]
async fn line_mode_resolves_whole_lines() {
    let mut cfg = test_config("");
    cfg.menus.use_hotkeys = false;
    let store = MemoryMenuStore::new()
        .with_menu("matrix", menu("Matrix", vec![option("HELLO", "-^", "main")]))
        .with_menu("main", menu("Main", vec![]));
    let (_tmp, mut system) = started(cfg, store).await;

    feed(&mut system, "HEL");
    assert_eq!(system.engine().line_buffer(), "HEL");
    assert_eq!(system.engine().current_menu, "matrix");
    assert_eq!(drain(&mut system), "HEL");

    feed(&mut system, "LO\r");
    assert_eq!(system.engine().current_menu, "main");
    assert_eq!(system.engine().line_buffer(), "");

    // No match: the prompt comes back
    feed(&mut system, "nope\r");
    assert!(drain(&mut system).ends_with("> "));
}

#[tokio::test]
async fn per_menu_hotkey_override() {
    let store = MemoryMenuStore::new()
        .with_menu(
            "matrix",
            menu("Matrix", vec![option("GO", "-^", "main")]).with_hotkeys(false),
        )
        .with_menu("main", MenuDefinition::new("Main"));
    let (_tmp, mut system) = started(test_config(""), store).await;
    assert!(!system.engine().use_hotkey());
    feed(&mut system, "go\r");
    assert_eq!(system.engine().current_menu, "main");
    assert!(system.engine().use_hotkey());
}

#[tokio::test]
async fn lightbar_arrows_and_enter() {
    let (_tmp, mut system) = started(test_config(""), default_store()).await;
    assert_eq!(system.engine().active_pulldown(), Some(0));

    feed(&mut system, "\x1b[B");
    assert_eq!(system.engine().active_pulldown(), Some(1));
    let repaint = drain(&mut system);
    assert!(repaint.contains("\x1b[7mApply"));
    assert!(!repaint.contains("\x1b[2J"), "arrow keys repaint cells only");

    feed(&mut system, "\x1bOA\x1bOA");
    assert_eq!(system.engine().active_pulldown(), Some(2));
    feed(&mut system, "\x1b[C");
    assert_eq!(system.engine().active_pulldown(), Some(0));

    feed(&mut system, "\r");
    assert_eq!(system.input_mode(), InputMode::LogonModule);
}

#[tokio::test]
async fn enter_key_option_on_plain_menu() {
    let store = MemoryMenuStore::new()
        .with_menu("matrix", menu("Matrix", vec![option("ENTER", "-^", "main")]))
        .with_menu("main", menu("Main", vec![]));
    let (_tmp, mut system) = started(test_config(""), store).await;
    feed(&mut system, "\r");
    assert_eq!(system.engine().current_menu, "main");
}

#[tokio::test]
async fn menu_editor_add_change_delete_quit() {
    let store = MemoryMenuStore::new()
        .with_menu(
            "matrix",
            menu("Matrix", vec![option("*", "*#", ""), option("G", "{G", "").named("Goodbye")]),
        )
        .with_menu("main", menu("Main", vec![]));
    let (_tmp, mut system) = started(test_config(""), store).await;

    feed(&mut system, "*");
    assert_eq!(system.input_mode(), InputMode::MenuEditor);
    assert!(drain(&mut system).contains("(A)dd (C)hange (D)elete (Q)uit"));

    feed(&mut system, "A");
    assert!(drain(&mut system).contains("Enter Menu Name to Add"));
    feed(&mut system, "files\r");
    assert!(drain(&mut system).contains("Menu files created."));
    assert!(system.engine().store().contains("files"));

    feed(&mut system, "afiles\r");
    assert!(drain(&mut system).contains("already exists"));

    feed(&mut system, "Cmatrix\r");
    let listing = drain(&mut system);
    assert!(listing.contains("{G"));
    assert!(listing.contains("Goodbye"));

    feed(&mut system, "Dmatrix\r");
    assert!(drain(&mut system).contains("in use"));
    feed(&mut system, "Dfiles\r");
    assert!(drain(&mut system).contains("Menu files deleted."));
    assert!(!system.engine().store().contains("files"));

    feed(&mut system, "D../x\r");
    assert!(drain(&mut system).contains("Error: Invalid menu name"));

    feed(&mut system, "X");
    assert_eq!(system.input_mode(), InputMode::MenuEditor);

    let loads = system.engine().load_count();
    feed(&mut system, "q");
    assert_eq!(system.input_mode(), InputMode::Menu);
    assert_eq!(system.engine().load_count(), loads);
    assert!(drain(&mut system).contains("Matrix"));
}

#[test]
fn invalid_config_is_fatal() {
    let mut cfg = Config::default();
    cfg.menus.main_menu = "no/slash".into();
    let cfg = Arc::new(cfg);
    let store: Arc<dyn MenuStore> = Arc::new(MemoryMenuStore::new());
    let services = termbbs::bbs::menu_system::Services {
        menus: store,
        renderer: Arc::new(termbbs::bbs::render::AnsiRenderer),
        access: Arc::new(termbbs::bbs::roles::LevelAccess),
        modules: Arc::new(common::ScriptedModules::default()),
    };
    let session = termbbs::bbs::session::Session::new("s".into(), "p".into());
    assert!(MenuSystem::new(cfg, services, session).is_err());
}

#[test]
fn option_builders_set_fields() {
    let o = MenuOption::new("K", "-^", "main").named("Key").with_pulldown(4);
    assert_eq!(o.pulldown_id, 4);
    assert_eq!(o.name, "Key");
}
