//! Binary entrypoint for the termbbs CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the telnet server
//! - `init` - create a starter `config.toml` and the default `matrix` / `main` menus
//! - `check-menus` - validate every menu definition against the command table
//! - `adduser <name> [--level <n>]` - create an account (password prompted, argon2 hashed)
//!
//! See the library crate docs for module‑level details: `termbbs::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::sync::Arc;

use termbbs::bbs::commands::{CommandDispatchTable, MenuAction};
use termbbs::bbs::menu::default_menus;
use termbbs::bbs::menu_store::{JsonMenuStore, MenuStore};
use termbbs::bbs::roles::{role_name, LEVEL_USER};
use termbbs::bbs::BbsServer;
use termbbs::config::Config;
use termbbs::storage::UserStore;
use termbbs::validation::{validate_password, validate_sysop_name};

#[derive(Parser)]
#[command(name = "termbbs")]
#[command(about = "A telnet Bulletin Board System with a data-driven menu engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the BBS server
    Start {
        /// Listen address, overrides server.bind (e.g., 127.0.0.1:2323)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Initialize a new BBS configuration and default menus
    Init,
    /// Check menu definitions for unknown commands and missing targets
    CheckMenus,
    /// Create a user account
    Adduser {
        /// Account name
        name: String,
        /// User level (1 = user, 5 = moderator, 10 = sysop)
        #[arg(short, long, default_value_t = LEVEL_USER)]
        level: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init has no config yet
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { bind } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting termbbs v{}", env!("CARGO_PKG_VERSION"));
            let server = BbsServer::new(Arc::new(config), bind.as_deref()).await?;
            server.run().await?;
        }
        Commands::Init => {
            info!("Initializing new BBS configuration");
            let config = Config::default();
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let store = JsonMenuStore::open(&config.storage.data_dir).await?;
            for (name, menu) in default_menus() {
                if !store.contains(name) {
                    store.save_menu(name, &menu)?;
                    info!("Created menu {}", name);
                }
            }
            store.flush().await?;
            info!("Initialized menus in {}/menus", config.storage.data_dir);
        }
        Commands::CheckMenus => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            config.validate()?;
            let store = JsonMenuStore::open(&config.storage.data_dir).await?;
            let problems = check_menus(&store, &config);
            for problem in &problems {
                println!("{}", problem);
            }
            if !problems.is_empty() {
                return Err(anyhow!("{} menu problem(s) found", problems.len()));
            }
            println!("{} menus OK", store.menu_names().len());
        }
        Commands::Adduser { name, level } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let name = validate_sysop_name(&name)?;
            let users = UserStore::open(&config.storage.data_dir, config.security.argon2.as_ref()).await?;
            if users.exists(&name) {
                println!("Error: user '{}' already exists.", name);
                return Ok(());
            }
            // Prompt twice without echo
            let pass1 = rpassword::prompt_password("Password: ")?;
            if let Err(e) = validate_password(&pass1, config.security.min_password_length) {
                println!("Error: {}.", e);
                return Ok(());
            }
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            let user = users.register(&name, &pass1, level)?;
            println!(
                "Created {} '{}' (level {}).",
                role_name(user.user_level),
                user.username,
                user.user_level
            );
        }
    }

    Ok(())
}

/// Every problem found across the store, one line each.
fn check_menus(store: &dyn MenuStore, config: &Config) -> Vec<String> {
    let table = CommandDispatchTable::new();
    let mut problems = Vec::new();
    for required in [
        &config.menus.matrix_menu,
        &config.menus.main_menu,
        &config.menus.fallback_menu,
    ] {
        if !store.contains(required) {
            problems.push(format!("configured menu '{}' does not exist", required));
        }
    }
    for name in store.menu_names() {
        let menu = match store.load_menu(&name) {
            Ok(menu) => menu,
            Err(e) => {
                problems.push(format!("{}: {}", name, e));
                continue;
            }
        };
        for option in menu.options.iter().chain(menu.pulldowns.iter()) {
            let label = format!("{}: option '{}' ({})", name, option.menu_key, option.command_key);
            match option.command_chars() {
                None => problems.push(format!("{} command key must be two characters", label)),
                Some((prefix, _)) if table.category(prefix).is_none() => {
                    problems.push(format!("{} unknown command category '{}'", label, prefix))
                }
                Some(_) => {}
            }
            if let Some(MenuAction::Goto(target) | MenuAction::Gosub(target)) = table.dispatch(option) {
                if !store.contains(&target) {
                    problems.push(format!("{} targets missing menu '{}'", label, target));
                }
            }
        }
    }
    problems
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match file {
        Some(f) => {
            let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

            // Only echo to the console when someone is watching it
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
