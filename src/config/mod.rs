//! # Configuration Management Module
//!
//! Load-once settings shared read-only by every session.
//!
//! ## Configuration Structure
//!
//! - [`BbsConfig`] - Core BBS settings (name, sysop, limits, banners)
//! - [`ServerConfig`] - Telnet listener settings
//! - [`MenuConfig`] - Start, post-login and fallback menu names and input style
//! - [`StorageConfig`] - Data directory holding `menus/` and `users/`
//! - [`SecurityConfig`] - Password and login attempt policy
//! - [`LoggingConfig`] - Logging and debugging settings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use termbbs::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("BBS Name: {}", config.bbs.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bbs]
//! name = "My Telnet BBS"
//! sysop = "sysop"
//! location = "Somewhere"
//! description = "A classic telnet board"
//! max_users = 32
//! session_timeout = 10
//! welcome_message = "Welcome!"
//! goodbye_message = "Goodbye!"
//!
//! [server]
//! bind = "0.0.0.0:2323"
//!
//! [menus]
//! matrix_menu = "matrix"
//! main_menu = "main"
//! fallback_menu = "main"
//! use_hotkeys = true
//! ```
//!
//! A configuration that fails [`Config::validate`] is fatal: sessions refuse to start.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::BbsError;
use crate::validation::validate_menu_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BbsConfig {
    pub name: String,
    pub sysop: String,
    pub location: String,
    pub description: String,
    pub max_users: u32,
    pub session_timeout: u32, // minutes
    pub welcome_message: String,
    #[serde(default = "default_goodbye_message")]
    pub goodbye_message: String,
}

fn default_goodbye_message() -> String {
    "Thanks for calling. Goodbye!".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bbs: BbsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub menus: MenuConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the telnet listener binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:2323".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuConfig {
    /// Menu shown after the logon sequence when the caller is not authorized.
    #[serde(default = "default_matrix_menu")]
    pub matrix_menu: String,
    /// Menu shown once the caller is authorized.
    #[serde(default = "default_main_menu")]
    pub main_menu: String,
    /// Loaded when a requested menu cannot be found. Menus may override it.
    #[serde(default = "default_main_menu")]
    pub fallback_menu: String,
    /// Single keystroke commands (true) or line input terminated by ENTER (false).
    /// Menus may override it.
    #[serde(default = "default_use_hotkeys")]
    pub use_hotkeys: bool,
}

fn default_matrix_menu() -> String {
    "matrix".to_string()
}

fn default_main_menu() -> String {
    "main".to_string()
}

fn default_use_hotkeys() -> bool {
    true
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            matrix_menu: default_matrix_menu(),
            main_menu: default_main_menu(),
            fallback_menu: default_main_menu(),
            use_hotkeys: default_use_hotkeys(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Password attempts allowed per logon module run.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

fn default_min_password_length() -> usize {
    6
}

fn default_max_login_attempts() -> u32 {
    3
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            min_password_length: default_min_password_length(),
            max_login_attempts: default_max_login_attempts(),
            argon2: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, BbsError> {
        Ok(toml::from_str(content)?)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Check the values a session depends on. Sessions refuse to start on failure.
    pub fn validate(&self) -> std::result::Result<(), BbsError> {
        for (field, name) in [
            ("menus.matrix_menu", &self.menus.matrix_menu),
            ("menus.main_menu", &self.menus.main_menu),
            ("menus.fallback_menu", &self.menus.fallback_menu),
        ] {
            validate_menu_name(name).map_err(|e| BbsError::Config(format!("{}: {}", field, e)))?;
        }
        if self.bbs.max_users == 0 {
            return Err(BbsError::Config("bbs.max_users must be at least 1".into()));
        }
        if self.security.max_login_attempts == 0 {
            return Err(BbsError::Config(
                "security.max_login_attempts must be at least 1".into(),
            ));
        }
        if self.security.min_password_length < 4 {
            return Err(BbsError::Config(
                "security.min_password_length must be at least 4".into(),
            ));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(BbsError::Config("storage.data_dir is empty".into()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bbs: BbsConfig {
                name: "termbbs Station".to_string(),
                sysop: "sysop".to_string(),
                location: "Your Location".to_string(),
                description: "A telnet bulletin board system".to_string(),
                max_users: 32,
                session_timeout: 10,
                welcome_message: "".to_string(),
                goodbye_message: default_goodbye_message(),
            },
            server: ServerConfig::default(),
            menus: MenuConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            security: SecurityConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("termbbs.log".to_string()),
                security_file: Some("termbbs-security.log".to_string()),
            },
        }
    }
}
