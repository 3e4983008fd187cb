//! # Storage Module - User Accounts and File Helpers
//!
//! User records live as one JSON file per account:
//!
//! ```text
//! data/
//! ├── menus/          ← Menu definitions (see bbs::menu_store)
//! └── users/          ← User account data
//! ```
//!
//! The whole user directory is read when the store opens and lookups are served
//! from memory afterwards, so the logon and signup modules never wait on disk
//! reads inside a session `update`. Writes go through [`write_json_atomic`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use termbbs::storage::UserStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let users = UserStore::open("./data", None).await?;
//!     users.register("alice", "correct horse", 1)?;
//!     assert!(users.verify("alice", "correct horse")?.is_some());
//!     Ok(())
//! }
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, warn};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

use crate::config::Argon2Config;
use crate::errors::BbsError;
use crate::validation::{secure_json_parse, user_path, MAX_RECORD_BYTES};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub user_level: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// User account database.
pub struct UserStore {
    data_dir: PathBuf,
    argon2: Argon2<'static>,
    users: RwLock<HashMap<String, User>>, // lowercase username -> record
}

fn build_argon2(cfg: Option<&Argon2Config>) -> Argon2<'static> {
    let Some(cfg) = cfg else {
        return Argon2::default();
    };
    let defaults = Params::default();
    match Params::new(
        cfg.memory_kib.unwrap_or(defaults.m_cost()),
        cfg.time_cost.unwrap_or(defaults.t_cost()),
        cfg.parallelism.unwrap_or(defaults.p_cost()),
        None,
    ) {
        Ok(params) => Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        Err(e) => {
            warn!("Invalid argon2 parameters ({}); using defaults", e);
            Argon2::default()
        }
    }
}

impl UserStore {
    /// Open (creating if needed) `<data_dir>/users` and load every record.
    pub async fn open(data_dir: &str, argon2: Option<&Argon2Config>) -> Result<Self, BbsError> {
        let data_dir = PathBuf::from(data_dir);
        let users_dir = data_dir.join("users");
        fs::create_dir_all(&users_dir).await?;

        let mut users = HashMap::new();
        let mut entries = fs::read_dir(&users_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match secure_json_parse::<User>(&content, MAX_RECORD_BYTES) {
                Ok(user) => {
                    users.insert(user.username.to_lowercase(), user);
                }
                Err(e) => warn!("Skipping unreadable user record {}: {}", path.display(), e),
            }
        }
        debug!("Loaded {} user records from {}", users.len(), users_dir.display());

        Ok(UserStore {
            data_dir,
            argon2: build_argon2(argon2),
            users: RwLock::new(users),
        })
    }

    fn read_users(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, User>>, BbsError> {
        self.users
            .read()
            .map_err(|_| BbsError::Internal("user table lock poisoned".into()))
    }

    fn write_users(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, User>>, BbsError> {
        self.users
            .write()
            .map_err(|_| BbsError::Internal("user table lock poisoned".into()))
    }

    pub fn exists(&self, username: &str) -> bool {
        self.read_users()
            .map(|u| u.contains_key(&username.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn get(&self, username: &str) -> Option<User> {
        self.read_users()
            .ok()
            .and_then(|u| u.get(&username.to_lowercase()).cloned())
    }

    pub fn user_count(&self) -> usize {
        self.read_users().map(|u| u.len()).unwrap_or(0)
    }

    /// Create an account. The caller validates the name and password policy.
    ///
    /// The name is claimed under the table lock before the record is written,
    /// so of two concurrent registrations for one name exactly one succeeds.
    /// Hashes and writes a file: call from a blocking context.
    pub fn register(&self, username: &str, password: &str, user_level: u8) -> Result<User, BbsError> {
        let key = username.to_lowercase();
        if self.exists(&key) {
            return Err(BbsError::AlreadyExists(username.to_string()));
        }
        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string();
        let user = User {
            username: username.to_string(),
            password_hash,
            user_level,
            created_at: Utc::now(),
            last_login: None,
        };
        {
            let mut users = self.write_users()?;
            if users.contains_key(&key) {
                return Err(BbsError::AlreadyExists(username.to_string()));
            }
            users.insert(key.clone(), user.clone());
        }
        if let Err(e) = self.persist(&user) {
            if let Ok(mut users) = self.write_users() {
                users.remove(&key);
            }
            return Err(e);
        }
        Ok(user)
    }

    /// Check a password. `Ok(None)` for unknown users and wrong passwords alike.
    pub fn verify(&self, username: &str, password: &str) -> Result<Option<User>, BbsError> {
        let Some(user) = self.get(username) else {
            return Ok(None);
        };
        let parsed = PasswordHash::new(&user.password_hash)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(Some(user)),
            Err(password_hash::Error::Password) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stamp `last_login` and persist the record.
    pub fn record_login(&self, username: &str) -> Result<(), BbsError> {
        let key = username.to_lowercase();
        let mut users = self.write_users()?;
        let user = users
            .get_mut(&key)
            .ok_or_else(|| BbsError::NotFound(username.to_string()))?;
        user.last_login = Some(Utc::now());
        let snapshot = user.clone();
        drop(users);
        self.persist(&snapshot)
    }

    pub fn set_level(&self, username: &str, user_level: u8) -> Result<(), BbsError> {
        let key = username.to_lowercase();
        let mut users = self.write_users()?;
        let user = users
            .get_mut(&key)
            .ok_or_else(|| BbsError::NotFound(username.to_string()))?;
        user.user_level = user_level;
        let snapshot = user.clone();
        drop(users);
        self.persist(&snapshot)
    }

    fn persist(&self, user: &User) -> Result<(), BbsError> {
        let content = serde_json::to_string_pretty(user)?;
        write_json_atomic(&user_path(&self.data_dir, &user.username), &content)?;
        Ok(())
    }
}

/// Write `content` to `path` via a temp file and rename, holding an exclusive
/// lock on a `.lock` sidecar so concurrent writers serialize.
pub fn write_json_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record.json");

    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(dir.join(format!(".{}.lock", base)))?;
    lock_file.lock_exclusive()?;

    let mut counter = 0u32;
    let tmp_path = loop {
        let cand = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&cand) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                let _ = tmp.sync_all();
                break cand;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    };
    std::fs::rename(&tmp_path, path)?;
    if let Ok(dirf) = File::open(dir) {
        let _ = dirf.sync_all();
    }
    let _ = lock_file.unlock();
    Ok(())
}
