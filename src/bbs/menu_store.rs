//! Menu definition stores.
//!
//! The engine only sees the [`MenuStore`] trait. [`JsonMenuStore`] reads every
//! `<data_dir>/menus/*.json` file once at startup and then answers loads from
//! memory, so a menu switch inside a session `update` never touches the disk.
//! Saves and deletes (menu editor, `termbbs init`) update memory at once and
//! queue the file change for a writer task, which applies changes in order on
//! the blocking pool. [`JsonMenuStore::flush`] waits for the queue to drain.

use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};

use super::menu::MenuDefinition;
use crate::errors::BbsError;
use crate::storage::write_json_atomic;
use crate::validation::{menu_path, secure_json_parse, validate_menu_name, MAX_RECORD_BYTES};

/// Source of menu definitions.
pub trait MenuStore: Send + Sync {
    /// Fetch a menu by name. Missing menus yield [`BbsError::NotFound`].
    fn load_menu(&self, name: &str) -> Result<MenuDefinition, BbsError>;

    /// Create or replace a menu.
    fn save_menu(&self, name: &str, menu: &MenuDefinition) -> Result<(), BbsError>;

    /// Remove a menu. Missing menus yield [`BbsError::NotFound`].
    fn delete_menu(&self, name: &str) -> Result<(), BbsError>;

    /// All menu names, sorted.
    fn menu_names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.load_menu(name).is_ok()
    }
}

/// Menus held in memory only.
#[derive(Default)]
pub struct MemoryMenuStore {
    menus: RwLock<BTreeMap<String, MenuDefinition>>,
}

impl MemoryMenuStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by tests and by `JsonMenuStore` while loading.
    pub fn with_menu(self, name: &str, menu: MenuDefinition) -> Self {
        if let Ok(mut menus) = self.menus.write() {
            menus.insert(name.to_ascii_lowercase(), menu);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.menus.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MenuStore for MemoryMenuStore {
    fn load_menu(&self, name: &str) -> Result<MenuDefinition, BbsError> {
        let key = validate_menu_name(name)?;
        let menus = self
            .menus
            .read()
            .map_err(|_| BbsError::Internal("menu table lock poisoned".into()))?;
        menus
            .get(&key)
            .cloned()
            .ok_or_else(|| BbsError::NotFound(format!("menu {}", key)))
    }

    fn save_menu(&self, name: &str, menu: &MenuDefinition) -> Result<(), BbsError> {
        let key = validate_menu_name(name)?;
        self.menus
            .write()
            .map_err(|_| BbsError::Internal("menu table lock poisoned".into()))?
            .insert(key, menu.clone());
        Ok(())
    }

    fn delete_menu(&self, name: &str) -> Result<(), BbsError> {
        let key = validate_menu_name(name)?;
        self.menus
            .write()
            .map_err(|_| BbsError::Internal("menu table lock poisoned".into()))?
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| BbsError::NotFound(format!("menu {}", key)))
    }

    fn menu_names(&self) -> Vec<String> {
        self.menus
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

enum FileOp {
    Write { path: PathBuf, content: String },
    Remove(PathBuf),
}

impl FileOp {
    fn apply(self) -> Result<(), BbsError> {
        match self {
            FileOp::Write { path, content } => {
                write_json_atomic(&path, &content)?;
                debug!("Wrote menu file {}", path.display());
                Ok(())
            }
            FileOp::Remove(path) => match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

enum WriteJob {
    Apply(FileOp),
    /// Answered once every earlier job has run, with the first failure since
    /// the previous flush.
    Flush(oneshot::Sender<Result<(), BbsError>>),
}

/// Applies queued file changes one at a time until every sender is gone.
async fn run_writer(mut jobs: mpsc::UnboundedReceiver<WriteJob>) {
    let mut failure: Option<BbsError> = None;
    while let Some(job) = jobs.recv().await {
        match job {
            WriteJob::Apply(op) => {
                let result = match tokio::task::spawn_blocking(move || op.apply()).await {
                    Ok(result) => result,
                    Err(e) => Err(BbsError::Internal(format!("menu writer task failed: {}", e))),
                };
                if let Err(e) = result {
                    error!("Menu file update failed: {}", e);
                    failure.get_or_insert(e);
                }
            }
            WriteJob::Flush(done) => {
                let _ = done.send(failure.take().map_or(Ok(()), Err));
            }
        }
    }
}

/// File-backed store: one JSON document per menu.
pub struct JsonMenuStore {
    data_dir: PathBuf,
    cache: MemoryMenuStore,
    jobs: mpsc::UnboundedSender<WriteJob>,
}

impl JsonMenuStore {
    /// Open `<data_dir>/menus`, creating it if needed, and load every menu file.
    /// Unreadable files are skipped with a warning. Starts the writer task, so
    /// this must run inside a tokio runtime.
    pub async fn open(data_dir: &str) -> Result<Self, BbsError> {
        let data_dir = PathBuf::from(data_dir);
        let menus_dir = data_dir.join("menus");
        fs::create_dir_all(&menus_dir).await?;

        let mut cache = MemoryMenuStore::new();
        let mut entries = fs::read_dir(&menus_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = match validate_menu_name(stem) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Ignoring menu file {}: {}", path.display(), e);
                    continue;
                }
            };
            let content = fs::read_to_string(&path).await?;
            match secure_json_parse::<MenuDefinition>(&content, MAX_RECORD_BYTES) {
                Ok(menu) => cache = cache.with_menu(&name, menu),
                Err(e) => warn!("Skipping unreadable menu {}: {}", path.display(), e),
            }
        }
        debug!("Loaded {} menus from {}", cache.len(), menus_dir.display());

        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(rx));
        Ok(JsonMenuStore { data_dir, cache, jobs })
    }

    /// Wait until every queued file change has been applied. Reports the first
    /// write that failed since the last flush.
    pub async fn flush(&self) -> Result<(), BbsError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(WriteJob::Flush(tx))
            .map_err(|_| BbsError::Internal("menu writer stopped".into()))?;
        rx.await
            .map_err(|_| BbsError::Internal("menu writer stopped".into()))?
    }

    fn queue(&self, op: FileOp) -> Result<(), BbsError> {
        self.jobs
            .send(WriteJob::Apply(op))
            .map_err(|_| BbsError::Internal("menu writer stopped".into()))
    }
}

impl MenuStore for JsonMenuStore {
    fn load_menu(&self, name: &str) -> Result<MenuDefinition, BbsError> {
        self.cache.load_menu(name)
    }

    fn save_menu(&self, name: &str, menu: &MenuDefinition) -> Result<(), BbsError> {
        let key = validate_menu_name(name)?;
        let content = serde_json::to_string_pretty(menu)?;
        self.cache.save_menu(&key, menu)?;
        self.queue(FileOp::Write {
            path: menu_path(&self.data_dir, &key),
            content,
        })
    }

    fn delete_menu(&self, name: &str) -> Result<(), BbsError> {
        let key = validate_menu_name(name)?;
        self.cache.delete_menu(&key)?;
        self.queue(FileOp::Remove(menu_path(&self.data_dir, &key)))
    }

    fn menu_names(&self) -> Vec<String> {
        self.cache.menu_names()
    }
}
