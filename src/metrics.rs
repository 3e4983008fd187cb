//! Process-wide counters for sessions, modules and command dispatch.
//!
//! Sessions share nothing mutable except these atomics, which are only ever
//! incremented and read for logging.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

static SESSIONS_STARTED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_ENDED: AtomicU64 = AtomicU64::new(0);
static DISPATCH_HANDLED: AtomicU64 = AtomicU64::new(0);
static DISPATCH_UNHANDLED: AtomicU64 = AtomicU64::new(0);
static MODULE_STACK_INCONSISTENCIES: AtomicU64 = AtomicU64::new(0);

static MODULE_COUNTERS: OnceLock<Mutex<HashMap<String, ModuleCounter>>> = OnceLock::new();

pub fn inc_session_started() {
    SESSIONS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_session_ended() {
    SESSIONS_ENDED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_dispatch(handled: bool) {
    if handled {
        DISPATCH_HANDLED.fetch_add(1, Ordering::Relaxed);
    } else {
        DISPATCH_UNHANDLED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn inc_module_stack_inconsistency() {
    MODULE_STACK_INCONSISTENCIES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCounter {
    pub entries: u64,
    pub exits: u64,
    pub currently_active: u64,
    pub concurrent_peak: u64,
}

fn module_counter_lock() -> MutexGuard<'static, HashMap<String, ModuleCounter>> {
    MODULE_COUNTERS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn record_module_entry(kind: &str) -> ModuleCounter {
    let mut guard = module_counter_lock();
    let counter = guard.entry(kind.to_string()).or_default();
    counter.entries = counter.entries.saturating_add(1);
    counter.currently_active = counter.currently_active.saturating_add(1);
    if counter.currently_active > counter.concurrent_peak {
        counter.concurrent_peak = counter.currently_active;
    }
    *counter
}

pub fn record_module_exit(kind: &str) -> ModuleCounter {
    let mut guard = module_counter_lock();
    let counter = guard.entry(kind.to_string()).or_default();
    counter.exits = counter.exits.saturating_add(1);
    counter.currently_active = counter.currently_active.saturating_sub(1);
    *counter
}

pub fn module_counters_snapshot() -> HashMap<String, ModuleCounter> {
    module_counter_lock().clone()
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub sessions_started: u64,
    pub sessions_ended: u64,
    pub dispatch_handled: u64,
    pub dispatch_unhandled: u64,
    pub module_stack_inconsistencies: u64,
}

impl Snapshot {
    pub fn sessions_active(&self) -> u64 {
        self.sessions_started.saturating_sub(self.sessions_ended)
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sessions_started: SESSIONS_STARTED.load(Ordering::Relaxed),
        sessions_ended: SESSIONS_ENDED.load(Ordering::Relaxed),
        dispatch_handled: DISPATCH_HANDLED.load(Ordering::Relaxed),
        dispatch_unhandled: DISPATCH_UNHANDLED.load(Ordering::Relaxed),
        module_stack_inconsistencies: MODULE_STACK_INCONSISTENCIES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_entry_exit_updates_counters() {
        // Unique key so parallel tests touching other kinds don't interfere.
        let kind = "unit-test-module";
        let entry = record_module_entry(kind);
        assert_eq!(entry.entries, 1);
        assert_eq!(entry.currently_active, 1);
        assert_eq!(entry.concurrent_peak, 1);

        let second = record_module_entry(kind);
        assert_eq!(second.concurrent_peak, 2);

        record_module_exit(kind);
        let exit = record_module_exit(kind);
        assert_eq!(exit.exits, 2);
        assert_eq!(exit.currently_active, 0);
        assert_eq!(module_counters_snapshot().get(kind).map(|c| c.concurrent_peak), Some(2));
    }

    #[test]
    fn snapshot_counts_dispatch_outcomes() {
        let before = snapshot();
        inc_dispatch(true);
        inc_dispatch(false);
        inc_dispatch(false);
        let after = snapshot();
        assert!(after.dispatch_handled >= before.dispatch_handled + 1);
        assert!(after.dispatch_unhandled >= before.dispatch_unhandled + 2);
    }
}
