//! # BBS Core Module
//!
//! The menu engine and everything a connected caller passes through.
//!
//! ## Components
//!
//! - [`server`] - Telnet listener and per-connection tasks
//! - [`menu_system`] - Input mode state machine; the single entry point for input
//! - [`menu_base`] - Loaded menu, navigation context, lightbar and input policy
//! - [`commands`] - Command key dispatch table
//! - [`modules`] - Pre-logon, logon and signup modules and the module stack
//! - [`menu`] / [`menu_store`] - Menu records and where they come from
//! - [`render`] - Screen rendering and lightbar layout
//! - [`session`] - Caller identity and output queue
//! - [`roles`] - Levels and access control strings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  BbsServer      │ ← bytes in, text out
//! └─────────────────┘
//!          │ update(chunk)
//! ┌─────────────────┐
//! │  MenuSystem     │ ← InputMode -> handler
//! └─────────────────┘
//!      │         │
//! ┌─────────┐ ┌─────────────┐
//! │ Modules │ │ MenuEngine  │ ← options resolved, then dispatched
//! └─────────┘ └─────────────┘
//! ```
//!
//! ## Session Lifecycle
//!
//! 1. Caller connects; the pre-logon module shows the banner
//! 2. Any key: the matrix menu (not yet logged on)
//! 3. Logon module verifies credentials; the main menu follows
//! 4. Session ends with a logoff command, idle timeout or disconnect

pub mod commands;
pub mod line_input;
pub mod menu;
pub mod menu_base;
pub mod menu_store;
pub mod menu_system;
pub mod modules;
pub mod render;
pub mod roles;
pub mod server;
pub mod session;
pub mod telnet;

pub use menu_system::MenuSystem;
pub use server::BbsServer;
