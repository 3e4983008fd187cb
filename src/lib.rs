//! # termbbs - Telnet Bulletin Board Menu Engine
//!
//! termbbs is a multi-user telnet bulletin board system built around a
//! data-driven menu engine. Menus, their options and lightbar pulldowns are JSON
//! records; a two-character command key on each option selects what happens when
//! the caller picks it.
//!
//! ## Features
//!
//! - **Menu Engine**: Hotkey or line input, stacked commands, `FIRSTCMD` auto-run, goto/gosub/return navigation.
//! - **Lightbars**: `%PDnn` positioned pulldown menus driven by the arrow keys.
//! - **Modules**: Pre-logon banner, logon and new user signup flows that temporarily own a caller's input.
//! - **User Management**: Level-based access control strings (User, Moderator, Sysop).
//! - **Security**: Argon2id password hashing, validated file names, atomic locked writes.
//! - **Async Design**: One tokio task per telnet connection; the engine itself never blocks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use termbbs::config::Config;
//! use termbbs::bbs::BbsServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load("config.toml").await?);
//!     let server = BbsServer::new(config, None).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bbs`] - Menu engine, session state machine, modules and the telnet server
//! - [`storage`] - User accounts and atomic file writes
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Name, password and record validation
//! - [`errors`] - Library error type
//! - [`metrics`] - Process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   BbsServer     │ ← Telnet listener, one task per caller
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   MenuSystem    │ ← Input modes, modules, command dispatch
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Stores        │ ← Menus and users
//! └─────────────────┘
//! ```

pub mod bbs;
pub mod config;
pub mod errors;
pub mod logutil;
pub mod metrics;
pub mod storage;
pub mod validation;
