//! 2D Pool Core Library
//!
//! Shared functionality for the pool daemon and its tooling:
//! - Slot clock (slot codes, lock times, valid-hour clamping)
//! - Wager rules (numbers, stakes, hit types, odds, payouts)
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and common error types

pub mod config;
pub mod db;
pub mod error;
pub mod slot;
pub mod tracing_init;
pub mod wager;

pub use config::Config;
pub use error::{Error, Result};
pub use slot::{SlotClock, SlotCode, SlotInfo};
pub use wager::{DrawOutcome, HitType, Odds, Stakes};
