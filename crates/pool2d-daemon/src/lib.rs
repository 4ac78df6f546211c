//! 2D Pool Daemon Library
//!
//! Core functionality for the pool daemon:
//! - SQLite storage for bets, draw results and winning records
//! - Batch bet submission with per-row results
//! - Idempotent settlement engine
//! - Scheduler that locks and settles hourly slots

pub mod bets;
pub mod draws;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod settlement;
pub mod storage;
pub mod submission;
