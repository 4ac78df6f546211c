//! `SQLite` storage for the pool daemon.
//!
//! Provides persistence for bets, slot locks, draw results, winning records
//! and the settlement run ledger.

mod db;
mod models;
mod queries_bets;
mod queries_draws;
mod queries_winnings;

pub use db::{Database, DatabaseError};
pub use models::*;
