//! Database models for the pool daemon.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pool2d_core::wager::{DrawOutcome, Stakes, WagerError};

use super::db::DatabaseError;

/// Bet record from the database. Money columns are decimal text.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bet {
    pub id: i64,
    pub order_code: String,
    pub agent_id: i64,
    pub market: String,
    pub code: String,
    pub number: String,
    pub amount_n1: String,
    pub amount_n: String,
    pub amount_b: String,
    pub amount_s: String,
    pub amount_ds: String,
    pub amount_ss: String,
    pub status: String,
    pub created_at: i64,
    pub locked_at: Option<i64>,
}

impl Bet {
    /// Decode the six stake columns.
    pub fn stakes(&self) -> Result<Stakes, DatabaseError> {
        let amount = |raw: &str| {
            Decimal::from_str(raw)
                .map_err(|_| DatabaseError::Corrupt(format!("bet {} stake '{raw}'", self.id)))
        };
        Ok(Stakes {
            n1: amount(&self.amount_n1)?,
            n: amount(&self.amount_n)?,
            big: amount(&self.amount_b)?,
            small: amount(&self.amount_s)?,
            odd: amount(&self.amount_ds)?,
            even: amount(&self.amount_ss)?,
        })
    }

    pub fn bet_status(&self) -> Option<BetStatus> {
        BetStatus::parse(&self.status)
    }
}

/// Draw result record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DrawResult {
    pub id: i64,
    pub code: String,
    pub market: String,
    pub head: String,
    pub specials: String,
    pub size_type: Option<String>,
    pub parity_type: Option<String>,
    pub created_at: i64,
}

impl DrawResult {
    /// Validate the stored row into a draw outcome.
    pub fn outcome(&self, max_specials: usize) -> Result<DrawOutcome, WagerError> {
        DrawOutcome::parse(
            &self.head,
            &self.specials,
            self.size_type.as_deref(),
            self.parity_type.as_deref(),
            max_specials,
        )
    }
}

/// Winning record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WinningRecord {
    pub id: i64,
    pub bet_id: i64,
    pub agent_id: i64,
    pub market: String,
    pub code: String,
    pub number: String,
    pub hit_type: String,
    pub stake: String,
    pub odds: String,
    pub payout: String,
    pub created_at: i64,
}

/// Settlement run ledger record from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettlementRun {
    pub code: String,
    pub market: String,
    pub first_run_at: i64,
    pub last_run_at: i64,
    pub run_count: i64,
    pub last_inserted: i64,
}

/// Bet lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetStatus {
    Active,
    Locked,
    Deleted,
}

impl BetStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "locked" => Some(Self::Locked),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for inserting one bet row.
#[derive(Debug, Clone, Copy)]
pub struct NewBet<'a> {
    pub order_code: &'a str,
    pub agent_id: i64,
    pub market: &'a str,
    pub code: &'a str,
    pub number: &'a str,
    pub stakes: &'a Stakes,
    pub created_at: i64,
}

/// Parameters for inserting one winning record.
#[derive(Debug, Clone, Copy)]
pub struct NewWinning<'a> {
    pub bet_id: i64,
    pub agent_id: i64,
    pub market: &'a str,
    pub code: &'a str,
    pub number: &'a str,
    pub hit_type: &'a str,
    pub stake: Decimal,
    pub odds: Decimal,
    pub payout: Decimal,
}
