//! Settlement engine.
//!
//! Matches locked bets of a slot against its draw results and writes one
//! winning record per (bet, hit type). Each market settles in its own
//! transaction that opens with a write to the run ledger, so concurrent
//! settlers of the same market serialize on the SQLite write lock and the
//! second one sees the first one's records. The unique key on
//! `winning_records` backs this up.

use chrono::{DateTime, TimeZone};
use pool2d_core::slot::{SlotClock, SlotCode};
use pool2d_core::wager::{Odds, evaluate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::storage::{Database, NewWinning};

/// Result of settling one (slot, market).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarketOutcome {
    Settled {
        /// Locked bets examined.
        bets: usize,
        /// Winning records written by this run.
        inserted: u64,
        /// Hits skipped because their record already existed.
        already_present: u64,
        /// Records removed first (re-settle only).
        purged: u64,
    },
    /// No draw result is recorded yet.
    NoDraw,
    /// The stored draw failed validation; the market was skipped.
    MalformedDraw { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketSettlement {
    pub market: String,
    pub outcome: MarketOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub code: SlotCode,
    /// Winning records inserted across all markets.
    pub inserted: u64,
    pub markets: Vec<MarketSettlement>,
}

impl SettlementReport {
    /// No market of the slot has a draw result yet.
    pub fn is_deferred(&self) -> bool {
        self.markets.is_empty()
            || self
                .markets
                .iter()
                .all(|m| m.outcome == MarketOutcome::NoDraw)
    }

    /// Markets that were settled by this run.
    pub fn settled_markets(&self) -> impl Iterator<Item = &str> {
        self.markets
            .iter()
            .filter(|m| matches!(m.outcome, MarketOutcome::Settled { .. }))
            .map(|m| m.market.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Incremental,
    Replace,
}

#[derive(Clone)]
pub struct SettlementEngine {
    db: Database,
    clock: SlotClock,
    odds: Odds,
    max_specials: usize,
}

impl SettlementEngine {
    pub const fn new(db: Database, clock: SlotClock, odds: Odds, max_specials: usize) -> Self {
        Self {
            db,
            clock,
            odds,
            max_specials,
        }
    }

    /// Settle every market of `code` that has a draw result.
    ///
    /// Safe to call any number of times, from any number of tasks or
    /// processes: each winning record is written at most once.
    pub async fn settle_slot(&self, code: &SlotCode) -> Result<SettlementReport, PoolError> {
        self.run_slot(code, Mode::Incremental).await
    }

    /// Settle one market of `code`.
    pub async fn settle_market(
        &self,
        code: &SlotCode,
        market: &str,
    ) -> Result<SettlementReport, PoolError> {
        let outcome = self.run_market(code, market, Mode::Incremental).await?;
        Ok(Self::report(code, vec![MarketSettlement {
            market: market.to_string(),
            outcome,
        }]))
    }

    /// Settle the most recent slot whose lock time has passed at `now`.
    pub async fn settle_due<T: TimeZone>(
        &self,
        now: &DateTime<T>,
    ) -> Result<SettlementReport, PoolError> {
        let code = self.clock.due_slot(now);
        info!(code = %code, "Settling due slot");
        self.settle_slot(&code).await
    }

    /// Recompute the records of `code` from scratch, market by market.
    ///
    /// Each market's records are deleted and rebuilt in one transaction, so a
    /// corrected draw result replaces the old payouts. Markets without a draw
    /// keep their records.
    pub async fn resettle_slot(&self, code: &SlotCode) -> Result<SettlementReport, PoolError> {
        warn!(code = %code, "Re-settling slot");
        self.run_slot(code, Mode::Replace).await
    }

    async fn run_slot(&self, code: &SlotCode, mode: Mode) -> Result<SettlementReport, PoolError> {
        let draws = self.db.list_draws(&code.to_string()).await?;
        if draws.is_empty() {
            debug!(code = %code, "No draw results yet, settlement deferred");
            return Ok(Self::report(code, Vec::new()));
        }

        let mut markets = Vec::with_capacity(draws.len());
        for draw in &draws {
            let outcome = self.run_market(code, &draw.market, mode).await?;
            markets.push(MarketSettlement {
                market: draw.market.clone(),
                outcome,
            });
        }

        let report = Self::report(code, markets);
        info!(
            code = %code,
            inserted = report.inserted,
            markets = report.markets.len(),
            "Slot settled"
        );
        Ok(report)
    }

    async fn run_market(
        &self,
        code: &SlotCode,
        market: &str,
        mode: Mode,
    ) -> Result<MarketOutcome, PoolError> {
        let code_text = code.to_string();
        let mut tx = self.db.pool().begin().await?;

        Database::begin_settlement_run_in(&mut *tx, &code_text, market).await?;

        let Some(draw) = Database::draw_in(&mut *tx, &code_text, market).await? else {
            // Drop the ledger bump along with the transaction.
            tx.rollback().await?;
            debug!(code = %code, market, "No draw result, market deferred");
            return Ok(MarketOutcome::NoDraw);
        };
        let outcome = match draw.outcome(self.max_specials) {
            Ok(outcome) => outcome,
            Err(e) => {
                tx.rollback().await?;
                warn!(code = %code, market, error = %e, "Malformed draw result, market skipped");
                return Ok(MarketOutcome::MalformedDraw {
                    reason: e.to_string(),
                });
            }
        };

        let purged = match mode {
            Mode::Replace => Database::delete_winnings_in(&mut *tx, &code_text, market).await?,
            Mode::Incremental => 0,
        };

        let existing = Database::hit_keys_in(&mut *tx, &code_text, market).await?;
        let bets = Database::locked_bets_in(&mut *tx, &code_text, market).await?;

        let mut inserted = 0u64;
        let mut already_present = 0u64;
        for bet in &bets {
            let stakes = match bet.stakes() {
                Ok(stakes) => stakes,
                Err(e) => {
                    warn!(bet_id = bet.id, error = %e, "Unreadable stakes, bet skipped");
                    continue;
                }
            };

            let hits = match evaluate(&bet.number, &stakes, &outcome, &self.odds) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(bet_id = bet.id, error = %e, "Payout out of range, bet skipped");
                    continue;
                }
            };
            for hit in hits {
                let tag = hit.hit_type.as_str();
                if existing.contains(&(bet.id, tag.to_string())) {
                    already_present += 1;
                    continue;
                }
                let record = NewWinning {
                    bet_id: bet.id,
                    agent_id: bet.agent_id,
                    market,
                    code: &code_text,
                    number: &bet.number,
                    hit_type: tag,
                    stake: hit.stake,
                    odds: hit.odds,
                    payout: hit.payout,
                };
                if Database::insert_winning_in(&mut *tx, &record).await? {
                    inserted += 1;
                } else {
                    already_present += 1;
                }
            }
        }

        Database::finish_settlement_run_in(&mut *tx, &code_text, market, inserted).await?;
        tx.commit().await?;

        debug!(
            code = %code,
            market,
            bets = bets.len(),
            inserted,
            already_present,
            purged,
            "Market settled"
        );
        Ok(MarketOutcome::Settled {
            bets: bets.len(),
            inserted,
            already_present,
            purged,
        })
    }

    fn report(code: &SlotCode, markets: Vec<MarketSettlement>) -> SettlementReport {
        let inserted = markets
            .iter()
            .map(|m| match m.outcome {
                MarketOutcome::Settled { inserted, .. } => inserted,
                _ => 0,
            })
            .sum();
        SettlementReport {
            code: *code,
            inserted,
            markets,
        }
    }
}
