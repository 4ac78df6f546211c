//! Bet store: validated bet creation, listing, locking and deletion.
//!
//! Validation uses the slot clock; the final "is the slot still open" decision
//! is taken by the store inside the insert statement.

use chrono::{DateTime, TimeZone};
use pool2d_core::config::MarketConfig;
use pool2d_core::slot::{SlotClock, SlotCode};
use pool2d_core::wager::{Stakes, normalize_number};
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::storage::{Bet, BetStatus, Database, DatabaseError, NewBet};

/// One bet row to create.
#[derive(Debug, Clone)]
pub struct BetRequest<'a> {
    pub order_code: &'a str,
    pub agent_id: i64,
    pub market: &'a str,
    pub code: SlotCode,
    pub number: &'a str,
    pub stakes: Stakes,
}

#[derive(Clone)]
pub struct BetStore {
    db: Database,
    clock: SlotClock,
    markets: MarketConfig,
}

impl BetStore {
    pub const fn new(db: Database, clock: SlotClock, markets: MarketConfig) -> Self {
        Self { db, clock, markets }
    }

    pub const fn clock(&self) -> &SlotClock {
        &self.clock
    }

    /// Create one active bet.
    ///
    /// Rejects with `InvalidInput` for a malformed number, unknown market,
    /// invalid or all-zero stakes, a slot outside the valid hours, or a slot
    /// already past its lock time at `now`. Rejects with `RaceLossOnLock` when
    /// the lock transition committed before the insert.
    pub async fn create_bet<T: TimeZone>(
        &self,
        request: &BetRequest<'_>,
        now: &DateTime<T>,
    ) -> Result<i64, PoolError> {
        let number = normalize_number(request.number)?;
        let market = self
            .markets
            .resolve(request.market)
            .ok_or_else(|| PoolError::InvalidInput(format!("unknown market '{}'", request.market)))?;
        request.stakes.validate()?;

        let code = request.code;
        if !self.clock.is_valid_hour(code.hour()) {
            return Err(PoolError::InvalidInput(format!(
                "slot {code} is outside the valid hours"
            )));
        }
        if self.clock.is_locked(&code, now) {
            return Err(PoolError::InvalidInput(format!("slot {code} is locked")));
        }

        let code_text = code.to_string();
        let inserted = self
            .db
            .insert_bet(&NewBet {
                order_code: request.order_code,
                agent_id: request.agent_id,
                market,
                code: &code_text,
                number: &number,
                stakes: &request.stakes,
                created_at: now.timestamp(),
            })
            .await?;

        match inserted {
            Some(id) => {
                debug!(bet_id = id, code = %code, market, number = %number, "Bet created");
                Ok(id)
            }
            None => Err(PoolError::RaceLossOnLock { code: code_text }),
        }
    }

    /// List the bets of a slot, optionally filtered by status.
    pub async fn list_bets(
        &self,
        code: &SlotCode,
        status: Option<BetStatus>,
    ) -> Result<Vec<Bet>, PoolError> {
        Ok(self.db.list_bets(&code.to_string(), status).await?)
    }

    pub async fn get_bet(&self, id: i64) -> Result<Bet, PoolError> {
        match self.db.get_bet(id).await {
            Ok(bet) => Ok(bet),
            Err(DatabaseError::NotFound(what)) => Err(PoolError::NotFound(what)),
            Err(e) => Err(e.into()),
        }
    }

    /// List every bet of an order group.
    pub async fn list_order(&self, order_code: &str) -> Result<Vec<Bet>, PoolError> {
        Ok(self.db.list_order(order_code).await?)
    }

    /// Lock the slot: flip its active bets to locked, stamping `now`.
    ///
    /// Refused before the slot's lock time. Repeated calls lock nothing new.
    pub async fn mark_locked<T: TimeZone>(
        &self,
        code: &SlotCode,
        now: &DateTime<T>,
    ) -> Result<u64, PoolError> {
        if !self.clock.is_locked(code, now) {
            return Err(PoolError::InvalidInput(format!(
                "slot {code} is not due to lock yet"
            )));
        }
        let rows = self.db.lock_slot(&code.to_string(), now.timestamp()).await?;
        info!(code = %code, rows, "Slot locked");
        Ok(rows)
    }

    /// Lock every slot that still holds active bets and is past its lock time
    /// at `now`, except `skip`. Returns the slots locked with their bet counts.
    pub async fn lock_overdue<T: TimeZone>(
        &self,
        now: &DateTime<T>,
        skip: Option<SlotCode>,
    ) -> Result<Vec<(SlotCode, u64)>, PoolError> {
        let mut locked = Vec::new();
        for raw in self.db.active_slot_codes().await? {
            let code = match SlotCode::parse(&raw) {
                Ok(code) => code,
                Err(e) => {
                    warn!(code = %raw, error = %e, "Unreadable slot code on active bets");
                    continue;
                }
            };
            if Some(code) != skip && self.clock.is_locked(&code, now) {
                let rows = self.mark_locked(&code, now).await?;
                locked.push((code, rows));
            }
        }
        Ok(locked)
    }

    /// Soft-delete an order on behalf of its owning agent.
    ///
    /// Refused with `OrderLocked` when any bet of the order is locked or any of
    /// its slots is past lock time at `now`.
    pub async fn mark_deleted<T: TimeZone>(
        &self,
        order_code: &str,
        requester: i64,
        now: &DateTime<T>,
    ) -> Result<u64, PoolError> {
        let order = self.db.list_order(order_code).await?;
        let owned: Vec<&Bet> = order.iter().filter(|b| b.agent_id == requester).collect();
        if owned.is_empty() {
            return Err(PoolError::NotFound(format!("order {order_code}")));
        }

        let past_lock = order
            .iter()
            .filter(|bet| bet.bet_status() != Some(BetStatus::Deleted))
            .any(|bet| {
                bet.bet_status() == Some(BetStatus::Locked)
                    || SlotCode::parse(&bet.code)
                        .map_or(true, |code| self.clock.is_locked(&code, now))
            });
        if past_lock {
            return Err(PoolError::OrderLocked(order_code.to_string()));
        }

        let active = owned
            .iter()
            .filter(|b| b.bet_status() == Some(BetStatus::Active))
            .count();
        let rows = self.db.delete_order(order_code, requester).await?;
        if rows == 0 && active > 0 {
            // The scheduler locked one of the slots after our read.
            return Err(PoolError::OrderLocked(order_code.to_string()));
        }

        info!(order_code, requester, rows, "Order deleted");
        Ok(rows)
    }
}
