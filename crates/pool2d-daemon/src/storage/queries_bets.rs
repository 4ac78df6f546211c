//! Bet and slot lock queries.

use pool2d_core::wager::money_text;
use sqlx::SqliteConnection;

use super::db::{Database, DatabaseError};
use super::models::{Bet, BetStatus, NewBet};

impl Database {
    // =========================================================================
    // Bet queries
    // =========================================================================

    /// Insert an active bet unless the slot is already in the lock ledger.
    ///
    /// The check and the insert are one statement, so a bet either lands before
    /// the lock transaction (and gets locked by it) or is refused. Returns
    /// `None` when refused.
    pub async fn insert_bet(&self, bet: &NewBet<'_>) -> Result<Option<i64>, DatabaseError> {
        let result = sqlx::query(
            r"
            INSERT INTO bets (
                order_code, agent_id, market, code, number,
                amount_n1, amount_n, amount_b, amount_s, amount_ds, amount_ss,
                status, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?
            WHERE NOT EXISTS (SELECT 1 FROM slot_locks WHERE code = ?)
            ",
        )
        .bind(bet.order_code)
        .bind(bet.agent_id)
        .bind(bet.market)
        .bind(bet.code)
        .bind(bet.number)
        .bind(money_text(bet.stakes.n1))
        .bind(money_text(bet.stakes.n))
        .bind(money_text(bet.stakes.big))
        .bind(money_text(bet.stakes.small))
        .bind(money_text(bet.stakes.odd))
        .bind(money_text(bet.stakes.even))
        .bind(bet.created_at)
        .bind(bet.code)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    /// Get a bet by ID.
    pub async fn get_bet(&self, id: i64) -> Result<Bet, DatabaseError> {
        sqlx::query_as::<_, Bet>("SELECT * FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Bet {id}")))
    }

    /// List bets of a slot, optionally filtered by status.
    pub async fn list_bets(
        &self,
        code: &str,
        status: Option<BetStatus>,
    ) -> Result<Vec<Bet>, DatabaseError> {
        let bets = if let Some(status) = status {
            sqlx::query_as::<_, Bet>(
                "SELECT * FROM bets WHERE code = ? AND status = ? ORDER BY id ASC",
            )
            .bind(code)
            .bind(status.as_str())
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, Bet>("SELECT * FROM bets WHERE code = ? ORDER BY id ASC")
                .bind(code)
                .fetch_all(self.pool())
                .await?
        };

        Ok(bets)
    }

    /// List every bet of an order group.
    pub async fn list_order(&self, order_code: &str) -> Result<Vec<Bet>, DatabaseError> {
        let bets =
            sqlx::query_as::<_, Bet>("SELECT * FROM bets WHERE order_code = ? ORDER BY id ASC")
                .bind(order_code)
                .fetch_all(self.pool())
                .await?;

        Ok(bets)
    }

    /// Locked bets of one (slot, market), read inside a settlement transaction.
    pub(crate) async fn locked_bets_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
    ) -> Result<Vec<Bet>, DatabaseError> {
        let bets = sqlx::query_as::<_, Bet>(
            "SELECT * FROM bets WHERE code = ? AND market = ? AND status = 'locked' ORDER BY id ASC",
        )
        .bind(code)
        .bind(market)
        .fetch_all(&mut *conn)
        .await?;

        Ok(bets)
    }

    /// Soft-delete the active bets of an order owned by `agent_id`.
    ///
    /// Nothing is deleted when any bet of the order is already locked or any of
    /// its slots is in the lock ledger. Returns the number of rows flipped.
    pub async fn delete_order(&self, order_code: &str, agent_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE bets SET status = 'deleted'
            WHERE order_code = ? AND agent_id = ? AND status = 'active'
              AND NOT EXISTS (
                  SELECT 1 FROM bets AS other
                  WHERE other.order_code = ? AND other.status = 'locked'
              )
              AND NOT EXISTS (
                  SELECT 1 FROM slot_locks
                  WHERE slot_locks.code IN (SELECT code FROM bets AS b WHERE b.order_code = ?)
              )
            ",
        )
        .bind(order_code)
        .bind(agent_id)
        .bind(order_code)
        .bind(order_code)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Slot lock queries
    // =========================================================================

    /// Record the slot in the lock ledger and flip its active bets to locked.
    ///
    /// Safe to repeat: the ledger insert is ignored on conflict and only
    /// `active` rows are matched. Returns the number of bets locked by this
    /// call.
    pub async fn lock_slot(&self, code: &str, locked_at: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT INTO slot_locks (code, locked_at) VALUES (?, ?) ON CONFLICT(code) DO NOTHING")
            .bind(code)
            .bind(locked_at)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE bets SET status = 'locked', locked_at = ? WHERE code = ? AND status = 'active'",
        )
        .bind(locked_at)
        .bind(code)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Distinct slot codes that still hold active bets, oldest first.
    pub async fn active_slot_codes(&self) -> Result<Vec<String>, DatabaseError> {
        let codes: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT code FROM bets WHERE status = 'active' ORDER BY code ASC")
                .fetch_all(self.pool())
                .await?;
        Ok(codes.into_iter().map(|(code,)| code).collect())
    }

    /// Whether the lock transition has run for the slot.
    pub async fn is_slot_lock_recorded(&self, code: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM slot_locks WHERE code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0 > 0)
    }
}
