//! Winning record and settlement run queries.
//!
//! The `*_in` functions run on a caller-owned transaction so the settlement
//! engine can keep the idempotency check and the inserts in one unit.

use std::collections::HashSet;

use pool2d_core::db::unix_timestamp;
use pool2d_core::wager::money_text;
use sqlx::SqliteConnection;

use super::db::{Database, DatabaseError};
use super::models::{NewWinning, SettlementRun, WinningRecord};

impl Database {
    // =========================================================================
    // Winning record queries
    // =========================================================================

    /// List winning records of a slot, optionally for one market.
    pub async fn list_winnings(
        &self,
        code: &str,
        market: Option<&str>,
    ) -> Result<Vec<WinningRecord>, DatabaseError> {
        let records = if let Some(market) = market {
            sqlx::query_as::<_, WinningRecord>(
                "SELECT * FROM winning_records WHERE code = ? AND market = ? ORDER BY bet_id, hit_type",
            )
            .bind(code)
            .bind(market)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, WinningRecord>(
                "SELECT * FROM winning_records WHERE code = ? ORDER BY market, bet_id, hit_type",
            )
            .bind(code)
            .fetch_all(self.pool())
            .await?
        };

        Ok(records)
    }

    /// List winning records of one agent, newest slot first.
    pub async fn list_winnings_for_agent(
        &self,
        agent_id: i64,
        limit: u32,
    ) -> Result<Vec<WinningRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, WinningRecord>(
            "SELECT * FROM winning_records WHERE agent_id = ? ORDER BY code DESC, id ASC LIMIT ?",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    /// Count winning records of a slot.
    pub async fn count_winnings(&self, code: &str) -> Result<u64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM winning_records WHERE code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await?;
        #[allow(clippy::cast_sign_loss)]
        Ok(row.0 as u64)
    }

    /// `(bet_id, hit_type)` keys already settled for one (slot, market).
    pub(crate) async fn hit_keys_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
    ) -> Result<HashSet<(i64, String)>, DatabaseError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT bet_id, hit_type FROM winning_records WHERE code = ? AND market = ?",
        )
        .bind(code)
        .bind(market)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Insert a winning record unless its `(bet_id, code, market, hit_type)`
    /// key exists. Returns whether a row was inserted.
    pub(crate) async fn insert_winning_in(
        conn: &mut SqliteConnection,
        record: &NewWinning<'_>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r"
            INSERT INTO winning_records
                (bet_id, agent_id, market, code, number, hit_type, stake, odds, payout, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (bet_id, code, market, hit_type) DO NOTHING
            ",
        )
        .bind(record.bet_id)
        .bind(record.agent_id)
        .bind(record.market)
        .bind(record.code)
        .bind(record.number)
        .bind(record.hit_type)
        .bind(money_text(record.stake))
        .bind(money_text(record.odds))
        .bind(money_text(record.payout))
        .bind(unix_timestamp())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the winning records of one (slot, market). Only used by the
    /// explicit re-settle operation.
    pub(crate) async fn delete_winnings_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM winning_records WHERE code = ? AND market = ?")
            .bind(code)
            .bind(market)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Settlement run queries
    // =========================================================================

    /// Open (or bump) the run ledger row for one (slot, market).
    ///
    /// Settlement issues this write first so the transaction holds the write
    /// lock before it reads anything.
    pub(crate) async fn begin_settlement_run_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO settlement_runs (code, market, first_run_at, last_run_at, run_count, last_inserted)
            VALUES (?, ?, ?, ?, 1, 0)
            ON CONFLICT (code, market) DO UPDATE SET
                last_run_at = excluded.last_run_at,
                run_count = settlement_runs.run_count + 1,
                last_inserted = 0
            ",
        )
        .bind(code)
        .bind(market)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Record how many rows the current run inserted.
    pub(crate) async fn finish_settlement_run_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
        inserted: u64,
    ) -> Result<(), DatabaseError> {
        #[allow(clippy::cast_possible_wrap)]
        let inserted = inserted as i64;

        sqlx::query("UPDATE settlement_runs SET last_inserted = ? WHERE code = ? AND market = ?")
            .bind(inserted)
            .bind(code)
            .bind(market)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// List the run ledger of a slot.
    pub async fn list_settlement_runs(
        &self,
        code: &str,
    ) -> Result<Vec<SettlementRun>, DatabaseError> {
        let runs = sqlx::query_as::<_, SettlementRun>(
            "SELECT * FROM settlement_runs WHERE code = ? ORDER BY market ASC",
        )
        .bind(code)
        .fetch_all(self.pool())
        .await?;

        Ok(runs)
    }
}
