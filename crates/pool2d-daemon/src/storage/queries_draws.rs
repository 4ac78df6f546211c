//! Draw result queries.

use pool2d_core::db::unix_timestamp;
use pool2d_core::wager::DrawOutcome;
use sqlx::SqliteConnection;

use super::db::{Database, DatabaseError};
use super::models::DrawResult;

impl Database {
    /// Insert the outcome of one (slot, market). Fails with
    /// `DatabaseError::Constraint` if the pair already has a result.
    pub async fn insert_draw(
        &self,
        code: &str,
        market: &str,
        outcome: &DrawOutcome,
    ) -> Result<DrawResult, DatabaseError> {
        let now = unix_timestamp();

        let id = sqlx::query(
            r"
            INSERT INTO draw_results (code, market, head, specials, size_type, parity_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(code)
        .bind(market)
        .bind(&outcome.head)
        .bind(outcome.specials_csv())
        .bind(outcome.size.as_str())
        .bind(outcome.parity.as_str())
        .bind(now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        sqlx::query_as::<_, DrawResult>("SELECT * FROM draw_results WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(Into::into)
    }

    /// Get the result of one (slot, market), if recorded.
    pub async fn get_draw(
        &self,
        code: &str,
        market: &str,
    ) -> Result<Option<DrawResult>, DatabaseError> {
        let draw = sqlx::query_as::<_, DrawResult>(
            "SELECT * FROM draw_results WHERE code = ? AND market = ?",
        )
        .bind(code)
        .bind(market)
        .fetch_optional(self.pool())
        .await?;

        Ok(draw)
    }

    /// List every market result of a slot.
    pub async fn list_draws(&self, code: &str) -> Result<Vec<DrawResult>, DatabaseError> {
        let draws = sqlx::query_as::<_, DrawResult>(
            "SELECT * FROM draw_results WHERE code = ? ORDER BY market ASC",
        )
        .bind(code)
        .fetch_all(self.pool())
        .await?;

        Ok(draws)
    }

    /// Result of one (slot, market), read inside a settlement transaction.
    pub(crate) async fn draw_in(
        conn: &mut SqliteConnection,
        code: &str,
        market: &str,
    ) -> Result<Option<DrawResult>, DatabaseError> {
        let draw = sqlx::query_as::<_, DrawResult>(
            "SELECT * FROM draw_results WHERE code = ? AND market = ?",
        )
        .bind(code)
        .bind(market)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(draw)
    }
}
