//! Error taxonomy for pool operations.

use pool2d_core::slot::SlotError;
use pool2d_core::wager::WagerError;

use crate::storage::DatabaseError;

/// Errors surfaced by bet submission, draw entry and settlement.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Malformed number, stake, market or slot, a slot already past its lock
    /// time, or an all-zero stake row.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The slot was locked between the caller's check and the write.
    #[error("slot {code} was locked before the bet was stored; retry against the next slot")]
    RaceLossOnLock { code: String },

    /// A delete was refused because part of the order is locked.
    #[error("order {0} is locked")]
    OrderLocked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("draw result for {code} market {market} already recorded")]
    DrawExists { code: String, market: String },

    /// The persistence layer failed; fatal to the current operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

impl From<sqlx::Error> for PoolError {
    fn from(e: sqlx::Error) -> Self {
        Self::StoreUnavailable(e.into())
    }
}

impl From<WagerError> for PoolError {
    fn from(e: WagerError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<SlotError> for PoolError {
    fn from(e: SlotError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl PoolError {
    /// Whether the error only rejects the caller's input (the row can be
    /// skipped while siblings proceed).
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::RaceLossOnLock { .. } | Self::OrderLocked(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_not_store_failures() {
        assert!(PoolError::InvalidInput("x".into()).is_rejection());
        assert!(
            PoolError::RaceLossOnLock {
                code: "20250906/1950".into()
            }
            .is_rejection()
        );
        assert!(!PoolError::StoreUnavailable(DatabaseError::Connection("down".into())).is_rejection());
    }

    #[test]
    fn wager_errors_become_invalid_input() {
        let err: PoolError = WagerError::ZeroStake.into();
        assert!(matches!(err, PoolError::InvalidInput(_)));
        assert_eq!(err.to_string(), "invalid input: all stakes are zero");
    }
}
