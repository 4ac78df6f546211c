//! Draw result store: one validated result per (slot, market).

use pool2d_core::config::MarketConfig;
use pool2d_core::slot::SlotCode;
use pool2d_core::wager::DrawOutcome;
use tracing::info;

use crate::error::PoolError;
use crate::storage::{Database, DatabaseError, DrawResult};

/// Raw draw entry as typed by an operator.
#[derive(Debug, Clone, Default)]
pub struct DrawEntry<'a> {
    pub head: &'a str,
    /// Comma-separated special numbers.
    pub specials: &'a str,
    /// Size class; derived from the head when absent.
    pub size: Option<&'a str>,
    /// Parity class; derived from the head when absent.
    pub parity: Option<&'a str>,
}

#[derive(Clone)]
pub struct DrawResultStore {
    db: Database,
    markets: MarketConfig,
    max_specials: usize,
}

impl DrawResultStore {
    pub const fn new(db: Database, markets: MarketConfig, max_specials: usize) -> Self {
        Self {
            db,
            markets,
            max_specials,
        }
    }

    /// Validate and persist the outcome of one (slot, market).
    ///
    /// A second result for the same pair is refused with `DrawExists`;
    /// correcting a result is an explicit delete and re-settle, never an
    /// overwrite.
    pub async fn record_draw(
        &self,
        code: &SlotCode,
        market: &str,
        entry: &DrawEntry<'_>,
    ) -> Result<DrawResult, PoolError> {
        let market = self
            .markets
            .resolve(market)
            .ok_or_else(|| PoolError::InvalidInput(format!("unknown market '{market}'")))?;
        let outcome = DrawOutcome::parse(
            entry.head,
            entry.specials,
            entry.size,
            entry.parity,
            self.max_specials,
        )?;

        let code_text = code.to_string();
        match self.db.insert_draw(&code_text, market, &outcome).await {
            Ok(draw) => {
                info!(
                    code = %code,
                    market,
                    head = %draw.head,
                    specials = %draw.specials,
                    "Draw result recorded"
                );
                Ok(draw)
            }
            Err(DatabaseError::Constraint(_)) => Err(PoolError::DrawExists {
                code: code_text,
                market: market.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_draw(
        &self,
        code: &SlotCode,
        market: &str,
    ) -> Result<Option<DrawResult>, PoolError> {
        let Some(market) = self.markets.resolve(market) else {
            return Ok(None);
        };
        Ok(self.db.get_draw(&code.to_string(), market).await?)
    }

    pub async fn list_draws(&self, code: &SlotCode) -> Result<Vec<DrawResult>, PoolError> {
        Ok(self.db.list_draws(&code.to_string()).await?)
    }
}
