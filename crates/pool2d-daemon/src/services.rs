//! Wiring of the pool services over one database.

use pool2d_core::Config;
use pool2d_core::wager::Odds;

use crate::bets::BetStore;
use crate::draws::DrawResultStore;
use crate::scheduler::SlotScheduler;
use crate::settlement::SettlementEngine;
use crate::storage::Database;

/// Every service built from one validated configuration.
#[derive(Clone)]
pub struct Services {
    pub db: Database,
    pub bets: BetStore,
    pub draws: DrawResultStore,
    pub engine: SettlementEngine,
}

impl Services {
    pub fn new(db: Database, config: &Config) -> pool2d_core::Result<Self> {
        let clock = config.clock.slot_clock()?;
        let bets = BetStore::new(db.clone(), clock, config.markets.clone());
        let draws = DrawResultStore::new(
            db.clone(),
            config.markets.clone(),
            config.draws.max_specials,
        );
        let engine =
            SettlementEngine::new(db.clone(), clock, Odds::default(), config.draws.max_specials);
        Ok(Self {
            db,
            bets,
            draws,
            engine,
        })
    }

    /// A scheduler driving these services.
    pub fn scheduler(&self, config: &Config) -> SlotScheduler {
        SlotScheduler::new(
            self.bets.clone(),
            self.engine.clone(),
            config.markets.symbols.clone(),
            config.scheduler.settle_minute,
        )
    }
}
