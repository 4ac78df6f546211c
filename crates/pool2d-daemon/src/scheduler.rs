//! Periodic lock and settle driver.
//!
//! Every tick looks at the current hour's slot. From the lock minute on it
//! locks the slot, from the settle minute on it settles each market that has a
//! draw result. Both actions run at most once per slot; a failed action is
//! retried on the next tick. Earlier slots whose lock window was missed (the
//! daemon was down, or the lock kept failing) are locked and settled on the
//! first tick that sees them.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike};
use pool2d_core::slot::{SlotClock, SlotCode};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bets::BetStore;
use crate::settlement::{MarketOutcome, SettlementEngine};

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Bets locked, when the lock ran on this tick.
    pub locked: Option<u64>,
    /// Winning records inserted, when at least one market settled on this
    /// tick.
    pub settled: Option<u64>,
    /// Bets locked in earlier slots that missed their lock window.
    pub caught_up: Option<u64>,
}

pub struct SlotScheduler {
    clock: SlotClock,
    settle_minute: u32,
    markets: Vec<String>,
    bets: BetStore,
    engine: SettlementEngine,
    last_locked: Option<SlotCode>,
    last_settled: Option<SlotCode>,
    /// Markets of `current` already settled (or skipped as malformed).
    current: Option<(SlotCode, BTreeSet<String>)>,
}

impl SlotScheduler {
    pub fn new(
        bets: BetStore,
        engine: SettlementEngine,
        markets: Vec<String>,
        settle_minute: u32,
    ) -> Self {
        Self {
            clock: *bets.clock(),
            settle_minute,
            markets,
            bets,
            engine,
            last_locked: None,
            last_settled: None,
            current: None,
        }
    }

    pub const fn last_locked(&self) -> Option<SlotCode> {
        self.last_locked
    }

    pub const fn last_settled(&self) -> Option<SlotCode> {
        self.last_settled
    }

    /// Run the actions due at `now`.
    pub async fn tick<T: TimeZone>(&mut self, now: &DateTime<T>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let local = self.clock.localize(now);
        let code = self.clock.slot_code_for_hour(&local);
        outcome.caught_up = self.catch_up(code, &local).await;

        if !self.clock.is_valid_hour(code.hour()) || local.minute() < self.clock.lock_minute() {
            return outcome;
        }

        if self.last_locked != Some(code) {
            match self.bets.mark_locked(&code, &local).await {
                Ok(rows) => {
                    self.last_locked = Some(code);
                    outcome.locked = Some(rows);
                }
                Err(e) => {
                    error!(code = %code, error = %e, "Slot lock failed, retrying next tick");
                    return outcome;
                }
            }
        }

        if local.minute() >= self.settle_minute && self.last_settled != Some(code) {
            outcome.settled = self.settle(code).await;
        }

        outcome
    }

    /// Lock and settle overdue slots other than `current`.
    async fn catch_up<T: TimeZone>(&self, current: SlotCode, now: &DateTime<T>) -> Option<u64> {
        let locked = match self.bets.lock_overdue(now, Some(current)).await {
            Ok(locked) => locked,
            Err(e) => {
                error!(error = %e, "Overdue slot lock failed, retrying next tick");
                return None;
            }
        };

        let mut total = None;
        for (code, rows) in locked {
            warn!(code = %code, rows, "Locked slot that missed its lock window");
            total = Some(total.unwrap_or(0) + rows);
            match self.engine.settle_slot(&code).await {
                Ok(report) => info!(code = %code, inserted = report.inserted, "Overdue slot settled"),
                Err(e) => error!(code = %code, error = %e, "Overdue slot settlement failed"),
            }
        }
        total
    }

    async fn settle(&mut self, code: SlotCode) -> Option<u64> {
        if self.current.as_ref().is_none_or(|(c, _)| *c != code) {
            if let Some((previous, done)) = self.current.take()
                && done.len() < self.markets.len()
            {
                let pending: Vec<&str> = self
                    .markets
                    .iter()
                    .filter(|m| !done.contains(*m))
                    .map(String::as_str)
                    .collect();
                warn!(code = %previous, ?pending, "Slot left with unsettled markets");
            }
            self.current = Some((code, BTreeSet::new()));
        }
        let (_, done) = self.current.as_mut()?;

        let mut inserted = None;
        for market in &self.markets {
            if done.contains(market) {
                continue;
            }
            let outcome = match self.engine.settle_market(&code, market).await {
                Ok(report) => report.markets.into_iter().next().map(|m| m.outcome),
                Err(e) => {
                    error!(code = %code, market = %market, error = %e, "Settlement failed, retrying next tick");
                    break;
                }
            };
            match outcome {
                Some(MarketOutcome::Settled { inserted: n, .. }) => {
                    done.insert(market.clone());
                    inserted = Some(inserted.unwrap_or(0) + n);
                }
                // Left for an operator to correct and settle by hand.
                Some(MarketOutcome::MalformedDraw { .. }) => {
                    done.insert(market.clone());
                }
                Some(MarketOutcome::NoDraw) | None => {
                    debug!(code = %code, market = %market, "Awaiting draw result");
                }
            }
        }

        if done.len() == self.markets.len() {
            info!(code = %code, "All markets settled");
            self.last_settled = Some(code);
        }
        inserted
    }
}

/// Spawn the scheduler loop, ticking every `interval` until `shutdown`
/// changes.
pub fn spawn_scheduler(
    mut scheduler: SlotScheduler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Slot scheduler started");
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let now = scheduler.clock.now();
                    let outcome = scheduler.tick(&now).await;
                    if outcome != TickOutcome::default() {
                        debug!(?outcome, "Scheduler tick");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Slot scheduler shutting down");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use chrono_tz::Tz;
    use pool2d_core::config::MarketConfig;
    use pool2d_core::wager::{Odds, Stakes};

    use super::*;
    use crate::bets::BetRequest;
    use crate::draws::{DrawEntry, DrawResultStore};
    use crate::storage::{BetStatus, Database};

    struct Fixture {
        db: Database,
        bets: BetStore,
        draws: DrawResultStore,
        scheduler: SlotScheduler,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let clock = SlotClock::default();
        let markets = MarketConfig {
            symbols: vec!["M".into(), "P".into()],
        };
        let bets = BetStore::new(db.clone(), clock, markets.clone());
        let draws = DrawResultStore::new(db.clone(), markets.clone(), 5);
        let engine = SettlementEngine::new(db.clone(), clock, Odds::default(), 5);
        let scheduler = SlotScheduler::new(bets.clone(), engine, markets.symbols, 52);
        Fixture {
            db,
            bets,
            draws,
            scheduler,
        }
    }

    fn at(h: u32, mi: u32, s: u32) -> DateTime<Tz> {
        let naive = NaiveDate::from_ymd_opt(2025, 9, 6)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap();
        SlotClock::default().at(naive).unwrap()
    }

    fn slot(s: &str) -> SlotCode {
        SlotCode::parse(s).unwrap()
    }

    async fn bet(f: &Fixture, code: &str, market: &str, now: DateTime<Tz>) {
        f.bets
            .create_bet(
                &BetRequest {
                    order_code: "o1",
                    agent_id: 7,
                    market,
                    code: slot(code),
                    number: "14",
                    stakes: Stakes::parse(["10", "", "", "", "", ""]).unwrap(),
                },
                &now,
            )
            .await
            .unwrap();
    }

    async fn draw(f: &Fixture, code: &str, market: &str) {
        f.draws
            .record_draw(
                &slot(code),
                market,
                &DrawEntry {
                    head: "14",
                    ..DrawEntry::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lock_runs_once_per_hour() {
        let mut f = fixture().await;
        bet(&f, "20250906/1950", "M", at(19, 0, 0)).await;

        assert_eq!(f.scheduler.tick(&at(19, 48, 59)).await, TickOutcome::default());

        let first = f.scheduler.tick(&at(19, 49, 0)).await;
        assert_eq!(first.locked, Some(1));
        for s in (5..60).step_by(5) {
            let again = f.scheduler.tick(&at(19, 49, s)).await;
            assert_eq!(again.locked, None);
        }
        assert_eq!(f.scheduler.last_locked(), Some(slot("20250906/1950")));
        assert_eq!(
            f.bets.list_bets(&slot("20250906/1950"), Some(BetStatus::Locked)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn settle_waits_for_draws_then_runs_once() {
        let mut f = fixture().await;
        bet(&f, "20250906/1950", "M", at(19, 0, 0)).await;
        bet(&f, "20250906/1950", "P", at(19, 0, 0)).await;

        f.scheduler.tick(&at(19, 49, 0)).await;
        // No draws yet: nothing recorded, retried later.
        assert_eq!(f.scheduler.tick(&at(19, 52, 0)).await.settled, None);
        assert_eq!(f.scheduler.last_settled(), None);

        draw(&f, "20250906/1950", "M").await;
        assert_eq!(f.scheduler.tick(&at(19, 52, 5)).await.settled, Some(1));
        assert_eq!(f.scheduler.last_settled(), None);

        draw(&f, "20250906/1950", "P").await;
        assert_eq!(f.scheduler.tick(&at(19, 52, 10)).await.settled, Some(1));
        assert_eq!(f.scheduler.last_settled(), Some(slot("20250906/1950")));

        assert_eq!(f.scheduler.tick(&at(19, 55, 0)).await, TickOutcome::default());
    }

    #[tokio::test]
    async fn late_start_locks_and_settles_on_same_tick() {
        let mut f = fixture().await;
        bet(&f, "20250906/1950", "M", at(19, 0, 0)).await;
        draw(&f, "20250906/1950", "M").await;
        draw(&f, "20250906/1950", "P").await;

        let outcome = f.scheduler.tick(&at(19, 57, 0)).await;
        assert_eq!(outcome.locked, Some(1));
        assert_eq!(outcome.settled, Some(1));
    }

    #[tokio::test]
    async fn next_hour_is_a_new_key_and_closed_hours_are_ignored() {
        let mut f = fixture().await;
        f.scheduler.tick(&at(19, 49, 0)).await;
        assert_eq!(f.scheduler.tick(&at(20, 49, 0)).await.locked, Some(0));
        assert_eq!(f.scheduler.last_locked(), Some(slot("20250906/2050")));

        let night = f.scheduler.tick(&at(3, 50, 0)).await;
        assert_eq!(night, TickOutcome::default());
        assert_eq!(f.scheduler.last_locked(), Some(slot("20250906/2050")));
    }

    #[tokio::test]
    async fn restart_after_missed_window_locks_and_settles() {
        let mut f = fixture().await;
        bet(&f, "20250906/1950", "M", at(19, 30, 0)).await;
        draw(&f, "20250906/1950", "M").await;

        // The daemon comes back at 20:05, past the whole 19:49-19:59 window.
        let outcome = f.scheduler.tick(&at(20, 5, 0)).await;
        assert_eq!(outcome.caught_up, Some(1));
        assert_eq!(outcome.locked, None);

        let code = slot("20250906/1950");
        let bets = f.bets.list_bets(&code, None).await.unwrap();
        assert_eq!(bets[0].bet_status(), Some(BetStatus::Locked));
        assert_eq!(bets[0].locked_at, Some(at(20, 5, 0).timestamp()));
        // 14 against head 14: one N1 record.
        assert_eq!(f.db.count_winnings("20250906/1950").await.unwrap(), 1);

        // Nothing left to catch up, and the current hour locks as usual.
        assert_eq!(f.scheduler.tick(&at(20, 10, 0)).await, TickOutcome::default());
        assert_eq!(f.scheduler.tick(&at(20, 49, 0)).await.locked, Some(0));
    }

    #[tokio::test]
    async fn spawned_scheduler_stops_on_shutdown() {
        let f = fixture().await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_scheduler(f.scheduler, Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
