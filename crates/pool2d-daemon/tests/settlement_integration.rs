#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end settlement flow over a file-backed database.
//!
//! Covers submission, the scheduler's lock transition, draw entry and
//! settlement, including concurrent settlers sharing one database file.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use pool2d_core::Config;
use pool2d_core::slot::{SlotClock, SlotCode};
use pool2d_daemon::draws::DrawEntry;
use pool2d_daemon::error::PoolError;
use pool2d_daemon::services::Services;
use pool2d_daemon::settlement::MarketOutcome;
use pool2d_daemon::storage::{BetStatus, Database};
use pool2d_daemon::submission::{LineInput, Submission, submit};

const CODE: &str = "20250906/1950";

fn at(h: u32, mi: u32, s: u32) -> DateTime<Tz> {
    let naive = NaiveDate::from_ymd_opt(2025, 9, 6)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap();
    SlotClock::default().at(naive).unwrap()
}

fn slot() -> SlotCode {
    SlotCode::parse(CODE).unwrap()
}

fn services(db: Database) -> Services {
    Services::new(db, &Config::default()).unwrap()
}

async fn seed(services: &Services) {
    let submission = Submission {
        agent_id: 7,
        codes: vec![slot()],
        markets: vec!["M".into()],
        lines: vec![
            "14=10,5".parse::<LineInput>().unwrap(),
            "15=,5".parse::<LineInput>().unwrap(),
            "62=,,4,4,4,4".parse::<LineInput>().unwrap(),
        ],
    };
    let receipt = submit(&services.bets, &submission, &at(19, 30, 0)).await.unwrap();
    assert_eq!(receipt.summary(), "accepted 3, rejected 0");

    services.bets.mark_locked(&slot(), &at(19, 49, 0)).await.unwrap();
    services
        .draws
        .record_draw(
            &slot(),
            "M",
            &DrawEntry {
                head: "14",
                specials: "15,88,99,87,62",
                ..DrawEntry::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_settlement_flow() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("pool.db")).await.unwrap();
    let services = services(db);
    seed(&services).await;

    let report = services.engine.settle_slot(&slot()).await.unwrap();
    // 14: N1 + N_HEAD. 15: N_SPECIAL. 62: N_SPECIAL has no stake; S + SS.
    assert_eq!(report.inserted, 5);

    let records = services.db.list_winnings(CODE, Some("M")).await.unwrap();
    let mut payouts: Vec<(String, String, String)> = records
        .iter()
        .map(|r| (r.number.clone(), r.hit_type.clone(), r.payout.clone()))
        .collect();
    payouts.sort();
    let expected: Vec<(String, String, String)> = [
        ("14", "N1", "490.00"),
        ("14", "N_HEAD", "135.00"),
        ("15", "N_SPECIAL", "30.00"),
        ("62", "S", "3.60"),
        ("62", "SS", "3.60"),
    ]
    .iter()
    .map(|(n, h, p)| ((*n).to_string(), (*h).to_string(), (*p).to_string()))
    .collect();
    assert_eq!(payouts, expected);

    // Every record points at a locked bet.
    for record in &records {
        let bet = services.db.get_bet(record.bet_id).await.unwrap();
        assert_eq!(bet.bet_status(), Some(BetStatus::Locked));
    }
}

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let db = Database::open_in_memory().await.unwrap();
    let services = services(db);
    seed(&services).await;

    assert_eq!(services.engine.settle_slot(&slot()).await.unwrap().inserted, 5);
    for _ in 0..3 {
        assert_eq!(services.engine.settle_slot(&slot()).await.unwrap().inserted, 0);
    }
    assert_eq!(
        services.engine.settle_market(&slot(), "M").await.unwrap().inserted,
        0
    );
    assert_eq!(services.db.count_winnings(CODE).await.unwrap(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlers_write_each_record_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("pool.db");
    let first = services(Database::open(&path).await.unwrap());
    seed(&first).await;
    // A second pool on the same file stands in for another process.
    let second = services(Database::open(&path).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = if i % 2 == 0 {
            first.engine.clone()
        } else {
            second.engine.clone()
        };
        handles.push(tokio::spawn(async move {
            engine.settle_slot(&slot()).await.unwrap().inserted
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 5);
    assert_eq!(first.db.count_winnings(CODE).await.unwrap(), 5);

    let runs = first.db.list_settlement_runs(CODE).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_count, 8);
}

#[tokio::test]
async fn test_no_late_entry_after_cutoff() {
    let db = Database::open_in_memory().await.unwrap();
    let services = services(db);

    let submission = Submission {
        agent_id: 7,
        codes: vec![slot()],
        markets: vec!["M".into()],
        lines: vec!["14=10".parse().unwrap()],
    };
    let receipt = submit(&services.bets, &submission, &at(19, 49, 0)).await.unwrap();
    assert!(receipt.accepted.is_empty());
    assert_eq!(receipt.rejected.len(), 1);
    assert!(services.bets.list_bets(&slot(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lock_is_monotonic() {
    let db = Database::open_in_memory().await.unwrap();
    let services = services(db);
    seed(&services).await;

    let order = services.bets.list_bets(&slot(), None).await.unwrap()[0]
        .order_code
        .clone();
    let deleted = services.bets.mark_deleted(&order, 7, &at(19, 59, 0)).await;
    assert!(matches!(deleted, Err(PoolError::OrderLocked(_))));

    assert_eq!(services.bets.mark_locked(&slot(), &at(19, 50, 0)).await.unwrap(), 0);
    let bets = services.bets.list_bets(&slot(), None).await.unwrap();
    assert!(bets.iter().all(|b| b.bet_status() == Some(BetStatus::Locked)));
    assert!(bets.iter().all(|b| b.locked_at == Some(at(19, 49, 0).timestamp())));
}

#[tokio::test]
async fn test_resettle_replaces_without_duplicates() {
    let db = Database::open_in_memory().await.unwrap();
    let services = services(db);
    seed(&services).await;
    services.engine.settle_slot(&slot()).await.unwrap();

    let report = services.engine.resettle_slot(&slot()).await.unwrap();
    assert_eq!(report.inserted, 5);
    assert_eq!(
        report.markets[0].outcome,
        MarketOutcome::Settled {
            bets: 3,
            inserted: 5,
            already_present: 0,
            purged: 5,
        }
    );
    assert_eq!(services.db.count_winnings(CODE).await.unwrap(), 5);
}

#[tokio::test]
async fn test_draw_result_cannot_be_overwritten() {
    let db = Database::open_in_memory().await.unwrap();
    let services = services(db);
    seed(&services).await;

    let again = services
        .draws
        .record_draw(
            &slot(),
            "M",
            &DrawEntry {
                head: "41",
                ..DrawEntry::default()
            },
        )
        .await;
    assert!(matches!(again, Err(PoolError::DrawExists { .. })));
    let draw = services.draws.get_draw(&slot(), "M").await.unwrap().unwrap();
    assert_eq!(draw.head, "14");
}
