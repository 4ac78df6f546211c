//! Batch bet submission.
//!
//! A submission expands to one bet row per (slot, market, line). Rows are
//! independent: a rejected row is reported and its siblings proceed. Only a
//! store failure aborts the batch.

use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use pool2d_core::slot::SlotCode;
use pool2d_core::wager::Stakes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bets::{BetRequest, BetStore};
use crate::error::PoolError;

/// One entered line: a number and its six raw stake fields
/// (n1, n, big, small, odd, even).
#[derive(Debug, Clone)]
pub struct LineInput {
    pub number: String,
    pub stakes: [String; 6],
}

impl FromStr for LineInput {
    type Err = PoolError;

    /// Parse `NUMBER=n1,n,big,small,odd,even`; trailing stakes may be omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, amounts) = s
            .split_once('=')
            .ok_or_else(|| PoolError::InvalidInput(format!("line '{s}' has no '='")))?;
        let fields: Vec<&str> = amounts.split(',').collect();
        if fields.len() > 6 {
            return Err(PoolError::InvalidInput(format!(
                "line '{s}' has more than six stakes"
            )));
        }
        let mut stakes: [String; 6] = Default::default();
        for (stake, field) in stakes.iter_mut().zip(fields) {
            *stake = field.trim().to_string();
        }
        Ok(Self {
            number: number.trim().to_string(),
            stakes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub agent_id: i64,
    pub codes: Vec<SlotCode>,
    pub markets: Vec<String>,
    pub lines: Vec<LineInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// 1-based index into the submitted lines.
    pub line: usize,
    pub code: SlotCode,
    pub market: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub order_code: String,
    pub accepted: Vec<i64>,
    pub rejected: Vec<RejectedRow>,
}

impl SubmissionReceipt {
    pub fn summary(&self) -> String {
        format!(
            "accepted {}, rejected {}",
            self.accepted.len(),
            self.rejected.len()
        )
    }
}

/// A fresh order code grouping the rows of one submission.
pub fn new_order_code() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Submit every (slot, market, line) row of `submission` under one new order
/// code.
pub async fn submit<T: TimeZone>(
    store: &BetStore,
    submission: &Submission,
    now: &DateTime<T>,
) -> Result<SubmissionReceipt, PoolError> {
    let mut receipt = SubmissionReceipt {
        order_code: new_order_code(),
        accepted: Vec::new(),
        rejected: Vec::new(),
    };

    for (index, line) in submission.lines.iter().enumerate() {
        let stakes = Stakes::parse(line.stakes.each_ref().map(String::as_str));

        for code in &submission.codes {
            for market in &submission.markets {
                let result = match &stakes {
                    Ok(stakes) => {
                        let request = BetRequest {
                            order_code: &receipt.order_code,
                            agent_id: submission.agent_id,
                            market,
                            code: *code,
                            number: &line.number,
                            stakes: *stakes,
                        };
                        store.create_bet(&request, now).await
                    }
                    Err(e) => Err(e.clone().into()),
                };

                match result {
                    Ok(id) => receipt.accepted.push(id),
                    Err(e) if e.is_rejection() => {
                        warn!(
                            line = index + 1,
                            code = %code,
                            market = %market,
                            error = %e,
                            "Bet row rejected"
                        );
                        receipt.rejected.push(RejectedRow {
                            line: index + 1,
                            code: *code,
                            market: market.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    info!(
        order_code = %receipt.order_code,
        agent_id = submission.agent_id,
        accepted = receipt.accepted.len(),
        rejected = receipt.rejected.len(),
        "Submission processed"
    );
    Ok(receipt)
}
