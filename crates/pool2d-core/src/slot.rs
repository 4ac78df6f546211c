//! Slot clock: mapping between wall-clock time and hourly draw slots.
//!
//! A slot is the hourly betting window identified by the literal code
//! `YYYYMMDD/HH50`. Betting on a slot closes at minute 49 of its hour
//! (the "lock time"). Every computation happens in one named timezone
//! rather than the host's local zone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Default timezone for slot evaluation.
pub const DEFAULT_TIMEZONE: &str = "Asia/Kuala_Lumpur";

/// Default first valid slot hour (inclusive).
pub const DEFAULT_OPEN_HOUR: u32 = 9;

/// Default last valid slot hour (inclusive).
pub const DEFAULT_CLOSE_HOUR: u32 = 23;

/// Default minute of the hour at which a slot locks.
pub const DEFAULT_LOCK_MINUTE: u32 = 49;

/// Errors from slot code parsing and clock construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("invalid slot code '{0}' (expected YYYYMMDD/HH50)")]
    InvalidCode(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid hour range {open}..={close}")]
    InvalidHourRange { open: u32, close: u32 },

    #[error("invalid lock minute {0}")]
    InvalidLockMinute(u32),

    #[error("local time {0} does not exist in the configured timezone")]
    NonexistentLocalTime(NaiveDateTime),
}

/// Identifier of one hourly slot.
///
/// Ordering follows `(date, hour)`, which matches the lexical order of the
/// encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotCode {
    date: NaiveDate,
    hour: u32,
}

impl SlotCode {
    /// Build a slot code from a date and an hour (0-23).
    pub fn new(date: NaiveDate, hour: u32) -> Result<Self, SlotError> {
        if hour > 23 {
            return Err(SlotError::InvalidCode(format!(
                "{}/{hour:02}50",
                date.format("%Y%m%d")
            )));
        }
        Ok(Self { date, hour })
    }

    /// Parse the literal `YYYYMMDD/HH50` form.
    pub fn parse(s: &str) -> Result<Self, SlotError> {
        let invalid = || SlotError::InvalidCode(s.to_string());
        let s_trimmed = s.trim();
        if s_trimmed.len() != 13 || !s_trimmed.is_ascii() {
            return Err(invalid());
        }
        let (date_part, rest) = s_trimmed.split_at(8);
        let Some(time_part) = rest.strip_prefix('/') else {
            return Err(invalid());
        };
        if !date_part.bytes().all(|b| b.is_ascii_digit())
            || !time_part.bytes().all(|b| b.is_ascii_digit())
            || !time_part.ends_with("50")
        {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|_| invalid())?;
        let hour: u32 = time_part[..2].parse().map_err(|_| invalid())?;
        Self::new(date, hour).map_err(|_| invalid())
    }

    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    pub const fn hour(&self) -> u32 {
        self.hour
    }
}

impl fmt::Display for SlotCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}50", self.date.format("%Y%m%d"), self.hour)
    }
}

impl FromStr for SlotCode {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SlotCode {
    type Error = SlotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SlotCode> for String {
    fn from(code: SlotCode) -> Self {
        code.to_string()
    }
}

/// One entry of [`SlotClock::slots_for_day`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub code: SlotCode,
    pub hour: u32,
    pub label: String,
    pub locked: bool,
}

/// Pure slot arithmetic in one fixed timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    tz: Tz,
    open_hour: u32,
    close_hour: u32,
    lock_minute: u32,
}

impl Default for SlotClock {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Kuala_Lumpur,
            open_hour: DEFAULT_OPEN_HOUR,
            close_hour: DEFAULT_CLOSE_HOUR,
            lock_minute: DEFAULT_LOCK_MINUTE,
        }
    }
}

impl SlotClock {
    /// Create a clock for the named IANA timezone and closed hour range.
    pub fn new(
        timezone: &str,
        open_hour: u32,
        close_hour: u32,
        lock_minute: u32,
    ) -> Result<Self, SlotError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SlotError::UnknownTimezone(timezone.to_string()))?;
        if open_hour > close_hour || close_hour > 23 {
            return Err(SlotError::InvalidHourRange {
                open: open_hour,
                close: close_hour,
            });
        }
        if lock_minute > 59 {
            return Err(SlotError::InvalidLockMinute(lock_minute));
        }
        Ok(Self {
            tz,
            open_hour,
            close_hour,
            lock_minute,
        })
    }

    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    pub const fn open_hour(&self) -> u32 {
        self.open_hour
    }

    pub const fn close_hour(&self) -> u32 {
        self.close_hour
    }

    pub const fn lock_minute(&self) -> u32 {
        self.lock_minute
    }

    /// Current wall-clock time in the slot timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Convert any instant into the slot timezone.
    pub fn localize<T: TimeZone>(&self, t: &DateTime<T>) -> DateTime<Tz> {
        t.with_timezone(&self.tz)
    }

    /// Resolve a naive local wall-clock time in the slot timezone.
    pub fn at(&self, naive: NaiveDateTime) -> Result<DateTime<Tz>, SlotError> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or(SlotError::NonexistentLocalTime(naive))
    }

    /// Whether `hour` lies inside the configured closed range.
    pub const fn is_valid_hour(&self, hour: u32) -> bool {
        hour >= self.open_hour && hour <= self.close_hour
    }

    /// Slot code for the hour containing `t`; minutes and seconds are ignored.
    pub fn slot_code_for_hour<T: TimeZone>(&self, t: &DateTime<T>) -> SlotCode {
        let local = self.localize(t);
        SlotCode {
            date: local.date_naive(),
            hour: local.hour(),
        }
    }

    /// The instant a slot stops accepting bets: its hour at the lock minute.
    pub fn lock_time_of(&self, code: &SlotCode) -> Result<DateTime<Tz>, SlotError> {
        let naive = code
            .date
            .and_hms_opt(code.hour, self.lock_minute, 0)
            .ok_or_else(|| SlotError::InvalidCode(code.to_string()))?;
        self.at(naive)
    }

    /// `now >= lock_time_of(code)`. A lock time that cannot be resolved
    /// counts as locked.
    pub fn is_locked<T: TimeZone>(&self, code: &SlotCode, now: &DateTime<T>) -> bool {
        self.lock_time_of(code)
            .map_or(true, |lock| self.localize(now) >= lock)
    }

    /// The slot new bets should target at `now`.
    pub fn next_slot<T: TimeZone>(&self, now: &DateTime<T>) -> SlotCode {
        let local = self.localize(now);
        let base = if local.minute() >= self.lock_minute {
            local + TimeDelta::hours(1)
        } else {
            local
        };
        let date = base.date_naive();
        let hour = base.hour();

        if hour < self.open_hour {
            SlotCode {
                date,
                hour: self.open_hour,
            }
        } else if hour > self.close_hour {
            SlotCode {
                date: date.succ_opt().unwrap_or(NaiveDate::MAX),
                hour: self.open_hour,
            }
        } else {
            SlotCode { date, hour }
        }
    }

    /// The most recent slot whose lock time has passed at `now`.
    pub fn due_slot<T: TimeZone>(&self, now: &DateTime<T>) -> SlotCode {
        let local = self.localize(now);
        let date = local.date_naive();
        let hour = i64::from(local.hour());
        let latest_locked = if local.minute() >= self.lock_minute {
            hour
        } else {
            hour - 1
        };

        if latest_locked >= i64::from(self.open_hour) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let hour = latest_locked.min(i64::from(self.close_hour)) as u32;
            SlotCode { date, hour }
        } else {
            SlotCode {
                date: date.pred_opt().unwrap_or(NaiveDate::MIN),
                hour: self.close_hour,
            }
        }
    }

    /// Every valid slot of `date` in ascending order, with lock state
    /// evaluated against `now`.
    pub fn slots_for_day<T: TimeZone>(&self, date: NaiveDate, now: &DateTime<T>) -> Vec<SlotInfo> {
        (self.open_hour..=self.close_hour)
            .map(|hour| {
                let code = SlotCode { date, hour };
                SlotInfo {
                    locked: self.is_locked(&code, now),
                    label: format!("{hour:02}:50"),
                    code,
                    hour,
                }
            })
            .collect()
    }
}
