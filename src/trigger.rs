//! S.-day phase start calculation.
//!
//! Turns last night's sleep start and end into the daily time trigger that
//! starts the s.-day phase homeegram. Everything here is pure; the current
//! time is passed in.

use crate::clock::ClockTime;
use crate::error::AppError;
use chrono::{DateTime, TimeDelta, TimeZone};

/// The hub's web app only offers 5-minute steps, so triggers use them too.
const STEPS_PER_HOUR: f64 = 12.0;
const MINUTES_PER_STEP: i64 = 5;
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Coefficients describing how sleep moves the s.-day phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepModel {
    average_sleep_hours: f64,
    wake_offset_hours: f64,
    deviation_weight: f64,
}

impl SleepModel {
    /// Both hour values must lie in 0..=24 and the weight in 0..=1.
    pub fn new(
        average_sleep_hours: f64,
        wake_offset_hours: f64,
        deviation_weight: f64,
    ) -> Result<Self, AppError> {
        let in_range = |value: f64, max: f64| value.is_finite() && (0.0..=max).contains(&value);

        if !in_range(average_sleep_hours, 24.0)
            || !in_range(wake_offset_hours, 24.0)
            || !in_range(deviation_weight, 1.0)
        {
            return Err(AppError::Config(format!(
                "Invalid sleep model: average sleep {average_sleep_hours} h, \
                 wake offset {wake_offset_hours} h, deviation weight {deviation_weight}"
            )));
        }

        Ok(Self {
            average_sleep_hours,
            wake_offset_hours,
            deviation_weight,
        })
    }

    /// Start of the s.-day phase after a sleep from `start` to `end`.
    ///
    /// Sleeping less than average moves the phase earlier, sleeping more
    /// moves it later. The result is rounded to the nearest 5 minutes.
    pub fn phase_start(&self, start: ClockTime, end: ClockTime) -> ClockTime {
        let sleep_hours = sleep_duration_hours(start, end);
        let delay_hours = (sleep_hours - self.average_sleep_hours) * self.deviation_weight;
        let raw_hours = end.fractional_hours() + self.wake_offset_hours + delay_hours;

        // Half-steps round up, towards the later trigger.
        let steps = (raw_hours * STEPS_PER_HOUR + 0.5).floor() as i64;
        let minute_of_day = (steps * MINUTES_PER_STEP).rem_euclid(MINUTES_PER_DAY);

        ClockTime {
            hour: (minute_of_day / 60) as u8,
            minute: (minute_of_day % 60) as u8,
        }
    }
}

/// Hours slept, wrapping past midnight. Equal times mean a zero-length sleep.
pub fn sleep_duration_hours(start: ClockTime, end: ClockTime) -> f64 {
    (end.fractional_hours() - start.fractional_hours() + 24.0).rem_euclid(24.0)
}

/// The new definition of a homeegram's time trigger.
///
/// Also serves as the expected echo: the update only counts once the hub
/// reports back exactly these `dtstart` and `rrule` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTriggerUpdate {
    pub trigger_id: i64,
    pub dtstart: String,
    pub rrule: String,
}

impl TimeTriggerUpdate {
    pub fn new<Tz: TimeZone>(trigger_id: i64, fire_at: ClockTime, now: &DateTime<Tz>) -> Self {
        Self {
            trigger_id,
            dtstart: rule_start(now),
            rrule: daily_rule(fire_at),
        }
    }
}

/// Recurrence rule firing every day at `at`.
pub fn daily_rule(at: ClockTime) -> String {
    [
        ("FREQ", "DAILY".to_string()),
        ("INTERVAL", "1".to_string()),
        ("BYHOUR", at.hour.to_string()),
        ("BYMINUTE", at.minute.to_string()),
        ("BYSECOND", "0".to_string()),
    ]
    .iter()
    .map(|(key, value)| format!("{key}={value}"))
    .collect::<Vec<_>>()
    .join(";")
}

/// Rule start 24 hours before `now`.
///
/// The hub expects the local wall-clock time labelled as UTC (the official
/// web app sends it that way), so the local time is formatted with a `Z`.
pub fn rule_start<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    let one_day_ago = now.clone() - TimeDelta::hours(24);
    one_day_ago
        .naive_local()
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}
