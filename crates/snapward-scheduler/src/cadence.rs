use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc, Weekday};
use snapward_core::config::ScheduleConfig;

use crate::error::{Result, SchedulerError};
use crate::types::Cadence;

impl Cadence {
    /// Reject out-of-range values. Called by the registry before a job is stored.
    pub fn validate(&self) -> Result<()> {
        let (hour, minute) = match *self {
            Cadence::Interval { minutes } => {
                if minutes == 0 {
                    return Err(SchedulerError::InvalidCadence(
                        "interval must be at least 1 minute".into(),
                    ));
                }
                return Ok(());
            }
            Cadence::Daily { hour, minute } | Cadence::Weekly { hour, minute, .. } => {
                (hour, minute)
            }
            Cadence::Monthly { day, hour, minute } => {
                if !(1..=31).contains(&day) {
                    return Err(SchedulerError::InvalidCadence(format!(
                        "day of month {day} is outside 1-31"
                    )));
                }
                (hour, minute)
            }
        };
        if hour > 23 || minute > 59 {
            return Err(SchedulerError::InvalidCadence(format!(
                "time {hour:02}:{minute:02} is not a valid time of day"
            )));
        }
        Ok(())
    }
}

impl TryFrom<&ScheduleConfig> for Cadence {
    type Error = SchedulerError;

    fn try_from(cfg: &ScheduleConfig) -> Result<Self> {
        let at = || {
            cfg.at.as_deref().map(str::trim).ok_or_else(|| {
                SchedulerError::InvalidCadence(format!("{} schedule requires 'at'", cfg.kind))
            })
        };

        let cadence = match cfg.kind.to_ascii_lowercase().as_str() {
            "interval" => {
                let minutes = cfg.minutes.ok_or_else(|| {
                    SchedulerError::InvalidCadence("interval schedule requires 'minutes'".into())
                })?;
                Cadence::Interval { minutes }
            }
            "daily" => {
                let (hour, minute) = parse_time(at()?)?;
                Cadence::Daily { hour, minute }
            }
            "weekly" => {
                let (day, time) = split_pair(at()?)?;
                let day = parse_weekday(day)?;
                let (hour, minute) = parse_time(time)?;
                Cadence::Weekly { day, hour, minute }
            }
            "monthly" => {
                let (day, time) = split_pair(at()?)?;
                let day: u8 = day.parse().map_err(|_| {
                    SchedulerError::InvalidCadence(format!("bad day of month: {day}"))
                })?;
                let (hour, minute) = parse_time(time)?;
                Cadence::Monthly { day, hour, minute }
            }
            other => {
                return Err(SchedulerError::InvalidCadence(format!(
                    "unsupported schedule type: {other}"
                )))
            }
        };
        cadence.validate()?;
        Ok(cadence)
    }
}

fn split_pair(s: &str) -> Result<(&str, &str)> {
    let mut parts = s.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(SchedulerError::InvalidCadence(format!(
            "expected '<day> HH:MM', got '{s}'"
        ))),
    }
}

fn parse_time(s: &str) -> Result<(u8, u8)> {
    let bad = || SchedulerError::InvalidCadence(format!("expected HH:MM, got '{s}'"));
    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(bad());
    }
    let hour: u8 = h.parse().map_err(|_| bad())?;
    let minute: u8 = m.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok((hour, minute))
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    let day = match s.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => {
            return Err(SchedulerError::InvalidCadence(format!(
                "unknown weekday: {s}"
            )))
        }
    };
    Ok(day)
}

/// A job is due once its planned run time has arrived.
pub fn is_due(next_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next_run.is_some_and(|next| next <= now)
}

/// Compute the first execution time strictly *after* `from`.
///
/// Used at registration. Returns `None` only if chrono cannot build the
/// candidate instant.
pub fn compute_next_run(cadence: &Cadence, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match *cadence {
        Cadence::Interval { minutes } => Some(from + Duration::minutes(minutes as i64)),

        Cadence::Daily { hour, minute } => {
            let candidate = at_time(from.date_naive(), hour, minute)?;
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(1))
            }
        }

        Cadence::Weekly { day, hour, minute } => {
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = day.num_days_from_monday() as i64;
            let days_ahead = (target_dow - today_dow).rem_euclid(7);

            let candidate = at_time(from.date_naive() + Duration::days(days_ahead), hour, minute)?;
            if candidate > from {
                Some(candidate)
            } else {
                // same weekday, time already passed
                Some(candidate + Duration::days(7))
            }
        }

        Cadence::Monthly { day, hour, minute } => {
            let first_of_month = from.date_naive().with_day(1)?;
            for offset in 0..=1 {
                let month_start = first_of_month.checked_add_months(Months::new(offset))?;
                let date = clamp_day(month_start, day)?;
                let candidate = at_time(date, hour, minute)?;
                if candidate > from {
                    return Some(candidate);
                }
            }
            None
        }
    }
}

/// Next run after a dispatch at `now` whose planned slot was `scheduled`.
///
/// Interval jobs step forward from the planned slot so they do not drift with
/// tick latency; slots missed while a job ran are collapsed into the next one.
pub fn advance(
    cadence: &Cadence,
    scheduled: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match *cadence {
        Cadence::Interval { minutes } => {
            let step = Duration::minutes(minutes as i64);
            let mut next = scheduled + step;
            if next <= now {
                let behind = (now - next).num_seconds() / step.num_seconds();
                next += step * (behind as i32 + 1);
            }
            Some(next)
        }
        _ => compute_next_run(cadence, now),
    }
}

fn at_time(date: NaiveDate, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        date.year(),
        date.month(),
        date.day(),
        hour as u32,
        minute as u32,
        0,
    )
    .single()
}

/// `day` within the month starting at `month_start`, clamped to its last day.
fn clamp_day(month_start: NaiveDate, day: u8) -> Option<NaiveDate> {
    let next_month = month_start.checked_add_months(Months::new(1))?;
    let last_day = next_month.pred_opt()?.day();
    month_start.with_day((day as u32).min(last_day))
}
