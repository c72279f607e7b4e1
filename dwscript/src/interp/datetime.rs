//! TDateTime arithmetic
//!
//! A date/time is a Float counting days since 1899-12-30; the fractional
//! part is the time of day.

use super::error::{InterpResult, RuntimeError};
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MS_PER_DAY: f64 = 86_400_000.0;

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

pub fn from_naive(dt: NaiveDateTime) -> f64 {
    let delta = dt - epoch();
    delta.num_milliseconds() as f64 / MS_PER_DAY
}

pub fn to_naive(value: f64) -> InterpResult<NaiveDateTime> {
    if !value.is_finite() {
        return Err(RuntimeError::conversion(format!("invalid date/time value {value}")));
    }
    let ms = (value * MS_PER_DAY).round() as i64;
    epoch()
        .checked_add_signed(Duration::milliseconds(ms))
        .ok_or_else(|| RuntimeError::conversion(format!("date/time value {value} out of range")))
}

pub fn now() -> f64 {
    from_naive(Local::now().naive_local())
}

pub fn encode_date(year: i64, month: i64, day: i64) -> InterpResult<f64> {
    let date = i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| {
            RuntimeError::conversion(format!("invalid date {year}-{month:02}-{day:02}"))
        })?;
    Ok(from_naive(date.and_time(NaiveTime::MIN)))
}

pub fn encode_time(hour: i64, min: i64, sec: i64, ms: i64) -> InterpResult<f64> {
    let valid = (0..24).contains(&hour)
        && (0..60).contains(&min)
        && (0..60).contains(&sec)
        && (0..1000).contains(&ms);
    if !valid {
        return Err(RuntimeError::conversion(format!(
            "invalid time {hour:02}:{min:02}:{sec:02}.{ms:03}"
        )));
    }
    let total_ms = ((hour * 60 + min) * 60 + sec) * 1000 + ms;
    Ok(total_ms as f64 / MS_PER_DAY)
}

/// (year, month, day)
pub fn decode_date(value: f64) -> InterpResult<(i64, i64, i64)> {
    let dt = to_naive(value)?;
    Ok((
        i64::from(dt.year()),
        i64::from(dt.month()),
        i64::from(dt.day()),
    ))
}

/// (hour, minute, second, millisecond)
pub fn decode_time(value: f64) -> InterpResult<(i64, i64, i64, i64)> {
    let dt = to_naive(value)?;
    Ok((
        i64::from(dt.hour()),
        i64::from(dt.minute()),
        i64::from(dt.second()),
        i64::from(dt.nanosecond() / 1_000_000),
    ))
}
