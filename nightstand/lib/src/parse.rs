//! Wake-time parsing and next-occurrence computation.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike};

/// Parses a wake time string into a `NaiveTime`.
///
/// ## Supported Formats
///
/// - 12-hour format: `7:00am`, `11:30pm`
/// - 24-hour format: `19:30`, `07:00`
/// - Short 12-hour: `7am`, `11pm`
///
/// ## Errors
///
/// Returns an error string if the time cannot be parsed.
///
/// ## Examples
///
/// ```
/// use nightstand_lib::parse_alarm_time;
/// use chrono::NaiveTime;
///
/// let time = parse_alarm_time("7:00am").unwrap();
/// assert_eq!(time, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
/// ```
pub fn parse_alarm_time(value: &str) -> Result<NaiveTime, String> {
    let normalized = value.trim().to_lowercase().replace(' ', "");

    if normalized.is_empty() {
        return Err("time cannot be empty".to_string());
    }

    // chrono needs minutes, so "7am" becomes "7:00am"
    let short_form = normalized
        .strip_suffix("am")
        .or_else(|| normalized.strip_suffix("pm"))
        .filter(|hour| !hour.contains(':'))
        .map(|hour| format!("{hour}:00{}", &normalized[hour.len()..]));
    let normalized = short_form.unwrap_or(normalized);

    let formats = ["%H:%M", "%I:%M%P"];

    for format in formats {
        if let Ok(time) = NaiveTime::parse_from_str(&normalized, format) {
            return Ok(time);
        }
    }

    Err("expected time like 7:00am or 19:30".to_string())
}

/// The next moment strictly after `now` whose wall-clock time is `time`.
///
/// Seconds and sub-seconds of `time` are dropped. If today's occurrence is
/// not strictly in the future, tomorrow's is returned. Returns `None` when
/// the wall-clock time does not exist on either day (a DST gap).
///
/// ## Examples
///
/// ```
/// use chrono::{NaiveTime, TimeZone, Utc};
/// use nightstand_lib::next_trigger_at;
///
/// let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
/// let seven = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
/// let next = next_trigger_at(seven, &now).unwrap();
/// assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 7, 0, 0).unwrap());
/// ```
pub fn next_trigger_at<Tz: TimeZone>(time: NaiveTime, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0)?;
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = tz.from_local_datetime(&today.and_time(time)).earliest();
    match candidate {
        Some(candidate) if candidate > *now => Some(candidate),
        _ => {
            let tomorrow = today.checked_add_signed(ChronoDuration::days(1))?;
            tz.from_local_datetime(&tomorrow.and_time(time)).earliest()
        }
    }
}
