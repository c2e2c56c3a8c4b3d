//! Clock times embedded in free-form text.
//!
//! A clock time is `hour:minute` with an optional `am`/`pm` suffix. It only
//! counts when it is a token of its own: the characters around it must not
//! be word characters or colons, so `12:345`, `1:2:3` and `x7:30` are all
//! ignored.

use crate::error::AppError;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A time of day in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(Self { hour, minute })
    }

    /// Hours since midnight, including the minute fraction.
    pub fn fractional_hours(self) -> f64 {
        f64::from(self.hour) + f64::from(self.minute) / 60.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// One clock time found in the text, along with the text it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockMatch {
    pub text: String,
    pub time: ClockTime,
}

/// The sleep start and end found in the user's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepTimes {
    pub start: ClockMatch,
    pub end: ClockMatch,
}

// ASCII only: `é` separates tokens just like a space does.
fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_:]+").expect("valid token regex"))
}

fn clock_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^([0-9]{1,2}):([0-9]{1,2})(am|pm)?$").expect("valid clock regex")
    })
}

/// Find exactly two clock times in `text`, in order of appearance.
///
/// `source` names where the text came from and only appears in the error.
pub fn extract_sleep_times(text: &str, source: &str) -> Result<SleepTimes, AppError> {
    let candidates: Vec<_> = token_regex()
        .find_iter(text)
        .filter_map(|token| {
            clock_regex()
                .captures(token.as_str())
                .map(|caps| (token.as_str(), caps))
        })
        .collect();

    let wrong_count = || {
        AppError::Input(format!(
            "Couldn't find exactly two clock times in the {source}."
        ))
    };
    if candidates.len() != 2 {
        return Err(wrong_count());
    }

    let matches = candidates
        .into_iter()
        .map(|(token, caps)| {
            let hour: u8 = caps[1].parse().map_err(|_| invalid_clock_time())?;
            let minute: u8 = caps[2].parse().map_err(|_| invalid_clock_time())?;
            let meridiem = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());
            let time = to_24_hour(hour, minute, meridiem.as_deref())?;
            Ok(ClockMatch {
                text: token.to_string(),
                time,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let [start, end] = <[ClockMatch; 2]>::try_from(matches).map_err(|_| wrong_count())?;
    Ok(SleepTimes { start, end })
}

fn to_24_hour(hour: u8, minute: u8, meridiem: Option<&str>) -> Result<ClockTime, AppError> {
    if minute > 59 {
        return Err(invalid_clock_time());
    }

    let hour = match meridiem {
        None if hour <= 23 => hour,
        Some(_) if !(1..=12).contains(&hour) => return Err(invalid_clock_time()),
        Some("am") => hour % 12,
        Some(_) => hour % 12 + 12,
        None => return Err(invalid_clock_time()),
    };

    ClockTime::new(hour, minute).ok_or_else(invalid_clock_time)
}

fn invalid_clock_time() -> AppError {
    AppError::Input("Invalid clock time.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(text: &str) -> (ClockTime, ClockTime) {
        let found = extract_sleep_times(text, "input").unwrap();
        (found.start.time, found.end.time)
    }

    fn ct(hour: u8, minute: u8) -> ClockTime {
        ClockTime::new(hour, minute).unwrap()
    }

    #[test]
    fn test_two_24_hour_times_in_order() {
        assert_eq!(times("23:00 - 7:05"), (ct(23, 0), ct(7, 5)));
    }

    #[test]
    fn test_embedded_in_other_text() {
        let found = extract_sleep_times("Slept from 11:30PM until 6:45am, woke once.", "clipboard")
            .unwrap();
        assert_eq!(found.start.text, "11:30PM");
        assert_eq!(found.end.text, "6:45am");
        assert_eq!(found.start.time, ct(23, 30));
        assert_eq!(found.end.time, ct(6, 45));
    }

    #[test]
    fn test_meridiem_conversion() {
        assert_eq!(times("12:10am 12:10pm"), (ct(0, 10), ct(12, 10)));
        assert_eq!(times("1:00pm 11:59AM"), (ct(13, 0), ct(11, 59)));
    }

    #[test]
    fn test_wrong_count_is_input_error() {
        for text in ["", "no times here", "only 7:00", "1:00 2:00 3:00"] {
            let err = extract_sleep_times(text, "input").unwrap_err();
            assert!(matches!(err, AppError::Input(_)), "{text:?}");
            assert!(err.to_string().contains("exactly two clock times in the input"));
        }
    }

    #[test]
    fn test_tokens_touching_word_chars_or_colons_ignored() {
        // Only the free-standing times count.
        assert_eq!(
            times("12:345 x7:30 1:2:3 7:30amx 22:15, 06:00"),
            (ct(22, 15), ct(6, 0))
        );
        assert_eq!(times("(23:00)-[07:00]"), (ct(23, 0), ct(7, 0)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        for text in ["23:60 7:00", "24:00 7:00", "0:30am 7:00", "13:00pm 7:00"] {
            let err = extract_sleep_times(text, "input").unwrap_err();
            assert_eq!(err.to_string(), "Invalid clock time.", "{text:?}");
        }
    }

    #[test]
    fn test_display_pads() {
        assert_eq!(ct(7, 5).to_string(), "07:05");
    }
}
