//! Utility functions used by the load test, and available when writing tasks.

use regex::Regex;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::{self, Duration};
use url::Url;

use crate::{LoadTestError, CANCELED};

/// Default time between the start of two tasks of a virtual user, in seconds.
pub const DEFAULT_PACING: f32 = 1.0;

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use campus_load::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), 3_723);
///
/// // 45 seconds is 45 seconds.
/// assert_eq!(util::parse_timespan("45"), 45);
///
/// // Invalid value is 0 seconds.
/// assert_eq!(util::parse_timespan("foo"), 0);
/// ```
pub fn parse_timespan(time_str: &str) -> usize {
    match usize::from_str(time_str) {
        // If an integer is passed in, assume it's seconds
        Ok(t) => {
            trace!("{} is integer: {} seconds", time_str, t);
            t
        }
        // Otherwise use a regex to extract hours, minutes and seconds from string.
        Err(_) => {
            let re = match Regex::new(
                r"((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?)s)?",
            ) {
                Ok(re) => re,
                Err(e) => {
                    warn!("failed to compile timespan regex: {}", e);
                    return 0;
                }
            };
            let time_matches = match re.captures(time_str) {
                Some(time_matches) => time_matches,
                None => return 0,
            };
            let value = |name: &str| {
                time_matches
                    .name(name)
                    .and_then(|m| usize::from_str(m.as_str()).ok())
                    .unwrap_or(0)
            };
            let hours = value("hours");
            let minutes = value("minutes");
            let seconds = value("seconds");
            let total = hours * 60 * 60 + minutes * 60 + seconds;
            trace!(
                "{} hours {} minutes {} seconds: {} seconds",
                hours,
                minutes,
                seconds,
                total
            );
            total
        }
    }
}

/// Truncate strings when they're too long to display.
///
/// # Example
/// ```rust
/// use campus_load::util;
///
/// assert_eq!(util::truncate_string("this is a long string", 11), "this is a..");
/// assert_eq!(util::truncate_string("shorter string", 15), "shorter string");
/// ```
pub fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.char_indices().count() > max_length {
        match str_to_truncate.char_indices().nth(max_length.saturating_sub(2)) {
            None => str_to_truncate.to_string(),
            Some((idx, _)) => format!("{}..", &str_to_truncate[..idx]),
        }
    } else {
        str_to_truncate.to_string()
    }
}

/// Determine if a timer expired, with second granularity.
///
/// A `run_time` of 0 never expires.
///
/// # Example
/// ```rust
/// use campus_load::util;
///
/// let started = std::time::Instant::now();
/// assert!(!util::timer_expired(started, 0));
/// assert!(!util::timer_expired(started, 60));
/// ```
pub fn timer_expired(started: time::Instant, run_time: usize) -> bool {
    run_time > 0 && started.elapsed().as_secs() >= run_time as u64
}

/// Convert optional string to f32, otherwise defaulting to 1.0.
///
/// # Example
/// ```rust
/// use campus_load::util;
///
/// assert_eq!(util::get_hatch_rate(Some(".5".to_string())), 0.5);
/// assert_eq!(util::get_hatch_rate(Some("1.1.1".to_string())), 1.0);
/// assert_eq!(util::get_hatch_rate(None), 1.0);
/// ```
pub fn get_hatch_rate(hatch_rate: Option<String>) -> f32 {
    get_float_from_string(hatch_rate).unwrap_or(1.0)
}

/// Convert optional string to f32, otherwise return None.
pub fn get_float_from_string(string: Option<String>) -> Option<f32> {
    match string {
        Some(s) => match s.parse::<f32>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("failed to convert {} to float: {}", s, e);
                None
            }
        },
        None => None,
    }
}

/// Convert a number of seconds given for `option` to a [`Duration`], rejecting values
/// that are negative, not a number, or too large to represent.
///
/// # Example
/// ```rust
/// use campus_load::util;
/// use std::time::Duration;
///
/// assert_eq!(util::seconds("--timeout", 2.5).unwrap(), Duration::from_millis(2_500));
/// assert!(util::seconds("--timeout", -1.0).is_err());
/// assert!(util::seconds("--timeout", 1e30).is_err());
/// ```
pub fn seconds(option: &str, seconds: f32) -> Result<Duration, LoadTestError> {
    Duration::try_from_secs_f32(seconds).map_err(|e| LoadTestError::InvalidOption {
        option: option.to_string(),
        value: seconds.to_string(),
        detail: format!("Not a usable number of seconds: {}.", e),
    })
}

/// The pacing interval in effect for an optional number of seconds.
///
/// # Example
/// ```rust
/// use campus_load::util;
/// use std::time::Duration;
///
/// assert_eq!(util::pacing_interval(None).unwrap(), Duration::from_secs(1));
/// assert_eq!(util::pacing_interval(Some(0.25)).unwrap(), Duration::from_millis(250));
/// assert_eq!(util::pacing_interval(Some(0.0)).unwrap(), Duration::from_secs(0));
/// ```
pub fn pacing_interval(pacing: Option<f32>) -> Result<Duration, LoadTestError> {
    seconds("--pacing", pacing.unwrap_or(DEFAULT_PACING))
}

/// Time between launching two users at the given hatch rate, in users per second.
pub fn hatch_interval(hatch_rate: f32) -> Result<Duration, LoadTestError> {
    if hatch_rate.is_nan() || hatch_rate <= 0.0 {
        return Err(LoadTestError::InvalidOption {
            option: "--hatch-rate".to_string(),
            value: hatch_rate.to_string(),
            detail: "The hatch rate must be a positive number of users per second.".to_string(),
        });
    }
    seconds("--hatch-rate", 1.0 / hatch_rate)
}

/// Helper function to determine if a host can be parsed.
///
/// # Example
/// ```rust
/// use campus_load::util;
///
/// assert_eq!(util::is_valid_host("http://localhost:5001").is_ok(), true);
/// assert_eq!(util::is_valid_host("localhost:5001/").is_ok(), false);
/// ```
pub fn is_valid_host(host: &str) -> Result<Url, LoadTestError> {
    let url = Url::parse(host).map_err(|parse_error| LoadTestError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })?;
    // `localhost:5001` parses with `localhost` as the scheme.
    if !url.has_host() {
        return Err(LoadTestError::InvalidOption {
            option: "--host".to_string(),
            value: host.to_string(),
            detail: "Host must include a scheme, ie `http://localhost:5001`.".to_string(),
        });
    }
    Ok(url)
}

// Configure the control-c handler. Shutdown cleanly on the first ctrl-c, exit abruptly
// on the second.
pub(crate) fn setup_ctrlc_handler() {
    CANCELED.store(false, Ordering::SeqCst);
    match ctrlc::set_handler(move || {
        if CANCELED.swap(true, Ordering::SeqCst) {
            warn!("caught another ctrl-c, exiting immediately...");
            std::process::exit(1);
        } else {
            warn!("caught ctrl-c, stopping...");
        }
    }) {
        Ok(_) => (),
        // Only one handler can be set per process, the first one stays in place.
        Err(e) => info!("reset ctrl-c handler: {}", e),
    }
}
