//! Functions and structures related to configuring a load test.
//!
//! A load test can be configured at run time by passing in the options and flags defined
//! by the [`Configuration`] structure.
//!
//! A load test can be configured programmatically with [`ConfigDefaultType::set_default`].

use gumdrop::Options;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::path::PathBuf;
use std::str::FromStr;

use crate::api::Resource;
use crate::user::Hosts;
use crate::util;
use crate::{LoadTest, LoadTestError};

/// Runtime options available when launching a load test.
///
/// Custom defaults can be programmatically set for most of these options using
/// [`ConfigDefaultType::set_default`].
///
/// Help is generated for all of these options by passing a `-h` flag, thanks to
/// [`gumdrop`](https://docs.rs/gumdrop/).
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
#[options(
    help = r#"Generates sustained, state-aware load against the courses, students and
instructors services.

The following runtime options are available when launching a load test:"#
)]
pub struct Configuration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V")]
    pub version: bool,
    /// Lists all user kinds and their tasks and exits
    #[options(short = "l", help = "Lists all user kinds and their tasks and exits\n")]
    pub list: bool,

    /// Defines host of all three services (ie http://10.21.32.33)
    #[options(short = "H")]
    pub host: String,
    /// Overrides host of the courses service
    #[options(no_short, meta = "HOST")]
    pub courses_host: String,
    /// Overrides host of the students service
    #[options(no_short, meta = "HOST")]
    pub students_host: String,
    /// Overrides host of the instructors service
    #[options(no_short, meta = "HOST", help = "Overrides host of the instructors service\n")]
    pub instructors_host: String,

    /// Sets concurrent users (default: number of CPUs)
    #[options(short = "u")]
    pub users: Option<usize>,
    /// Sets per-second user hatch rate (default: 1)
    #[options(short = "r", meta = "RATE")]
    pub hatch_rate: Option<String>,
    /// Stops load test after (30s, 20m, 3h, 1h30m, etc)
    #[options(short = "t", meta = "TIME")]
    pub run_time: String,
    /// Sets seconds from the start of one task to the next (default: 1)
    #[options(short = "p", meta = "SECONDS")]
    pub pacing: Option<f32>,
    /// Limits load test to only specified user kinds (ie courses,students)
    #[options(no_short, meta = "LIST")]
    pub user_kinds: UserKinds,
    /// Sets per-request timeout, in seconds (default: none)
    #[options(no_short, meta = "SECONDS")]
    pub timeout: Option<f32>,
    /// Generates birth dates in the past instead of the near future
    #[options(no_short)]
    pub past_birth_dates: bool,
    /// Disables validation of https certificates
    #[options(no_short, help = "Disables validation of https certificates\n")]
    pub accept_invalid_certs: bool,

    /// Enables log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub log_file: String,
    /// Increases log file verbosity (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases output verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases output verbosity (-v, -vv, etc)
    #[options(count, short = "v", help = "Increases output verbosity (-v, -vv, etc)\n")]
    pub verbose: u8,

    /// Doesn't track metrics
    #[options(no_short)]
    pub no_metrics: bool,
    /// Doesn't track status code metrics
    #[options(no_short)]
    pub no_status_codes: bool,
}

/// The user kinds a load test is limited to, parsed from a comma separated list.
///
/// Each entry is matched against the start of every registered kind's machine name,
/// so `course` and `courses` both select the `Courses` kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserKinds {
    pub active: Vec<String>,
}
impl FromStr for UserKinds {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut active = Vec::new();
        for entry in s.split(',') {
            let machine_name: String = entry
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if machine_name.is_empty() {
                if !entry.trim().is_empty() {
                    return Err(LoadTestError::InvalidOption {
                        option: "--user-kinds".to_string(),
                        value: s.to_string(),
                        detail: format!("invalid user kind: {}", entry),
                    });
                }
                continue;
            }
            if !active.contains(&machine_name) {
                active.push(machine_name);
            }
        }
        Ok(UserKinds { active })
    }
}
impl UserKinds {
    /// Whether a kind with the given machine name should run. Everything runs if no
    /// kinds were selected.
    pub fn matches(&self, machine_name: &str) -> bool {
        self.active.is_empty()
            || self
                .active
                .iter()
                .any(|entry| machine_name.starts_with(entry.as_str()))
    }
}

/// Optional default values for configuration options, set with
/// [`ConfigDefaultType::set_default`].
#[derive(Clone, Debug, Default)]
pub(crate) struct ConfigDefaults {
    pub host: Option<String>,
    pub courses_host: Option<String>,
    pub students_host: Option<String>,
    pub instructors_host: Option<String>,
    pub users: Option<usize>,
    pub hatch_rate: Option<String>,
    pub run_time: Option<usize>,
    pub pacing: Option<f32>,
    pub user_kinds: Option<UserKinds>,
    pub timeout: Option<f32>,
    pub past_birth_dates: Option<bool>,
    pub accept_invalid_certs: Option<bool>,
    pub log_file: Option<String>,
    pub log_level: Option<u8>,
    pub quiet: Option<u8>,
    pub verbose: Option<u8>,
    pub no_metrics: Option<bool>,
    pub no_status_codes: Option<bool>,
}

/// All [`Configuration`] options that can be programmatically configured with a custom
/// default.
#[derive(Debug)]
pub enum ConfigDefault {
    /// Host of all three services.
    Host,
    CoursesHost,
    StudentsHost,
    InstructorsHost,
    /// Number of users to simulate.
    Users,
    /// Number of users to start per second.
    HatchRate,
    /// Number of seconds for the load test to run.
    RunTime,
    /// Seconds from the start of one task to the next.
    Pacing,
    /// Comma separated list of user kinds to run.
    UserKinds,
    /// Per-request timeout, in seconds.
    Timeout,
    PastBirthDates,
    AcceptInvalidCerts,
    /// Log file name.
    LogFile,
    LogLevel,
    Quiet,
    Verbose,
    NoMetrics,
    NoStatusCodes,
}

/// Most run-time options can be programmatically configured with custom defaults, used
/// only when the option isn't set on the command line.
///
/// The following options take a borrowed string slice ([`&str`]):
///  - [`ConfigDefault::Host`], [`ConfigDefault::CoursesHost`],
///    [`ConfigDefault::StudentsHost`], [`ConfigDefault::InstructorsHost`]
///  - [`ConfigDefault::HatchRate`], [`ConfigDefault::Pacing`], [`ConfigDefault::Timeout`]
///  - [`ConfigDefault::UserKinds`], [`ConfigDefault::LogFile`]
///
/// The following take a [`usize`]:
///  - [`ConfigDefault::Users`], [`ConfigDefault::RunTime`], [`ConfigDefault::LogLevel`],
///    [`ConfigDefault::Quiet`], [`ConfigDefault::Verbose`]
///
/// The following flags take a [`bool`]:
///  - [`ConfigDefault::PastBirthDates`], [`ConfigDefault::AcceptInvalidCerts`],
///    [`ConfigDefault::NoMetrics`], [`ConfigDefault::NoStatusCodes`]
///
/// # Example
/// ```rust
/// use campus_load::prelude::*;
///
/// fn main() -> Result<(), LoadTestError> {
///     LoadTest::initialize_with_config(Configuration::default())?
///         .set_default(ConfigDefault::CoursesHost, "http://localhost:5001")?
///         .set_default(ConfigDefault::RunTime, 30)?
///         .set_default(ConfigDefault::NoStatusCodes, true)?;
///
///     Ok(())
/// }
/// ```
pub trait ConfigDefaultType<T> {
    /// Sets a [`ConfigDefault`] to the provided value.
    fn set_default(self, key: ConfigDefault, value: T) -> Result<Box<Self>, LoadTestError>;
}
impl ConfigDefaultType<&str> for LoadTest {
    fn set_default(mut self, key: ConfigDefault, value: &str) -> Result<Box<Self>, LoadTestError> {
        let float = |option: &ConfigDefault| {
            value
                .parse::<f32>()
                .map_err(|e| LoadTestError::InvalidOption {
                    option: format!("ConfigDefault::{:?}", option),
                    value: value.to_string(),
                    detail: format!("expected a number of seconds: {}", e),
                })
        };
        match key {
            ConfigDefault::Host => self.defaults.host = non_empty(value),
            ConfigDefault::CoursesHost => self.defaults.courses_host = non_empty(value),
            ConfigDefault::StudentsHost => self.defaults.students_host = non_empty(value),
            ConfigDefault::InstructorsHost => self.defaults.instructors_host = non_empty(value),
            ConfigDefault::HatchRate => self.defaults.hatch_rate = Some(value.to_string()),
            ConfigDefault::Pacing => self.defaults.pacing = Some(float(&key)?),
            ConfigDefault::Timeout => self.defaults.timeout = Some(float(&key)?),
            ConfigDefault::UserKinds => self.defaults.user_kinds = Some(value.parse()?),
            ConfigDefault::LogFile => self.defaults.log_file = non_empty(value),
            // Otherwise display a helpful and explicit error.
            ConfigDefault::Users
            | ConfigDefault::RunTime
            | ConfigDefault::LogLevel
            | ConfigDefault::Quiet
            | ConfigDefault::Verbose => return Err(wrong_type(&key, value, "usize", "&str")),
            ConfigDefault::PastBirthDates
            | ConfigDefault::AcceptInvalidCerts
            | ConfigDefault::NoMetrics
            | ConfigDefault::NoStatusCodes => return Err(wrong_type(&key, value, "bool", "&str")),
        }
        Ok(Box::new(self))
    }
}
impl ConfigDefaultType<usize> for LoadTest {
    fn set_default(mut self, key: ConfigDefault, value: usize) -> Result<Box<Self>, LoadTestError> {
        match key {
            ConfigDefault::Users => self.defaults.users = Some(value),
            ConfigDefault::RunTime => self.defaults.run_time = Some(value),
            ConfigDefault::LogLevel => self.defaults.log_level = Some(value as u8),
            ConfigDefault::Quiet => self.defaults.quiet = Some(value as u8),
            ConfigDefault::Verbose => self.defaults.verbose = Some(value as u8),
            ConfigDefault::Host
            | ConfigDefault::CoursesHost
            | ConfigDefault::StudentsHost
            | ConfigDefault::InstructorsHost
            | ConfigDefault::HatchRate
            | ConfigDefault::Pacing
            | ConfigDefault::Timeout
            | ConfigDefault::UserKinds
            | ConfigDefault::LogFile => {
                return Err(wrong_type(&key, &value.to_string(), "&str", "usize"))
            }
            ConfigDefault::PastBirthDates
            | ConfigDefault::AcceptInvalidCerts
            | ConfigDefault::NoMetrics
            | ConfigDefault::NoStatusCodes => {
                return Err(wrong_type(&key, &value.to_string(), "bool", "usize"))
            }
        }
        Ok(Box::new(self))
    }
}
impl ConfigDefaultType<bool> for LoadTest {
    fn set_default(mut self, key: ConfigDefault, value: bool) -> Result<Box<Self>, LoadTestError> {
        match key {
            ConfigDefault::PastBirthDates => self.defaults.past_birth_dates = Some(value),
            ConfigDefault::AcceptInvalidCerts => self.defaults.accept_invalid_certs = Some(value),
            ConfigDefault::NoMetrics => self.defaults.no_metrics = Some(value),
            ConfigDefault::NoStatusCodes => self.defaults.no_status_codes = Some(value),
            ConfigDefault::Users
            | ConfigDefault::RunTime
            | ConfigDefault::LogLevel
            | ConfigDefault::Quiet
            | ConfigDefault::Verbose => {
                return Err(wrong_type(&key, &value.to_string(), "usize", "bool"))
            }
            ConfigDefault::Host
            | ConfigDefault::CoursesHost
            | ConfigDefault::StudentsHost
            | ConfigDefault::InstructorsHost
            | ConfigDefault::HatchRate
            | ConfigDefault::Pacing
            | ConfigDefault::Timeout
            | ConfigDefault::UserKinds
            | ConfigDefault::LogFile => {
                return Err(wrong_type(&key, &value.to_string(), "&str", "bool"))
            }
        }
        Ok(Box::new(self))
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn wrong_type(key: &ConfigDefault, value: &str, expected: &str, received: &str) -> LoadTestError {
    LoadTestError::InvalidOption {
        option: format!("ConfigDefault::{:?}", key),
        value: value.to_string(),
        detail: format!(
            "set_default(ConfigDefault::{:?}, {}) expected {} value, received {}",
            key, value, expected, received
        ),
    }
}

impl Configuration {
    /// Fill in every option not set on the command line from the programmatic defaults.
    pub(crate) fn apply_defaults(&mut self, defaults: &ConfigDefaults) {
        fn string(value: &mut String, default: &Option<String>) {
            if value.is_empty() {
                if let Some(default) = default {
                    *value = default.clone();
                }
            }
        }
        fn flag(value: &mut bool, default: Option<bool>) {
            if !*value {
                *value = default.unwrap_or(false);
            }
        }
        fn count(value: &mut u8, default: Option<u8>) {
            if *value == 0 {
                *value = default.unwrap_or(0);
            }
        }

        string(&mut self.host, &defaults.host);
        string(&mut self.courses_host, &defaults.courses_host);
        string(&mut self.students_host, &defaults.students_host);
        string(&mut self.instructors_host, &defaults.instructors_host);
        string(&mut self.log_file, &defaults.log_file);
        if self.run_time.is_empty() {
            if let Some(run_time) = defaults.run_time {
                self.run_time = run_time.to_string();
            }
        }
        self.users = self.users.or(defaults.users);
        self.hatch_rate = self.hatch_rate.take().or_else(|| defaults.hatch_rate.clone());
        self.pacing = self.pacing.or(defaults.pacing);
        self.timeout = self.timeout.or(defaults.timeout);
        if self.user_kinds.active.is_empty() {
            if let Some(user_kinds) = &defaults.user_kinds {
                self.user_kinds = user_kinds.clone();
            }
        }
        flag(&mut self.past_birth_dates, defaults.past_birth_dates);
        flag(&mut self.accept_invalid_certs, defaults.accept_invalid_certs);
        flag(&mut self.no_metrics, defaults.no_metrics);
        flag(&mut self.no_status_codes, defaults.no_status_codes);
        count(&mut self.log_level, defaults.log_level);
        count(&mut self.quiet, defaults.quiet);
        count(&mut self.verbose, defaults.verbose);
    }

    /// Number of users to launch, defaulting to the number of available CPUs.
    pub fn total_users(&self) -> usize {
        self.users.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|cpus| cpus.get())
                .unwrap_or(1)
        })
    }

    /// Number of seconds to run, or 0 to run until canceled.
    pub fn run_time_seconds(&self) -> usize {
        util::parse_timespan(&self.run_time)
    }

    /// Resolve the base URL of each service: a per-service host if set, otherwise
    /// `--host`.
    pub fn hosts(&self) -> Result<Hosts, LoadTestError> {
        let resolve = |resource: Resource, specific: &str| {
            let host: &str = if specific.is_empty() {
                &self.host
            } else {
                specific
            };
            if host.is_empty() {
                return Err(LoadTestError::InvalidOption {
                    option: format!("--{}-host", resource),
                    value: "".to_string(),
                    detail: format!(
                        "A host must be defined for {} via --host or --{}-host.",
                        resource, resource
                    ),
                });
            }
            util::is_valid_host(host)
        };
        Ok(Hosts {
            courses: resolve(Resource::Courses, &self.courses_host)?,
            students: resolve(Resource::Students, &self.students_host)?,
            instructors: resolve(Resource::Instructors, &self.instructors_host)?,
        })
    }

    /// Validate the configuration, after defaults have been applied.
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.users == Some(0) {
            return Err(LoadTestError::InvalidOption {
                option: "--users".to_string(),
                value: "0".to_string(),
                detail: "At least one user must be launched.".to_string(),
            });
        }

        if let Some(hatch_rate) = &self.hatch_rate {
            match util::get_float_from_string(Some(hatch_rate.clone())) {
                Some(rate) if rate > 0.0 && rate.is_finite() => {
                    util::hatch_interval(rate)?;
                }
                _ => {
                    return Err(LoadTestError::InvalidOption {
                        option: "--hatch-rate".to_string(),
                        value: hatch_rate.clone(),
                        detail: "The hatch rate must be a positive number of users per second."
                            .to_string(),
                    })
                }
            }
        }

        if let Some(pacing) = self.pacing {
            if !pacing.is_finite() || pacing < 0.0 {
                return Err(LoadTestError::InvalidOption {
                    option: "--pacing".to_string(),
                    value: pacing.to_string(),
                    detail: "Pacing must be zero or a positive number of seconds.".to_string(),
                });
            }
            util::pacing_interval(Some(pacing))?;
        }

        if let Some(timeout) = self.timeout {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(LoadTestError::InvalidOption {
                    option: "--timeout".to_string(),
                    value: timeout.to_string(),
                    detail: "The timeout must be a positive number of seconds.".to_string(),
                });
            }
            util::seconds("--timeout", timeout)?;
        }

        if self.quiet > 0 && self.verbose > 0 {
            return Err(LoadTestError::InvalidOption {
                option: "--quiet".to_string(),
                value: self.quiet.to_string(),
                detail: "--quiet and --verbose are mutually exclusive.".to_string(),
            });
        }

        self.hosts()?;
        Ok(())
    }

    /// Optionally initialize the logger which writes to standard out and/or to a
    /// configurable log file.
    pub(crate) fn initialize_logger(&self) {
        // Configure debug output level.
        let debug_level = match self.verbose {
            0 => match self.quiet {
                0 => LevelFilter::Info,
                _ => LevelFilter::Warn,
            },
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Configure log file level.
        let log_level = match self.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let log_file: Option<PathBuf> = if !self.log_file.is_empty() {
            Some(PathBuf::from(&self.log_file))
        } else {
            None
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![SimpleLogger::new(debug_level, Config::default())];
        if let Some(log_to_file) = &log_file {
            match std::fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => eprintln!("failed to create log file {}: {}", log_to_file.display(), e),
            }
        }
        if let Err(e) = CombinedLogger::init(loggers) {
            info!("failed to initialize CombinedLogger: {}", e);
        }
        if let Some(log_to_file) = log_file {
            info!("Writing to log file: {}", log_to_file.display());
        }

        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}
