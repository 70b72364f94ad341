//! # campus-load
//!
//! Generates sustained, state-aware HTTP load against a courses, students and
//! instructors CRUD API.
//!
//! A load test launches a population of [`VirtualUser`](./user/struct.VirtualUser.html)s.
//! Each user is assigned a [`UserKind`](./task/struct.UserKind.html), runs the kind's
//! `on_start` tasks to load what the remote services already hold into shared
//! [`Registries`](./registry/struct.Registries.html), then runs the kind's other tasks,
//! picked uniformly at random, at a constant pace until the load test stops.
//!
//! Tasks use the registries to build valid requests: they enroll known students into
//! known courses, delete courses that exist, and so on. Every successful create, delete
//! and membership change is reflected back into the registries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use campus_load::prelude::*;
//!
//! fn main() -> Result<(), LoadTestError> {
//!     LoadTest::initialize()?
//!         .register_user_kind(course_user())
//!         .register_user_kind(student_user())
//!         .register_user_kind(instructor_user())
//!         .set_default(ConfigDefault::Host, "http://localhost:5001")?
//!         .execute()?;
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

#[macro_use]
pub mod task;
pub mod api;
pub mod config;
pub mod metrics;
pub mod payload;
pub mod prelude;
pub mod registry;
pub mod tasks;
pub mod user;
pub mod util;

use futures::future::join_all;
use gumdrop::Options;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{self, Duration};
use std::{fmt, io};

use crate::config::{ConfigDefaults, Configuration};
use crate::metrics::{LoadTestMetrics, TaskMetric};
use crate::payload::{PersonFaker, WordListFaker};
use crate::registry::Registries;
use crate::task::UserKind;
use crate::user::{UserCommand, VirtualUser};

/// Set by the ctrl-c handler, checked while launching and running users.
pub(crate) static CANCELED: AtomicBool = AtomicBool::new(false);

// How often the load test wakes to collect metrics and check whether to stop.
const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// An enumeration of all errors a [`LoadTest`] can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a ['tokio::task::JoinError'](https://tokio-rs.github.io/tokio/doc/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// [`LoadTest`] has no [`UserKind`](./task/struct.UserKind.html) to run.
    NoUserKinds {
        /// An optional explanation of the error.
        detail: String,
    },
}
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::TokioJoin(_) => "tokio::task::JoinError",
            LoadTestError::InvalidHost { .. } => "failed to parse hostname",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::NoUserKinds { .. } => "no user kinds defined",
        }
    }
}

impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::TokioJoin(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidHost {
                ref host,
                ref parse_error,
                ..
            } => write!(
                f,
                "LoadTestError: {} ({}: {})",
                self.describe(),
                host,
                parse_error
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref detail,
                ..
            } => write!(f, "LoadTestError: {} ({}: {})", self.describe(), option, detail),
            LoadTestError::NoUserKinds { ref detail } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), detail)
            }
        }
    }
}

impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::TokioJoin(ref source) => Some(source),
            LoadTestError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> LoadTestError {
        LoadTestError::TokioJoin(err)
    }
}

/// The phases a load test moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttackPhase {
    /// Configured but not yet executing.
    Idle,
    /// Launching virtual users at the hatch rate.
    Starting,
    /// All users are launched and running tasks.
    Running,
    /// Users are being told to exit.
    Stopping,
    /// All users have exited.
    Shutdown,
}

/// Internal global run state for the load test.
pub struct LoadTest {
    /// All registered user kinds, indexed by `UserKind.kinds_index`.
    user_kinds: Vec<UserKind>,
    /// Programmatic defaults, applied to options not set on the command line.
    pub(crate) defaults: ConfigDefaults,
    configuration: Configuration,
    /// Registries shared by every virtual user.
    registries: Arc<Registries>,
    faker: Arc<dyn PersonFaker>,
    attack_phase: AttackPhase,
    metrics: LoadTestMetrics,
}
impl LoadTest {
    /// Load configuration from the command line and initialize a load test.
    pub fn initialize() -> Result<LoadTest, LoadTestError> {
        LoadTest::initialize_with_config(Configuration::parse_args_default_or_exit())
    }

    /// Initialize a load test with an already loaded configuration.
    pub fn initialize_with_config(configuration: Configuration) -> Result<LoadTest, LoadTestError> {
        Ok(LoadTest {
            user_kinds: Vec::new(),
            defaults: ConfigDefaults::default(),
            configuration,
            registries: Arc::new(Registries::new()),
            faker: Arc::new(WordListFaker),
            attack_phase: AttackPhase::Idle,
            metrics: LoadTestMetrics::default(),
        })
    }

    /// Register a user kind. Users are allocated across the registered kinds
    /// round-robin, in registration order.
    pub fn register_user_kind(mut self, mut kind: UserKind) -> Self {
        kind.kinds_index = self.user_kinds.len();
        self.user_kinds.push(kind);
        self
    }

    /// Replace the source of names, emails and phone numbers used for new people.
    pub fn set_faker<F: PersonFaker + 'static>(mut self, faker: F) -> Self {
        self.faker = Arc::new(faker);
        self
    }

    /// The registries shared by the users of this load test, available after it runs.
    pub fn registries(&self) -> Arc<Registries> {
        Arc::clone(&self.registries)
    }

    fn set_attack_phase(&mut self, phase: AttackPhase) {
        if self.attack_phase != phase {
            info!("entering {:?} phase", phase);
            self.attack_phase = phase;
        }
    }

    // Print the registered user kinds and their tasks.
    fn print_user_kinds(&self) {
        println!("Available user kinds:");
        for kind in &self.user_kinds {
            println!(" - {}: ({})", kind.name, kind.machine_name);
            for task in &kind.tasks {
                let on_start = if task.on_start { " (on start)" } else { "" };
                println!("    o {}{}", task.name, on_start);
            }
        }
    }

    // Indexes of the kinds selected with `--user-kinds`.
    fn active_user_kinds(&self) -> Result<Vec<usize>, LoadTestError> {
        let selected = &self.configuration.user_kinds;
        for entry in &selected.active {
            if !self
                .user_kinds
                .iter()
                .any(|kind| kind.machine_name.starts_with(entry.as_str()))
            {
                return Err(LoadTestError::InvalidOption {
                    option: "--user-kinds".to_string(),
                    value: entry.clone(),
                    detail: format!("no user kind matches {}", entry),
                });
            }
        }
        Ok(self
            .user_kinds
            .iter()
            .filter(|kind| selected.matches(&kind.machine_name))
            .map(|kind| kind.kinds_index)
            .collect())
    }

    /// Run the load test until `--run-time` expires or ctrl-c is pressed, then return
    /// the collected metrics.
    pub fn execute(mut self) -> Result<LoadTestMetrics, LoadTestError> {
        if self.configuration.version {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            return Ok(LoadTestMetrics::default());
        }
        if self.user_kinds.is_empty() {
            return Err(LoadTestError::NoUserKinds {
                detail: "No user kinds are defined.".to_string(),
            });
        }
        if self.configuration.list {
            self.print_user_kinds();
            return Ok(LoadTestMetrics::default());
        }

        let defaults = self.defaults.clone();
        self.configuration.apply_defaults(&defaults);
        self.configuration.initialize_logger();
        self.configuration.validate()?;

        let active = self.active_user_kinds()?;
        let allocation = allocate_users(self.configuration.total_users(), &active);

        if !self.configuration.no_metrics {
            self.metrics
                .initialize_task_metrics(&self.user_kinds, !self.configuration.no_status_codes);
        }
        self.metrics.users = allocation.len();

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let metrics = rt.block_on(self.start_attack(allocation))?;

        if !self.configuration.no_metrics {
            metrics.print();
        }
        Ok(metrics)
    }

    async fn start_attack(
        &mut self,
        allocation: Vec<usize>,
    ) -> Result<LoadTestMetrics, LoadTestError> {
        util::setup_ctrlc_handler();
        let hosts = self.configuration.hosts()?;
        let hatch_rate = util::get_hatch_rate(self.configuration.hatch_rate.clone());
        let hatch_interval = util::hatch_interval(hatch_rate)?;
        let run_time = self.configuration.run_time_seconds();

        let (metrics_tx, metrics_rx) = flume::unbounded::<TaskMetric>();
        let mut users = Vec::with_capacity(allocation.len());
        let mut user_channels = Vec::with_capacity(allocation.len());

        self.metrics.started = Some(chrono::Local::now());
        let started = time::Instant::now();

        self.set_attack_phase(AttackPhase::Starting);
        info!(
            "launching {} users at {} per second...",
            allocation.len(),
            hatch_rate
        );
        for (index, kinds_index) in allocation.iter().enumerate() {
            if CANCELED.load(Ordering::SeqCst) {
                break;
            }
            let number = index + 1;
            let mut user = VirtualUser::new(
                number,
                *kinds_index,
                hosts.clone(),
                Arc::clone(&self.registries),
                &self.configuration,
            )?;
            user.faker = Arc::clone(&self.faker);
            user.metrics_channel = Some(metrics_tx.clone());

            let (user_tx, user_rx) = flume::unbounded();
            let kind = self.user_kinds[*kinds_index].clone();
            users.push(tokio::spawn(user::user_main(number, kind, user, user_rx)));
            user_channels.push(user_tx);

            if number < allocation.len() {
                self.wait(hatch_interval, &metrics_rx).await;
            }
        }
        // Only users hold senders now, so the channel closes once they all exit.
        drop(metrics_tx);

        self.set_attack_phase(AttackPhase::Running);
        let running = time::Instant::now();
        while !CANCELED.load(Ordering::SeqCst) && !util::timer_expired(running, run_time) {
            self.collect_metrics(&metrics_rx);
            tokio::time::sleep(MONITOR_INTERVAL).await;
        }

        self.set_attack_phase(AttackPhase::Stopping);
        for user_tx in &user_channels {
            // A user that already exited has dropped its receiver.
            let _ = user_tx.send(UserCommand::Exit);
        }
        for result in join_all(users).await {
            if let Err(e) = result {
                warn!("user exited abnormally: {}", e);
            }
        }
        self.collect_metrics(&metrics_rx);

        self.set_attack_phase(AttackPhase::Shutdown);
        self.metrics.duration = started.elapsed().as_secs() as usize;
        info!(
            "stopped after {} seconds: {} courses, {} students, {} instructors known",
            self.metrics.duration,
            self.registries.courses.len(),
            self.registries.students.len(),
            self.registries.instructors.len()
        );
        Ok(self.metrics.clone())
    }

    // Sleep while launching users, collecting metrics and waking early if canceled.
    async fn wait(&mut self, duration: Duration, metrics_rx: &flume::Receiver<TaskMetric>) {
        let started = time::Instant::now();
        while !CANCELED.load(Ordering::SeqCst) {
            self.collect_metrics(metrics_rx);
            let remaining = duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(remaining.min(MONITOR_INTERVAL)).await;
        }
    }

    fn collect_metrics(&mut self, metrics_rx: &flume::Receiver<TaskMetric>) {
        for metric in metrics_rx.try_iter() {
            if !self.configuration.no_metrics {
                self.metrics.record_task(&metric);
            }
        }
    }
}

/// Allocate `users` users across the given kinds round-robin, returning the kind index
/// of each user in launch order.
pub(crate) fn allocate_users(users: usize, kinds: &[usize]) -> Vec<usize> {
    if kinds.is_empty() {
        return Vec::new();
    }
    (0..users).map(|user| kinds[user % kinds.len()]).collect()
}
