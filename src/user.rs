use rand::Rng;
use reqwest::{Client, Response};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{self, Duration};
use url::Url;

use crate::api::Resource;
use crate::config::Configuration;
use crate::metrics::TaskMetric;
use crate::payload::{BirthDates, PersonFaker, WordListFaker};
use crate::registry::Registries;
use crate::task::{Task, TaskError, UserKind};
use crate::{util, LoadTestError};

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// Never sleep more than 500 milliseconds, so a pacing user notices quickly that the load
// test is shutting down.
const MAXIMUM_SLEEP: Duration = Duration::from_millis(500);

/// Commands sent from the load test to its virtual users.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    /// Stop running tasks and exit.
    Exit,
}

/// Base URL of each remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct Hosts {
    pub courses: Url,
    pub students: Url,
    pub instructors: Url,
}
impl Hosts {
    /// All three resources served from the same base URL.
    pub fn single(base_url: Url) -> Self {
        Hosts {
            courses: base_url.clone(),
            students: base_url.clone(),
            instructors: base_url,
        }
    }

    /// Base URL requests for the given resource are sent to.
    pub fn base_url(&self, resource: Resource) -> &Url {
        match resource {
            Resource::Courses => &self.courses,
            Resource::Students => &self.students,
            Resource::Instructors => &self.instructors,
        }
    }
}

/// One simulated client, repeatedly running the tasks of its [`UserKind`].
///
/// Each virtual user owns its own HTTP session (connection pool and cookie store) and
/// shares the entity registries with every other user of the load test.
pub struct VirtualUser {
    /// When the user was created, used to timestamp metrics.
    pub started: time::Instant,
    /// The user's number, starting at 1.
    pub number: usize,
    /// An index into `LoadTest.user_kinds`, indicating which kind of user this is.
    pub kinds_index: usize,
    /// A [`reqwest::Client`] holding this user's session.
    pub client: Client,
    pub hosts: Hosts,
    /// Registries shared by every user of the load test.
    pub registries: Arc<Registries>,
    pub faker: Arc<dyn PersonFaker>,
    pub birth_dates: BirthDates,
    /// Target time from the start of one task to the start of the next.
    pub pacing: Duration,
    /// A local copy of the load test configuration.
    pub config: Configuration,
    pub(crate) metrics_channel: Option<flume::Sender<TaskMetric>>,
}
impl VirtualUser {
    /// Create a new virtual user with its own session.
    pub fn new(
        number: usize,
        kinds_index: usize,
        hosts: Hosts,
        registries: Arc<Registries>,
        configuration: &Configuration,
    ) -> Result<Self, LoadTestError> {
        trace!("new user {}", number);
        let mut builder = Client::builder()
            .user_agent(APP_USER_AGENT)
            .danger_accept_invalid_certs(configuration.accept_invalid_certs);
        #[cfg(feature = "cookies")]
        {
            builder = builder.cookie_store(true);
        }
        if let Some(timeout) = configuration.timeout {
            builder = builder.timeout(util::seconds("--timeout", timeout)?);
        }
        let client = builder.build()?;

        Ok(VirtualUser {
            started: time::Instant::now(),
            number,
            kinds_index,
            client,
            hosts,
            registries,
            faker: Arc::new(WordListFaker),
            birth_dates: if configuration.past_birth_dates {
                BirthDates::Past
            } else {
                BirthDates::NearFuture
            },
            pacing: util::pacing_interval(configuration.pacing)?,
            config: configuration.clone(),
            metrics_channel: None,
        })
    }

    /// Create a stand-alone user, not part of a load test, sending every request to
    /// `base_url`.
    ///
    /// # Example
    /// ```rust
    /// use campus_load::prelude::*;
    /// use std::sync::Arc;
    ///
    /// let base_url = url::Url::parse("http://127.0.0.1:5001").unwrap();
    /// let user = VirtualUser::single(base_url, Arc::new(Registries::new())).unwrap();
    /// assert_eq!(user.number, 1);
    /// ```
    pub fn single(base_url: Url, registries: Arc<Registries>) -> Result<Self, LoadTestError> {
        VirtualUser::new(
            1,
            0,
            Hosts::single(base_url),
            registries,
            &Configuration::default(),
        )
    }

    /// Build the URL of `path` on the service that serves `resource`.
    ///
    /// `path` is relative to the host's own path, so a host of `https://gw/api` sends
    /// `/courses` to `https://gw/api/courses`.
    pub fn build_url(&self, resource: Resource, path: &str) -> Result<Url, TaskError> {
        let mut base_url = self.hosts.base_url(resource).clone();
        if !base_url.path().ends_with('/') {
            let prefix = format!("{}/", base_url.path());
            base_url.set_path(&prefix);
        }
        Ok(base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn get(&self, resource: Resource, path: &str) -> Result<Response, TaskError> {
        let url = self.build_url(resource, path)?;
        Ok(self.client.get(url).send().await?)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        resource: Resource,
        path: &str,
        body: &T,
    ) -> Result<Response, TaskError> {
        let url = self.build_url(resource, path)?;
        Ok(self.client.post(url).json(body).send().await?)
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        resource: Resource,
        path: &str,
        body: &T,
    ) -> Result<Response, TaskError> {
        let url = self.build_url(resource, path)?;
        Ok(self.client.put(url).json(body).send().await?)
    }

    pub async fn delete(&self, resource: Resource, path: &str) -> Result<Response, TaskError> {
        let url = self.build_url(resource, path)?;
        Ok(self.client.delete(url).send().await?)
    }
}
impl fmt::Debug for VirtualUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VirtualUser")
            .field("number", &self.number)
            .field("kinds_index", &self.kinds_index)
            .field("hosts", &self.hosts)
            .field("birth_dates", &self.birth_dates)
            .field("pacing", &self.pacing)
            .finish()
    }
}

pub(crate) async fn user_main(
    thread_number: usize,
    thread_kind: UserKind,
    mut thread_user: VirtualUser,
    thread_receiver: flume::Receiver<UserCommand>,
) {
    info!("launching user {} from {}...", thread_number, thread_kind.name);

    // User is starting, first invoke the on_start tasks in the order they were registered.
    for index in thread_kind.on_start_tasks() {
        let task = &thread_kind.tasks[index];
        debug!(
            "[user {}]: launching on_start {} task from {}",
            thread_number, task.name, thread_kind.name
        );
        invoke_task(task, &mut thread_user).await;

        if received_exit(&thread_receiver) {
            info!("exiting user {} from {}...", thread_number, thread_kind.name);
            return;
        }
    }

    let loop_tasks = thread_kind.loop_tasks();
    if !loop_tasks.is_empty() {
        'launch_tasks: loop {
            let started = time::Instant::now();

            let task = &thread_kind.tasks[pick_task(&loop_tasks)];
            debug!(
                "[user {}]: launching {} task from {}",
                thread_number, task.name, thread_kind.name
            );
            invoke_task(task, &mut thread_user).await;

            if received_exit(&thread_receiver) {
                break 'launch_tasks;
            }

            // Constant pacing: whatever time the task didn't use is spent sleeping.
            let mut wait_time = thread_user.pacing.saturating_sub(started.elapsed());
            while !wait_time.is_zero() {
                if received_exit(&thread_receiver) {
                    break 'launch_tasks;
                }
                let sleep_duration = wait_time.min(MAXIMUM_SLEEP);
                trace!(
                    "user {} from {} sleeping {:?} ...",
                    thread_number,
                    thread_kind.name,
                    sleep_duration
                );
                tokio::time::sleep(sleep_duration).await;
                wait_time -= sleep_duration;
            }
        }
    }

    info!("exiting user {} from {}...", thread_number, thread_kind.name);
}

// Uniformly pick one of the given task indexes. Never called with an empty slice.
fn pick_task(tasks: &[usize]) -> usize {
    tasks[rand::rng().random_range(0..tasks.len())]
}

// Determine if the parent has sent a UserCommand::Exit message.
fn received_exit(thread_receiver: &flume::Receiver<UserCommand>) -> bool {
    while let Ok(command) = thread_receiver.try_recv() {
        match command {
            UserCommand::Exit => return true,
        }
    }
    // A dropped sender means the load test is gone.
    thread_receiver.is_disconnected()
}

// Invoke the task function, collecting task metrics.
async fn invoke_task(task: &Task, thread_user: &mut VirtualUser) {
    let started = time::Instant::now();
    let mut raw_task = TaskMetric::new(
        thread_user.started.elapsed().as_millis(),
        thread_user.number,
        thread_user.kinds_index,
        task.tasks_index,
        task.name.clone(),
    );

    let result = (task.function)(thread_user).await;
    raw_task.set_result(started.elapsed().as_millis(), &result);

    match &result {
        Ok(outcome) => debug!(
            "[user {}]: {}: {:?}",
            thread_user.number, task.name, outcome
        ),
        Err(e @ TaskError::Schema { .. }) => {
            warn!("[user {}]: {}: {}", thread_user.number, task.name, e)
        }
        Err(e) => debug!("[user {}]: {}: {}", thread_user.number, task.name, e),
    }

    if thread_user.config.no_metrics {
        return;
    }
    if let Some(parent) = thread_user.metrics_channel.as_ref() {
        // Best effort metrics.
        let _ = parent.send(raw_task);
    }
}
