//! Tasks, user kinds, and the result types tasks return.
//!
//! A [`Task`] wraps one async function that issues exactly one request against the
//! remote services and updates the shared registries it owns. Tasks are grouped into a
//! [`UserKind`]: every virtual user is assigned one kind, runs its `on_start` tasks one
//! time, then runs its other tasks picked uniformly at random until the load test stops.
//!
//! ```rust
//! use campus_load::prelude::*;
//!
//! let kind = user_kind!("ReadOnlyUser")
//!     .register_task(task!(list_courses).set_on_start())
//!     .register_task(task!(list_courses));
//!
//! async fn list_courses(user: &mut VirtualUser) -> TaskResult {
//!     let response = user.get(Resource::Courses, "/courses").await?;
//!     Ok(Outcome::Completed(response.status()))
//! }
//! ```

use http::StatusCode;
use std::{fmt, future::Future, pin::Pin};

use crate::user::VirtualUser;

/// `task!(foo)` expands to `Task::new(foo)`, but also does some boxing to work around a
/// limitation in the compiler.
#[macro_export]
macro_rules! task {
    ($task_func:ident) => {
        $crate::task::Task::new(move |s| std::boxed::Box::pin($task_func(s)))
    };
}

/// `user_kind!("foo")` expands to `UserKind::new("foo")`.
#[macro_export]
macro_rules! user_kind {
    ($name:tt) => {
        $crate::task::UserKind::new($name)
    };
}

/// What a task did when it didn't fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A request was sent and the expected status came back.
    Completed(StatusCode),
    /// There was nothing to do this iteration, no request was sent.
    Skipped(&'static str),
}

/// Why a task iteration failed. Failures end the iteration only: the shared registries
/// are left untouched and the virtual user carries on with its next task.
#[derive(Debug)]
pub enum TaskError {
    /// The request could not be sent or its body could not be read.
    Reqwest(reqwest::Error),
    /// A request URL could not be built.
    Url(url::ParseError),
    /// The remote service answered with a status the task doesn't treat as success.
    Status {
        operation: String,
        status: StatusCode,
    },
    /// A success status was returned but the body doesn't match the endpoint's schema.
    Schema {
        operation: String,
        source: serde_json::Error,
    },
}
impl TaskError {
    fn describe(&self) -> &str {
        match *self {
            TaskError::Reqwest(_) => "reqwest::Error",
            TaskError::Url(_) => "url::ParseError",
            TaskError::Status { .. } => "unexpected status code",
            TaskError::Schema { .. } => "response does not match schema",
        }
    }

    /// The status code to record for this failure, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TaskError::Status { status, .. } => Some(*status),
            TaskError::Reqwest(source) => source.status(),
            _ => None,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskError::Reqwest(source) => write!(f, "TaskError: {} ({})", self.describe(), source),
            TaskError::Url(source) => write!(f, "TaskError: {} ({})", self.describe(), source),
            TaskError::Status { operation, status } => {
                write!(f, "TaskError: {} ({}: {})", self.describe(), operation, status)
            }
            TaskError::Schema { operation, source } => {
                write!(f, "TaskError: {} ({}: {})", self.describe(), operation, source)
            }
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Reqwest(source) => Some(source),
            TaskError::Url(source) => Some(source),
            TaskError::Schema { source, .. } => Some(source),
            TaskError::Status { .. } => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> TaskError {
        TaskError::Reqwest(err)
    }
}

/// Auto-convert Url errors.
impl From<url::ParseError> for TaskError {
    fn from(err: url::ParseError) -> TaskError {
        TaskError::Url(err)
    }
}

/// The result of running a task.
pub type TaskResult = Result<Outcome, TaskError>;

/// The function run by a task.
pub type TaskFunction =
    for<'r> fn(&'r mut VirtualUser) -> Pin<Box<dyn Future<Output = TaskResult> + Send + 'r>>;

/// A named unit of work run by virtual users.
#[derive(Clone)]
pub struct Task {
    /// An index into [`UserKind`]`.tasks`, set when the task is registered.
    pub tasks_index: usize,
    /// The name of the task, used in logs and metrics.
    pub name: String,
    /// Run one time when the user starts instead of in the steady-state loop.
    pub on_start: bool,
    pub function: TaskFunction,
}
impl Task {
    pub fn new(function: TaskFunction) -> Self {
        trace!("new task");
        Task {
            tasks_index: usize::MAX,
            name: "".to_string(),
            on_start: false,
            function,
        }
    }

    /// Set the name shown in logs and metrics.
    pub fn set_name(mut self, name: &str) -> Self {
        trace!("[{}] set_name: {}", self.tasks_index, name);
        self.name = name.to_string();
        self
    }

    /// Only run this task one time, when the user starts.
    pub fn set_on_start(mut self) -> Self {
        trace!("{} [{}] set_on_start task", self.name, self.tasks_index);
        self.on_start = true;
        self
    }
}
impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Task")
            .field("tasks_index", &self.tasks_index)
            .field("name", &self.name)
            .field("on_start", &self.on_start)
            .finish()
    }
}

/// A kind of simulated user: the tasks it runs at startup and in its steady-state loop.
#[derive(Clone, Debug)]
pub struct UserKind {
    /// The name of the user kind.
    pub name: String,
    /// Lowercase alphanumeric form of the name, used by `--user-kinds`.
    pub machine_name: String,
    /// An index into `LoadTest.user_kinds`, set when the kind is registered.
    pub kinds_index: usize,
    /// Every task registered on this kind.
    pub tasks: Vec<Task>,
}
impl UserKind {
    pub fn new(name: &str) -> Self {
        trace!("new user kind: name: {}", name);
        UserKind {
            name: name.to_string(),
            machine_name: name
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase(),
            kinds_index: usize::MAX,
            tasks: Vec::new(),
        }
    }

    /// Register a task. Registration order is preserved, `on_start` tasks run in the
    /// order they were registered.
    pub fn register_task(mut self, mut task: Task) -> Self {
        trace!("{} register_task: {}", self.name, task.name);
        task.tasks_index = self.tasks.len();
        self.tasks.push(task);
        self
    }

    /// Indexes of the tasks run one time when a user starts.
    pub fn on_start_tasks(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .filter(|task| task.on_start)
            .map(|task| task.tasks_index)
            .collect()
    }

    /// Indexes of the tasks picked from in the steady-state loop.
    pub fn loop_tasks(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .filter(|task| !task.on_start)
            .map(|task| task.tasks_index)
            .collect()
    }
}
