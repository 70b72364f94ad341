//! Everything needed to write a load test, importable with `use campus_load::prelude::*;`.

pub use crate::api::{EntityId, Resource};
pub use crate::config::{ConfigDefault, ConfigDefaultType, Configuration, UserKinds};
pub use crate::metrics::{LoadTestMetrics, TaskMetric, TaskStatus};
pub use crate::payload::{BirthDates, PersonFaker, WordListFaker};
pub use crate::registry::{Course, IdPool, Registries};
pub use crate::task::{Outcome, Task, TaskError, TaskFunction, TaskResult, UserKind};
pub use crate::tasks::{course_user, instructor_user, student_user};
pub use crate::user::{Hosts, VirtualUser};
pub use crate::{task, user_kind, AttackPhase, LoadTest, LoadTestError};
