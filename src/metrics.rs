//! Optional metrics collected and aggregated during a load test.
//!
//! Every task invocation produces a [`TaskMetric`] which the running virtual user sends
//! to the load test. The load test aggregates them per user kind and task into
//! [`TaskMetricAggregate`]s, returned inside [`LoadTestMetrics`] when
//! [`LoadTest::execute()`](../struct.LoadTest.html#method.execute) finishes.

use chrono::prelude::*;
use itertools::Itertools;
use num_format::{Locale, ToFormattedString};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::task::{Outcome, TaskResult, UserKind};
use crate::util;

/// How a single task invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// A request was sent and the expected status came back.
    Success,
    /// The request failed, or returned an unexpected status or body.
    Failure,
    /// There was nothing to do, no request was sent.
    Skipped,
}

/// One task invocation by one virtual user.
#[derive(Debug, Clone)]
pub struct TaskMetric {
    /// How many milliseconds the user had been running when the task started.
    pub elapsed: u64,
    /// Which virtual user ran the task.
    pub user: usize,
    /// An index into `LoadTest.user_kinds`.
    pub kinds_index: usize,
    /// An index into [`UserKind`]`.tasks`.
    pub tasks_index: usize,
    pub name: String,
    /// How many milliseconds the task ran.
    pub run_time: u64,
    /// The status code received, or 0 if no response was received.
    pub status_code: u16,
    pub status: TaskStatus,
}
impl TaskMetric {
    pub(crate) fn new(
        elapsed: u128,
        user: usize,
        kinds_index: usize,
        tasks_index: usize,
        name: String,
    ) -> Self {
        TaskMetric {
            elapsed: elapsed as u64,
            user,
            kinds_index,
            tasks_index,
            name,
            run_time: 0,
            status_code: 0,
            status: TaskStatus::Success,
        }
    }

    /// Record how long the task ran and how it ended.
    pub(crate) fn set_result(&mut self, time: u128, result: &TaskResult) {
        self.run_time = time as u64;
        let (status, status_code) = match result {
            Ok(Outcome::Completed(status_code)) => (TaskStatus::Success, status_code.as_u16()),
            Ok(Outcome::Skipped(_)) => (TaskStatus::Skipped, 0),
            Err(e) => (
                TaskStatus::Failure,
                e.status().map_or(0, |status_code| status_code.as_u16()),
            ),
        };
        self.status = status;
        self.status_code = status_code;
    }
}

/// Aggregated metrics of one task of one user kind.
#[derive(Debug, Clone, Default)]
pub struct TaskMetricAggregate {
    pub kinds_index: usize,
    pub kind_name: String,
    pub tasks_index: usize,
    pub task_name: String,
    /// Per-run-time counters, tracking how often tasks take a given time to complete.
    pub times: BTreeMap<usize, usize>,
    /// The shortest run-time of an invocation that sent a request.
    pub min_time: usize,
    /// The longest run-time of an invocation that sent a request.
    pub max_time: usize,
    pub total_time: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub skip_count: usize,
    /// How often each status code was received, 0 meaning no response.
    pub status_code_counts: HashMap<u16, usize>,
}
impl TaskMetricAggregate {
    pub(crate) fn new(
        kinds_index: usize,
        kind_name: &str,
        tasks_index: usize,
        task_name: &str,
    ) -> Self {
        TaskMetricAggregate {
            kinds_index,
            kind_name: kind_name.to_string(),
            tasks_index,
            task_name: task_name.to_string(),
            ..Default::default()
        }
    }

    /// Fold one task invocation into the aggregate.
    pub(crate) fn record(&mut self, metric: &TaskMetric, track_status_codes: bool) {
        match metric.status {
            TaskStatus::Success => self.success_count += 1,
            TaskStatus::Failure => self.fail_count += 1,
            TaskStatus::Skipped => {
                // No request was sent, so the time isn't interesting.
                self.skip_count += 1;
                return;
            }
        }

        if track_status_codes {
            *self
                .status_code_counts
                .entry(metric.status_code)
                .or_insert(0) += 1;
        }

        let time = metric.run_time as usize;
        if self.min_time == 0 || time < self.min_time {
            self.min_time = time;
        }
        if time > self.max_time {
            self.max_time = time;
        }
        self.total_time += time;

        // Round the time so similar times are combined.
        let rounded_time = match time {
            // No rounding for times 0-100 ms.
            0..=100 => time,
            // Round to nearest 10 for times 100-500 ms.
            101..=500 => ((time as f64 / 10.0).round() * 10.0) as usize,
            // Round to nearest 100 for times 500-1000 ms.
            501..=1000 => ((time as f64 / 100.0).round() * 100.0) as usize,
            // Round to nearest 1000 for larger times.
            _ => ((time as f64 / 1000.0).round() * 1000.0) as usize,
        };
        *self.times.entry(rounded_time).or_insert(0) += 1;
    }

    /// Invocations that sent a request.
    pub fn request_count(&self) -> usize {
        self.success_count + self.fail_count
    }

    /// Average run-time of invocations that sent a request.
    pub fn average_time(&self) -> f32 {
        if self.request_count() == 0 {
            0.0
        } else {
            self.total_time as f32 / self.request_count() as f32
        }
    }
}

/// All metrics collected during a load test.
#[derive(Debug, Clone, Default)]
pub struct LoadTestMetrics {
    /// When the load test started.
    pub started: Option<DateTime<Local>>,
    /// How many seconds the load test ran.
    pub duration: usize,
    /// Total number of users simulated.
    pub users: usize,
    /// Aggregated task metrics, indexed by user kind then by task.
    pub tasks: Vec<Vec<TaskMetricAggregate>>,
    /// Whether status codes were tracked.
    pub display_status_codes: bool,
}
impl LoadTestMetrics {
    /// Prepare an empty aggregate for every registered task.
    pub(crate) fn initialize_task_metrics(&mut self, user_kinds: &[UserKind], track_status_codes: bool) {
        self.display_status_codes = track_status_codes;
        self.tasks = user_kinds
            .iter()
            .map(|kind| {
                kind.tasks
                    .iter()
                    .map(|task| {
                        TaskMetricAggregate::new(
                            kind.kinds_index,
                            &kind.name,
                            task.tasks_index,
                            &task.name,
                        )
                    })
                    .collect()
            })
            .collect();
    }

    pub(crate) fn record_task(&mut self, metric: &TaskMetric) {
        let track_status_codes = self.display_status_codes;
        match self
            .tasks
            .get_mut(metric.kinds_index)
            .and_then(|tasks| tasks.get_mut(metric.tasks_index))
        {
            Some(aggregate) => aggregate.record(metric, track_status_codes),
            None => warn!(
                "ignoring metric for unknown task {}:{}",
                metric.kinds_index, metric.tasks_index
            ),
        }
    }

    /// The aggregate of a task, looked up by user kind and task name.
    pub fn task(&self, kind_name: &str, task_name: &str) -> Option<&TaskMetricAggregate> {
        self.tasks
            .iter()
            .flatten()
            .find(|task| task.kind_name == kind_name && task.task_name == task_name)
    }

    /// Total invocations, summed over every task.
    pub fn totals(&self) -> (usize, usize, usize) {
        self.tasks
            .iter()
            .flatten()
            .fold((0, 0, 0), |(success, fail, skip), task| {
                (
                    success + task.success_count,
                    fail + task.fail_count,
                    skip + task.skip_count,
                )
            })
    }

    /// Print the metrics tables to standard out.
    pub fn print(&self) {
        if !self.tasks.is_empty() {
            info!("printing metrics after {} seconds...", self.duration);
            print!("{}", self);
        }
    }

    fn fmt_tasks(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            fmt,
            "\n === PER TASK METRICS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>9} | {:>14} | {:>9} | {:>7} | {:>6}",
            "Name", "# run", "# fails", "# skipped", "task/s", "fail/s"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        let (mut total_runs, mut total_fails, mut total_skips) = (0, 0, 0);
        for kind in &self.tasks {
            if let Some(first) = kind.first() {
                writeln!(
                    fmt,
                    " {:<24} |",
                    util::truncate_string(
                        &format!("{}: {}", first.kinds_index + 1, first.kind_name),
                        60
                    )
                )?;
            }
            for task in kind {
                let runs = task.request_count();
                writeln!(
                    fmt,
                    " {:<24} | {:>9} | {:>14} | {:>9} | {:>7.2} | {:>6.2}",
                    util::truncate_string(
                        &format!("  {}: {}", task.tasks_index + 1, task.task_name),
                        24
                    ),
                    runs.to_formatted_string(&Locale::en),
                    format!(
                        "{} ({}%)",
                        task.fail_count.to_formatted_string(&Locale::en),
                        percent(task.fail_count, runs)
                    ),
                    task.skip_count.to_formatted_string(&Locale::en),
                    per_second(self.duration, runs),
                    per_second(self.duration, task.fail_count),
                )?;
                total_runs += runs;
                total_fails += task.fail_count;
                total_skips += task.skip_count;
            }
        }
        writeln!(
            fmt,
            " -------------------------+-----------+----------------+-----------+---------+-------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>9} | {:>14} | {:>9} | {:>7.2} | {:>6.2}",
            "Aggregated",
            total_runs.to_formatted_string(&Locale::en),
            format!(
                "{} ({}%)",
                total_fails.to_formatted_string(&Locale::en),
                percent(total_fails, total_runs)
            ),
            total_skips.to_formatted_string(&Locale::en),
            per_second(self.duration, total_runs),
            per_second(self.duration, total_fails),
        )
    }

    fn fmt_task_times(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>11} | {:>10} | {:>11} | {:>10}",
            "Name", "Avg (ms)", "Min", "Max", "Median"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for task in self.tasks.iter().flatten() {
            writeln!(
                fmt,
                " {:<24} | {:>11.2} | {:>10} | {:>11} | {:>10}",
                util::truncate_string(
                    &format!("{}.{}: {}", task.kinds_index + 1, task.tasks_index + 1, task.task_name),
                    24
                ),
                task.average_time(),
                task.min_time.to_formatted_string(&Locale::en),
                task.max_time.to_formatted_string(&Locale::en),
                median(&task.times, task.request_count()).to_formatted_string(&Locale::en),
            )?;
        }
        Ok(())
    }

    fn fmt_status_codes(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.display_status_codes {
            return Ok(());
        }
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(fmt, " {:<24} | {:>51} ", "Name", "Status codes")?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        let mut aggregated: HashMap<u16, usize> = HashMap::new();
        for task in self.tasks.iter().flatten() {
            for (status_code, count) in &task.status_code_counts {
                *aggregated.entry(*status_code).or_insert(0) += count;
            }
            writeln!(
                fmt,
                " {:<24} | {:>51}",
                util::truncate_string(
                    &format!("{}.{}: {}", task.kinds_index + 1, task.tasks_index + 1, task.task_name),
                    24
                ),
                format_status_codes(&task.status_code_counts),
            )?;
        }
        writeln!(
            fmt,
            " -------------------------+----------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>51} ",
            "Aggregated",
            format_status_codes(&aggregated)
        )
    }
}

impl fmt::Display for LoadTestMetrics {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_tasks(fmt)?;
        self.fmt_task_times(fmt)?;
        self.fmt_status_codes(fmt)
    }
}

fn percent(part: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        part * 100 / total
    }
}

fn per_second(duration: usize, count: usize) -> f32 {
    if duration == 0 {
        0.0
    } else {
        count as f32 / duration as f32
    }
}

// Median of rounded times, given how many times were recorded in total.
fn median(times: &BTreeMap<usize, usize>, total: usize) -> usize {
    let mut seen = 0;
    for (time, count) in times {
        seen += count;
        if seen * 2 >= total {
            return *time;
        }
    }
    0
}

// Formats as `count [code]`, sorted by status code.
fn format_status_codes(status_code_counts: &HashMap<u16, usize>) -> String {
    status_code_counts
        .iter()
        .sorted()
        .map(|(status_code, count)| {
            format!("{} [{}]", count.to_formatted_string(&Locale::en), status_code)
        })
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;
    use http::StatusCode;

    fn metric(tasks_index: usize, run_time: u128, result: TaskResult) -> TaskMetric {
        let mut metric = TaskMetric::new(0, 1, 0, tasks_index, "task".to_string());
        metric.set_result(run_time, &result);
        metric
    }

    #[test]
    fn task_metric_status() {
        let success = metric(0, 12, Ok(Outcome::Completed(StatusCode::CREATED)));
        assert_eq!(success.status, TaskStatus::Success);
        assert_eq!(success.status_code, 201);
        assert_eq!(success.run_time, 12);

        let skipped = metric(0, 0, Ok(Outcome::Skipped("empty")));
        assert_eq!(skipped.status, TaskStatus::Skipped);
        assert_eq!(skipped.status_code, 0);

        let failure = metric(
            0,
            3,
            Err(TaskError::Status {
                operation: "DELETE courses/id".to_string(),
                status: StatusCode::NOT_FOUND,
            }),
        );
        assert_eq!(failure.status, TaskStatus::Failure);
        assert_eq!(failure.status_code, 404);
    }

    #[test]
    fn aggregate() {
        let mut aggregate = TaskMetricAggregate::new(0, "Courses", 0, "POST courses");
        aggregate.record(&metric(0, 10, Ok(Outcome::Completed(StatusCode::CREATED))), true);
        aggregate.record(&metric(0, 30, Ok(Outcome::Completed(StatusCode::CREATED))), true);
        aggregate.record(
            &metric(
                0,
                650,
                Err(TaskError::Status {
                    operation: "POST courses".to_string(),
                    status: StatusCode::BAD_REQUEST,
                }),
            ),
            true,
        );
        aggregate.record(&metric(0, 0, Ok(Outcome::Skipped("empty"))), true);

        assert_eq!(aggregate.success_count, 2);
        assert_eq!(aggregate.fail_count, 1);
        assert_eq!(aggregate.skip_count, 1);
        assert_eq!(aggregate.min_time, 10);
        assert_eq!(aggregate.max_time, 650);
        assert_eq!(aggregate.average_time(), 230.0);
        assert_eq!(aggregate.times.get(&700), Some(&1));
        assert_eq!(aggregate.status_code_counts.get(&201), Some(&2));
        assert_eq!(aggregate.status_code_counts.get(&400), Some(&1));
        assert_eq!(median(&aggregate.times, aggregate.request_count()), 30);
    }

    #[test]
    fn display() {
        let kind = crate::tasks::course_user();
        let mut metrics = LoadTestMetrics {
            duration: 2,
            ..Default::default()
        };
        metrics.initialize_task_metrics(&[kind], true);
        let mut created = metric(4, 5, Ok(Outcome::Completed(StatusCode::CREATED)));
        created.kinds_index = 0;
        metrics.record_task(&created);
        // Unknown tasks are ignored.
        metrics.record_task(&metric(99, 5, Ok(Outcome::Skipped("empty"))));

        assert_eq!(metrics.totals(), (1, 0, 0));
        assert_eq!(
            metrics.task("Courses", "POST courses").map(|task| task.success_count),
            Some(1)
        );
        let table = metrics.to_string();
        assert!(table.contains("PER TASK METRICS"));
        assert!(table.contains("POST courses"));
        assert!(table.contains("1 [201]"));
    }

    #[test]
    fn status_codes_sorted() {
        let mut counts = HashMap::new();
        counts.insert(404, 2);
        counts.insert(200, 1_500);
        assert_eq!(format_status_codes(&counts), "1,500 [200], 2 [404]");
    }
}
