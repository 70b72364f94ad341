//! The built-in tasks and user kinds.
//!
//! Every task sends exactly one request. Local state only changes when the remote
//! service answers with the status the task treats as success; any other status, a
//! transport error, or nothing to act on leaves the registries untouched.

pub mod courses;
pub mod instructors;
mod people;
pub mod students;

use http::StatusCode;
use reqwest::Response;

use crate::task::{TaskError, UserKind};

pub use courses::course_user;
pub use instructors::instructor_user;
pub use students::student_user;

/// The three built-in user kinds, in the order they are registered by the binary.
pub fn all_user_kinds() -> Vec<UserKind> {
    vec![course_user(), student_user(), instructor_user()]
}

// Succeeds only if the response carries exactly the expected status.
fn expect_status(
    operation: &str,
    response: &Response,
    expected: StatusCode,
) -> Result<StatusCode, TaskError> {
    let status = response.status();
    if status == expected {
        Ok(status)
    } else {
        Err(TaskError::Status {
            operation: operation.to_string(),
            status,
        })
    }
}

// Succeeds on any 2xx status.
fn expect_success(operation: &str, response: &Response) -> Result<StatusCode, TaskError> {
    let status = response.status();
    if status.is_success() {
        Ok(status)
    } else {
        Err(TaskError::Status {
            operation: operation.to_string(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_kinds() {
        let kinds = all_user_kinds();
        let names: Vec<&str> = kinds.iter().map(|kind| kind.machine_name.as_str()).collect();
        assert_eq!(names, vec!["courses", "students", "instructors"]);

        // Course users load all three registries, the others only their own pool.
        assert_eq!(kinds[0].on_start_tasks().len(), 3);
        assert_eq!(kinds[0].loop_tasks().len(), 9);
        assert_eq!(kinds[1].on_start_tasks().len(), 1);
        assert_eq!(kinds[1].loop_tasks().len(), 5);
        assert_eq!(kinds[2].on_start_tasks().len(), 1);
        assert_eq!(kinds[2].loop_tasks().len(), 5);
    }
}
