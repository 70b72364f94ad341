//! Wire schemas for the courses, students and instructors services.
//!
//! Every endpoint a task talks to has an explicit response structure here. A response
//! with a success status whose body doesn't match the expected structure is reported as
//! [`TaskError::Schema`](../task/enum.TaskError.html#variant.Schema) rather than being
//! trusted blindly.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::TaskError;

/// An opaque identifier assigned by a remote service.
///
/// The services are free to use strings (for example MongoDB object ids) or integers, so
/// the identifier keeps whatever JSON representation it was received with and is sent
/// back exactly the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// An identifier received as a JSON string.
    Text(String),
    /// An identifier received as a JSON integer.
    Number(i64),
}
impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntityId::Text(id) => write!(f, "{}", id),
            EntityId::Number(id) => write!(f, "{}", id),
        }
    }
}
impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}
impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Number(id)
    }
}

/// The three resources exposed by the remote services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Courses,
    Students,
    Instructors,
}
impl Resource {
    /// All resources, in the order they are initialized.
    pub const ALL: [Resource; 3] = [Resource::Courses, Resource::Students, Resource::Instructors];

    /// Path of the resource collection, ie `/courses`.
    pub fn collection_path(&self) -> &'static str {
        match self {
            Resource::Courses => "/courses",
            Resource::Students => "/students",
            Resource::Instructors => "/instructors",
        }
    }

    /// Path of a single entity, ie `/students/42`.
    pub fn entity_path(&self, id: &EntityId) -> String {
        format!("{}/{}", self.collection_path(), id)
    }

    /// Path used to add or remove members of a course, ie `/students/c1/add`.
    ///
    /// Only meaningful for students and instructors.
    pub fn membership_path(&self, course_id: &EntityId, change: MembershipChange) -> String {
        format!(
            "{}/{}/{}",
            self.collection_path(),
            course_id,
            change.path_segment()
        )
    }

    /// Singular name used in log messages.
    pub fn singular(&self) -> &'static str {
        match self {
            Resource::Courses => "course",
            Resource::Students => "student",
            Resource::Instructors => "instructor",
        }
    }
}
impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.collection_path()[1..])
    }
}

/// Direction of a course membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Add,
    Delete,
}
impl MembershipChange {
    fn path_segment(&self) -> &'static str {
        match self {
            MembershipChange::Add => "add",
            MembershipChange::Delete => "delete",
        }
    }
}

/// A course as returned by `GET /courses`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: EntityId,
    #[serde(default)]
    pub students: Vec<EntityId>,
    #[serde(default)]
    pub instructors: Vec<EntityId>,
    #[serde(default)]
    pub max_students: u32,
}

/// Any entity, when only its identifier matters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
}

/// Response body of `PUT /students/{courseId}/add` and `/delete`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentMembership {
    pub students: Vec<EntityId>,
}

/// Response body of `PUT /instructors/{courseId}/add` and `/delete`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstructorMembership {
    pub instructors: Vec<EntityId>,
}

/// Deserialize a response body, mapping failures to [`TaskError::Schema`].
pub fn parse<T: DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T, TaskError> {
    serde_json::from_slice(body).map_err(|source| TaskError::Schema {
        operation: operation.to_string(),
        source,
    })
}
