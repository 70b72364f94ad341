//! Instructor tasks, all sent to the instructors service.

use super::people::{self, Person};
use crate::task::{TaskResult, UserKind};
use crate::user::VirtualUser;

/// A user managing instructors: loads the instructor pool then creates, reads,
/// updates and deletes instructors.
pub fn instructor_user() -> UserKind {
    UserKind::new("Instructors")
        .register_task(task!(init_instructors).set_name("init instructors").set_on_start())
        .register_task(task!(list_instructors).set_name("GET instructors"))
        .register_task(task!(create_instructor).set_name("POST instructors"))
        .register_task(task!(get_instructor).set_name("GET instructors/id"))
        .register_task(task!(update_instructor).set_name("PUT instructors/id"))
        .register_task(task!(delete_instructor).set_name("DELETE instructors/id"))
}

/// Merge every instructor id known to the remote service into the instructor pool.
pub async fn init_instructors(user: &mut VirtualUser) -> TaskResult {
    people::initialize(user, Person::Instructor).await
}

pub async fn list_instructors(user: &mut VirtualUser) -> TaskResult {
    people::list(user, Person::Instructor).await
}

/// Create an instructor, adding its id to the pool on `201 Created`.
pub async fn create_instructor(user: &mut VirtualUser) -> TaskResult {
    people::create(user, Person::Instructor).await
}

pub async fn get_instructor(user: &mut VirtualUser) -> TaskResult {
    people::get_random(user, Person::Instructor).await
}

pub async fn update_instructor(user: &mut VirtualUser) -> TaskResult {
    people::update_random(user, Person::Instructor).await
}

/// Delete a random instructor, removing it from the pool on `204 No Content`.
pub async fn delete_instructor(user: &mut VirtualUser) -> TaskResult {
    people::delete_random(user, Person::Instructor).await
}
