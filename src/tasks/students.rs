//! Student tasks, all sent to the students service.

use super::people::{self, Person};
use crate::task::{TaskResult, UserKind};
use crate::user::VirtualUser;

/// A user managing students: loads the student pool then creates, reads, updates and
/// deletes students.
pub fn student_user() -> UserKind {
    UserKind::new("Students")
        .register_task(task!(init_students).set_name("init students").set_on_start())
        .register_task(task!(list_students).set_name("GET students"))
        .register_task(task!(create_student).set_name("POST students"))
        .register_task(task!(get_student).set_name("GET students/id"))
        .register_task(task!(update_student).set_name("PUT students/id"))
        .register_task(task!(delete_student).set_name("DELETE students/id"))
}

/// Merge every student id known to the remote service into the student pool.
pub async fn init_students(user: &mut VirtualUser) -> TaskResult {
    people::initialize(user, Person::Student).await
}

pub async fn list_students(user: &mut VirtualUser) -> TaskResult {
    people::list(user, Person::Student).await
}

/// Create a student, adding its id to the pool on `201 Created`.
pub async fn create_student(user: &mut VirtualUser) -> TaskResult {
    people::create(user, Person::Student).await
}

pub async fn get_student(user: &mut VirtualUser) -> TaskResult {
    people::get_random(user, Person::Student).await
}

pub async fn update_student(user: &mut VirtualUser) -> TaskResult {
    people::update_random(user, Person::Student).await
}

/// Delete a random student, removing it from the pool on `204 No Content`.
pub async fn delete_student(user: &mut VirtualUser) -> TaskResult {
    people::delete_random(user, Person::Student).await
}
