//! Course tasks, and the tasks that change which students and instructors belong to a
//! course.
//!
//! Membership requests (`PUT /students/{courseId}/add` and friends) are sent to the
//! courses service, which owns course membership.

use http::StatusCode;
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::Response;

use super::people::{self, Person};
use super::{expect_status, expect_success};
use crate::api::{
    self, CourseRecord, EntityId, EntityRecord, InstructorMembership, MembershipChange,
    Resource, StudentMembership,
};
use crate::payload::{course_body, course_update_body};
use crate::registry::{Course, IdPool, Membership, Registries};
use crate::task::{Outcome, TaskResult, UserKind};
use crate::user::VirtualUser;

/// A user managing courses: loads all three registries, then exercises every course
/// endpoint and both membership lists.
pub fn course_user() -> UserKind {
    UserKind::new("Courses")
        .register_task(task!(init_courses).set_name("init courses").set_on_start())
        .register_task(task!(init_student_ids).set_name("init students").set_on_start())
        .register_task(
            task!(init_instructor_ids)
                .set_name("init instructors")
                .set_on_start(),
        )
        .register_task(task!(list_courses).set_name("GET courses"))
        .register_task(task!(create_course).set_name("POST courses"))
        .register_task(task!(get_course).set_name("GET courses/id"))
        .register_task(task!(update_course).set_name("PUT courses/id"))
        .register_task(task!(delete_course).set_name("DELETE courses/id"))
        .register_task(task!(add_students).set_name("PUT students/id/add"))
        .register_task(task!(remove_students).set_name("PUT students/id/delete"))
        .register_task(task!(add_instructors).set_name("PUT instructors/id/add"))
        .register_task(task!(remove_instructors).set_name("PUT instructors/id/delete"))
}

/// Merge every course known to the remote service, with its membership and capacity,
/// into the course registry.
pub async fn init_courses(user: &mut VirtualUser) -> TaskResult {
    let operation = "GET courses";
    let response = user
        .get(Resource::Courses, Resource::Courses.collection_path())
        .await?;
    let status = match expect_success(operation, &response) {
        Ok(status) => status,
        Err(e) => {
            info!("failed to fetch courses, status code: {}", response.status());
            return Err(e);
        }
    };
    let records: Vec<CourseRecord> = api::parse(operation, &response.bytes().await?)?;
    let fetched = records.len();
    let added = user
        .registries
        .courses
        .merge(records.into_iter().map(Course::from).collect());
    info!("{} course ids initialized ({} new)", fetched, added);
    Ok(Outcome::Completed(status))
}

pub async fn init_student_ids(user: &mut VirtualUser) -> TaskResult {
    people::initialize(user, Person::Student).await
}

pub async fn init_instructor_ids(user: &mut VirtualUser) -> TaskResult {
    people::initialize(user, Person::Instructor).await
}

pub async fn list_courses(user: &mut VirtualUser) -> TaskResult {
    let response = user
        .get(Resource::Courses, Resource::Courses.collection_path())
        .await?;
    let status = expect_success("GET courses", &response)?;
    Ok(Outcome::Completed(status))
}

/// Create a course. On `201 Created` the course is tracked with the returned id, no
/// members, and the capacity that was sent.
pub async fn create_course(user: &mut VirtualUser) -> TaskResult {
    let operation = "POST courses";
    let body = course_body(&mut rand::rng());
    let response = user
        .post_json(Resource::Courses, Resource::Courses.collection_path(), &body)
        .await?;
    let status = expect_status(operation, &response, StatusCode::CREATED)?;
    let created: EntityRecord = api::parse(operation, &response.bytes().await?)?;
    user.registries
        .courses
        .insert(Course::new(created.id, body.max_students));
    Ok(Outcome::Completed(status))
}

pub async fn get_course(user: &mut VirtualUser) -> TaskResult {
    let course = match user.registries.courses.random() {
        Some(course) => course,
        None => return Ok(Outcome::Skipped("no known courses")),
    };
    let response = user
        .get(
            Resource::Courses,
            &Resource::Courses.entity_path(&course.course_id),
        )
        .await?;
    let status = expect_success("GET courses/id", &response)?;
    Ok(Outcome::Completed(status))
}

/// Replace a random course with a new body whose capacity never drops below the
/// current enrollment. The local course is not changed.
pub async fn update_course(user: &mut VirtualUser) -> TaskResult {
    let course = match user.registries.courses.random() {
        Some(course) => course,
        None => return Ok(Outcome::Skipped("no known courses")),
    };
    let body = course_update_body(&course, &mut rand::rng());
    let response = user
        .put_json(
            Resource::Courses,
            &Resource::Courses.entity_path(&course.course_id),
            &body,
        )
        .await?;
    let status = expect_success("PUT courses/id", &response)?;
    Ok(Outcome::Completed(status))
}

/// Delete a random course, no longer tracking it on `204 No Content`.
pub async fn delete_course(user: &mut VirtualUser) -> TaskResult {
    let course = match user.registries.courses.random() {
        Some(course) => course,
        None => return Ok(Outcome::Skipped("no known courses")),
    };
    let response = user
        .delete(
            Resource::Courses,
            &Resource::Courses.entity_path(&course.course_id),
        )
        .await?;
    let status = expect_status("DELETE courses/id", &response, StatusCode::NO_CONTENT)?;
    user.registries.courses.remove(&course.course_id);
    Ok(Outcome::Completed(status))
}

/// Enroll up to the remaining capacity of a random course with students not already
/// enrolled.
pub async fn add_students(user: &mut VirtualUser) -> TaskResult {
    add_members(user, Membership::Students).await
}

/// Unenroll some of the students of a random course that has any.
pub async fn remove_students(user: &mut VirtualUser) -> TaskResult {
    remove_members(user, Membership::Students).await
}

/// Assign instructors to a random course, never more than ten per course.
pub async fn add_instructors(user: &mut VirtualUser) -> TaskResult {
    add_members(user, Membership::Instructors).await
}

pub async fn remove_instructors(user: &mut VirtualUser) -> TaskResult {
    remove_members(user, Membership::Instructors).await
}

fn resource_of(membership: Membership) -> Resource {
    match membership {
        Membership::Students => Resource::Students,
        Membership::Instructors => Resource::Instructors,
    }
}

fn pool_of(registries: &Registries, membership: Membership) -> &IdPool {
    match membership {
        Membership::Students => &registries.students,
        Membership::Instructors => &registries.instructors,
    }
}

fn members_of(course: &Course, membership: Membership) -> &[EntityId] {
    match membership {
        Membership::Students => &course.student_ids,
        Membership::Instructors => &course.instructor_ids,
    }
}

fn remaining_slots(course: &Course, membership: Membership) -> usize {
    match membership {
        Membership::Students => course.remaining_student_slots(),
        Membership::Instructors => course.remaining_instructor_slots(),
    }
}

// A random non-empty subset of the current members. Never called with no members.
fn pick_members(members: &[EntityId]) -> Vec<EntityId> {
    let mut rng = rand::rng();
    let count = rng.random_range(1..=members.len());
    members.choose_multiple(&mut rng, count).cloned().collect()
}

// Between one and the remaining number of slots of distinct ids from `pool` that are not
// yet members, or `None` if the course is full. May be empty if every known id is already
// a member.
fn members_to_add(
    course: &Course,
    membership: Membership,
    pool: &IdPool,
) -> Option<Vec<EntityId>> {
    let remaining = remaining_slots(course, membership);
    if remaining == 0 {
        return None;
    }
    let count = rand::rng().random_range(1..=remaining);
    Some(pool.sample_excluding(count, members_of(course, membership)))
}

async fn add_members(user: &mut VirtualUser, membership: Membership) -> TaskResult {
    let course = match user.registries.courses.random() {
        Some(course) => course,
        None => return Ok(Outcome::Skipped("no known courses")),
    };
    let pool = pool_of(&user.registries, membership);
    let body = match members_to_add(&course, membership, pool) {
        Some(body) => body,
        None => return Ok(Outcome::Skipped("course is full")),
    };

    let resource = resource_of(membership);
    let operation = format!("PUT {}/id/add", resource);
    let path = resource.membership_path(&course.course_id, MembershipChange::Add);
    let response = user.put_json(Resource::Courses, &path, &body).await?;
    apply_membership(user, &operation, response, &course.course_id, membership).await
}

async fn remove_members(user: &mut VirtualUser, membership: Membership) -> TaskResult {
    let course = match user.registries.courses.random_with_members(membership) {
        Some(course) => course,
        None => return Ok(Outcome::Skipped("no course with members")),
    };
    let body = pick_members(members_of(&course, membership));

    let resource = resource_of(membership);
    let operation = format!("PUT {}/id/delete", resource);
    let path = resource.membership_path(&course.course_id, MembershipChange::Delete);
    let response = user.put_json(Resource::Courses, &path, &body).await?;
    apply_membership(user, &operation, response, &course.course_id, membership).await
}

// Overwrite the course's membership with the list returned by a successful change.
async fn apply_membership(
    user: &mut VirtualUser,
    operation: &str,
    response: Response,
    course_id: &EntityId,
    membership: Membership,
) -> TaskResult {
    let status = expect_status(operation, &response, StatusCode::OK)?;
    let body = response.bytes().await?;
    let members = match membership {
        Membership::Students => api::parse::<StudentMembership>(operation, &body)?.students,
        Membership::Instructors => {
            api::parse::<InstructorMembership>(operation, &body)?.instructors
        }
    };
    if !user
        .registries
        .courses
        .replace_membership(course_id, membership, members)
    {
        debug!("course {} was deleted before {} completed", course_id, operation);
    }
    Ok(Outcome::Completed(status))
}
