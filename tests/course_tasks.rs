use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;

mod common;

use campus_load::prelude::*;
use campus_load::tasks::courses;

// Registries holding a single course, with the given capacity and students.
fn registries_with_course(max_students: u32, students: Vec<EntityId>) -> Arc<Registries> {
    let registries = Arc::new(Registries::new());
    let mut course = Course::new(EntityId::from("c1"), max_students);
    course.student_ids = students;
    registries.courses.insert(course);
    registries
}

#[tokio::test]
// An empty registry gains exactly the created course, with no members and the capacity
// that was sent.
async fn create_course_tracks_new_course() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/courses");
            then.status(201).json_body(json!({"id": "c1", "title": "Course Title 1"}));
        })
        .await;

    let registries = Arc::new(Registries::new());
    let mut user = common::build_user(&server, &registries);
    let result = courses::create_course(&mut user).await;

    assert_eq!(
        result.unwrap(),
        Outcome::Completed(http::StatusCode::CREATED)
    );
    create.assert_async().await;
    let known = registries.courses.snapshot();
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].course_id, EntityId::from("c1"));
    assert!(known[0].student_ids.is_empty());
    assert!(known[0].instructor_ids.is_empty());
    assert!(known[0].max_students >= 1 && known[0].max_students <= 50);
}

#[tokio::test]
// A created course must come back with an id.
async fn create_course_rejects_unexpected_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/courses");
            then.status(201).json_body(json!({"courseId": "c1"}));
        })
        .await;

    let registries = Arc::new(Registries::new());
    let mut user = common::build_user(&server, &registries);
    match courses::create_course(&mut user).await {
        Err(TaskError::Schema { .. }) => (),
        other => panic!("expected a schema error, got {:?}", other),
    }
    assert!(registries.courses.is_empty());
}

#[tokio::test]
// Anything but 201 leaves the registry alone.
async fn create_course_requires_created() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/courses");
            then.status(200).json_body(json!({"id": "c1"}));
        })
        .await;

    let registries = Arc::new(Registries::new());
    let mut user = common::build_user(&server, &registries);
    let error = courses::create_course(&mut user).await.unwrap_err();
    assert_eq!(error.status(), Some(http::StatusCode::OK));
    assert!(registries.courses.is_empty());
}

#[tokio::test]
// The returned membership list overwrites what was known.
async fn add_students_replaces_membership() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/add");
            then.status(200).json_body(json!({"students": ["s1", "s2"]}));
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    registries.students.merge(common::ids("s", 10));
    let mut user = common::build_user(&server, &registries);

    let result = courses::add_students(&mut user).await;
    assert_eq!(result.unwrap(), Outcome::Completed(http::StatusCode::OK));
    add.assert_async().await;
    let course = registries.courses.get(&EntityId::from("c1")).unwrap();
    assert_eq!(course.student_ids, common::ids("s", 2));
}

#[tokio::test]
// Only students not already enrolled are sent.
async fn add_students_excludes_enrolled() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/students/c1/add")
                .json_body(json!(["s2"]));
            then.status(200).json_body(json!({"students": ["s1", "s2"]}));
        })
        .await;

    let registries = registries_with_course(2, common::ids("s", 1));
    registries.students.merge(common::ids("s", 2));
    let mut user = common::build_user(&server, &registries);

    courses::add_students(&mut user).await.unwrap();
    add.assert_async().await;
    let course = registries.courses.get(&EntityId::from("c1")).unwrap();
    assert_eq!(course.student_ids, common::ids("s", 2));
}

#[tokio::test]
// A full course sends nothing and changes nothing.
async fn add_students_to_full_course() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/add");
            then.status(200).json_body(json!({"students": []}));
        })
        .await;

    let registries = registries_with_course(3, common::ids("s", 3));
    registries.students.merge(common::ids("s", 10));
    let before = registries.courses.snapshot();
    let mut user = common::build_user(&server, &registries);

    let result = courses::add_students(&mut user).await;
    assert_eq!(result.unwrap(), Outcome::Skipped("course is full"));
    assert_eq!(add.hits_async().await, 0);
    assert_eq!(registries.courses.snapshot(), before);
}

#[tokio::test]
// Ten instructors is the most a course can have, whatever its capacity.
async fn add_instructors_to_full_course() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(PUT).path("/instructors/c1/add");
            then.status(200).json_body(json!({"instructors": []}));
        })
        .await;

    let registries = Arc::new(Registries::new());
    let mut course = Course::new(EntityId::from("c1"), 50);
    course.instructor_ids = common::ids("i", 10);
    registries.courses.insert(course);
    registries.instructors.merge(common::ids("i", 20));
    let mut user = common::build_user(&server, &registries);

    let result = courses::add_instructors(&mut user).await;
    assert_eq!(result.unwrap(), Outcome::Skipped("course is full"));
    assert_eq!(add.hits_async().await, 0);
}

#[tokio::test]
// Applying the same returned list twice is the same as applying it once.
async fn membership_replace_is_idempotent() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(PUT).path("/instructors/c1/add");
            then.status(200)
                .json_body(json!({"instructors": ["i1", "i2", "i3"]}));
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    registries.instructors.merge(common::ids("i", 5));
    let mut user = common::build_user(&server, &registries);

    courses::add_instructors(&mut user).await.unwrap();
    let once = registries.courses.snapshot();
    courses::add_instructors(&mut user).await.unwrap();
    assert_eq!(add.hits_async().await, 2);
    assert_eq!(registries.courses.snapshot(), once);
    assert_eq!(once[0].instructor_ids, common::ids("i", 3));
}

#[tokio::test]
// A membership change refused by the server, ie because the course is gone, is not
// applied locally.
async fn rejected_membership_change() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/delete");
            then.status(404);
        })
        .await;

    let registries = registries_with_course(5, common::ids("s", 3));
    let before = registries.courses.snapshot();
    let mut user = common::build_user(&server, &registries);

    let error = courses::remove_students(&mut user).await.unwrap_err();
    assert_eq!(error.status(), Some(http::StatusCode::NOT_FOUND));
    assert_eq!(registries.courses.snapshot(), before);
}

#[tokio::test]
// Membership changes go to the courses service, even when students and instructors
// live elsewhere.
async fn membership_sent_to_courses_host() {
    let courses_server = MockServer::start_async().await;
    let people_server = MockServer::start_async().await;
    let on_courses = courses_server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/delete");
            then.status(200).json_body(json!({"students": []}));
        })
        .await;
    let on_people = people_server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/delete");
            then.status(200).json_body(json!({"students": []}));
        })
        .await;

    let registries = registries_with_course(5, common::ids("s", 2));
    let mut user = common::build_split_user(&courses_server, &people_server, &registries);

    courses::remove_students(&mut user).await.unwrap();
    assert_eq!(on_courses.hits_async().await, 1);
    assert_eq!(on_people.hits_async().await, 0);
    let course = registries.courses.get(&EntityId::from("c1")).unwrap();
    assert!(course.student_ids.is_empty());
}

#[tokio::test]
// Nothing to remove means nothing is sent.
async fn remove_without_members() {
    let server = MockServer::start_async().await;
    let remove = server
        .mock_async(|when, then| {
            when.method(PUT).path("/instructors/c1/delete");
            then.status(200).json_body(json!({"instructors": []}));
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    let mut user = common::build_user(&server, &registries);
    let result = courses::remove_instructors(&mut user).await;
    assert_eq!(result.unwrap(), Outcome::Skipped("no course with members"));
    assert_eq!(remove.hits_async().await, 0);
}

#[tokio::test]
// A course is forgotten only once the server confirms the delete.
async fn delete_course() {
    let server = MockServer::start_async().await;
    let mut refused = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/courses/c1");
            then.status(404);
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    let mut user = common::build_user(&server, &registries);

    let error = courses::delete_course(&mut user).await.unwrap_err();
    assert_eq!(error.status(), Some(http::StatusCode::NOT_FOUND));
    assert_eq!(registries.courses.len(), 1);

    refused.delete_async().await;
    let deleted = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/courses/c1");
            then.status(204);
        })
        .await;
    let result = courses::delete_course(&mut user).await;
    assert_eq!(
        result.unwrap(),
        Outcome::Completed(http::StatusCode::NO_CONTENT)
    );
    deleted.assert_async().await;
    assert!(registries.courses.is_empty());

    // Nothing left to delete.
    let result = courses::delete_course(&mut user).await;
    assert_eq!(result.unwrap(), Outcome::Skipped("no known courses"));
}

#[tokio::test]
// Initialization merges existing courses with their membership and capacity.
async fn init_courses_merges() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET).path("/courses");
            then.status(200).json_body(json!([
                {"id": "c1", "students": ["s1"], "instructors": [], "maxStudents": 20},
                {"id": "c2", "maxStudents": 5},
            ]));
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    let mut user = common::build_user(&server, &registries);
    courses::init_courses(&mut user).await.unwrap();
    courses::init_courses(&mut user).await.unwrap();
    assert_eq!(list.hits_async().await, 2);

    assert_eq!(registries.courses.len(), 2);
    let c2 = registries.courses.get(&EntityId::from("c2")).unwrap();
    assert_eq!(c2.max_students, 5);
    assert!(c2.student_ids.is_empty());
}

#[tokio::test]
// The new capacity of an updated course never drops below its enrollment, and the
// local course is unchanged.
async fn update_course() {
    let server = MockServer::start_async().await;
    let update = server
        .mock_async(|when, then| {
            when.method(PUT).path("/courses/c1");
            then.status(200).json_body(json!({"id": "c1"}));
        })
        .await;

    let registries = registries_with_course(3, common::ids("s", 3));
    let before = registries.courses.snapshot();
    let mut user = common::build_user(&server, &registries);
    courses::update_course(&mut user).await.unwrap();
    update.assert_async().await;
    assert_eq!(registries.courses.snapshot(), before);
}

#[tokio::test]
// A course deleted while its membership is changing is not resurrected.
async fn delete_races_membership_change() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/courses/c1");
            then.status(204);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/students/c1/add");
            then.status(200).json_body(json!({"students": ["s1"]}));
        })
        .await;

    let registries = registries_with_course(5, Vec::new());
    registries.students.merge(common::ids("s", 1));
    let mut deleter = common::build_user(&server, &registries);
    let mut enroller = common::build_user(&server, &registries);

    let (deleted, enrolled) = tokio::join!(
        courses::delete_course(&mut deleter),
        courses::add_students(&mut enroller)
    );
    assert!(deleted.is_ok());
    assert!(enrolled.is_ok());
    assert!(registries.courses.is_empty());
    assert_eq!(registries.students.len(), 1);
}
