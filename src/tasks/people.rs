//! Tasks shared by students and instructors, which only differ in the resource they
//! target and the pool they keep ids in.

use http::StatusCode;

use crate::api::{self, EntityRecord, Resource};
use crate::payload::person_body;
use crate::registry::{IdPool, Registries};
use crate::task::{Outcome, TaskResult};
use crate::user::VirtualUser;

use super::{expect_status, expect_success};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Person {
    Student,
    Instructor,
}
impl Person {
    fn resource(self) -> Resource {
        match self {
            Person::Student => Resource::Students,
            Person::Instructor => Resource::Instructors,
        }
    }

    fn pool(self, registries: &Registries) -> &IdPool {
        match self {
            Person::Student => &registries.students,
            Person::Instructor => &registries.instructors,
        }
    }
}

/// Load every id the remote service knows about into the pool.
pub(super) async fn initialize(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let operation = format!("GET {}", resource);
    let response = user.get(resource, resource.collection_path()).await?;
    let status = match expect_success(&operation, &response) {
        Ok(status) => status,
        Err(e) => {
            info!(
                "failed to fetch {}, status code: {}",
                resource,
                response.status()
            );
            return Err(e);
        }
    };
    let records: Vec<EntityRecord> = api::parse(&operation, &response.bytes().await?)?;
    let fetched = records.len();
    let added = person
        .pool(&user.registries)
        .merge(records.into_iter().map(|record| record.id).collect());
    info!(
        "{} {} ids initialized ({} new)",
        fetched,
        resource.singular(),
        added
    );
    Ok(Outcome::Completed(status))
}

pub(super) async fn list(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let response = user.get(resource, resource.collection_path()).await?;
    let status = expect_success(&format!("GET {}", resource), &response)?;
    Ok(Outcome::Completed(status))
}

pub(super) async fn create(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let operation = format!("POST {}", resource);
    let body = person_body(user.faker.as_ref(), user.birth_dates, &mut rand::rng());
    let response = user
        .post_json(resource, resource.collection_path(), &body)
        .await?;
    let status = expect_status(&operation, &response, StatusCode::CREATED)?;
    let created: EntityRecord = api::parse(&operation, &response.bytes().await?)?;
    person.pool(&user.registries).insert(created.id);
    Ok(Outcome::Completed(status))
}

pub(super) async fn get_random(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let id = match person.pool(&user.registries).random() {
        Some(id) => id,
        None => return Ok(Outcome::Skipped("no known ids")),
    };
    let response = user.get(resource, &resource.entity_path(&id)).await?;
    let status = expect_success(&format!("GET {}/id", resource), &response)?;
    Ok(Outcome::Completed(status))
}

pub(super) async fn update_random(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let id = match person.pool(&user.registries).random() {
        Some(id) => id,
        None => return Ok(Outcome::Skipped("no known ids")),
    };
    let body = person_body(user.faker.as_ref(), user.birth_dates, &mut rand::rng());
    let response = user
        .put_json(resource, &resource.entity_path(&id), &body)
        .await?;
    let status = expect_success(&format!("PUT {}/id", resource), &response)?;
    Ok(Outcome::Completed(status))
}

pub(super) async fn delete_random(user: &mut VirtualUser, person: Person) -> TaskResult {
    let resource = person.resource();
    let id = match person.pool(&user.registries).random() {
        Some(id) => id,
        None => return Ok(Outcome::Skipped("no known ids")),
    };
    let response = user.delete(resource, &resource.entity_path(&id)).await?;
    let status = expect_status(
        &format!("DELETE {}/id", resource),
        &response,
        StatusCode::NO_CONTENT,
    )?;
    // Courses still listing this id are left alone.
    person.pool(&user.registries).remove(&id);
    Ok(Outcome::Completed(status))
}
