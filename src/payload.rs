//! Randomized request bodies for creating and updating courses, students and instructors.
//!
//! Nothing here touches the shared registries: functions that depend on a course's
//! current state are handed a copy of it.

use chrono::{Duration, Local, NaiveDate};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde::Serialize;
use std::convert::TryFrom;

use crate::registry::Course;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Body of `POST /courses` and `PUT /courses/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseBody {
    pub course_code: String,
    pub title: String,
    pub description: String,
    pub language: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub max_students: u32,
}

/// Body of `POST` and `PUT` requests for students and instructors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonBody {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: String,
}

/// How birth dates of generated people are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirthDates {
    /// 1 to 30 days in the future. Services are expected to accept or reject these as
    /// they see fit, so this is the default.
    NearFuture,
    /// Between 18 and 65 years in the past.
    Past,
}

/// Source of realistic personal details.
pub trait PersonFaker: Send + Sync {
    fn first_name(&self, rng: &mut dyn RngCore) -> String;
    fn last_name(&self, rng: &mut dyn RngCore) -> String;
    fn email(&self, first_name: &str, last_name: &str, rng: &mut dyn RngCore) -> String;
    fn phone_number(&self, rng: &mut dyn RngCore) -> String;
}

const FIRST_NAMES: &[&str] = &[
    "Olivia", "Liam", "Emma", "Noah", "Amelia", "Oliver", "Sophia", "Elijah", "Mia", "James",
    "Harper", "Lucas", "Evelyn", "Mateo", "Ava", "Levi", "Isla", "Ethan", "Nora", "Kai",
    "Oksana", "Taras", "Mariia", "Andrii", "Sofiia", "Dmytro", "Yuki", "Ravi", "Amara", "Chen",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore",
    "Jackson", "Martin", "Lee", "Shevchenko", "Kovalenko", "Bondarenko", "Tkachenko", "Nakamura",
    "Patel", "Okafor", "Nguyen", "Kim", "Schmidt",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

/// A [`PersonFaker`] drawing from built-in word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordListFaker;

impl PersonFaker for WordListFaker {
    fn first_name(&self, rng: &mut dyn RngCore) -> String {
        FIRST_NAMES.choose(rng).unwrap_or(&"Alex").to_string()
    }

    fn last_name(&self, rng: &mut dyn RngCore) -> String {
        LAST_NAMES.choose(rng).unwrap_or(&"Doe").to_string()
    }

    fn email(&self, first_name: &str, last_name: &str, rng: &mut dyn RngCore) -> String {
        format!(
            "{}.{}{}@{}",
            first_name.to_lowercase(),
            last_name.to_lowercase(),
            rng.random_range(1..1000),
            EMAIL_DOMAINS.choose(rng).unwrap_or(&"example.com")
        )
    }

    fn phone_number(&self, rng: &mut dyn RngCore) -> String {
        format!(
            "+1-{:03}-{:03}-{:04}",
            rng.random_range(200..1000),
            rng.random_range(0..1000),
            rng.random_range(0..10_000)
        )
    }
}

fn days_from_today(days: i64) -> NaiveDate {
    Local::now().date_naive() + Duration::days(days)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn course_details(rng: &mut dyn RngCore, max_students: u32) -> CourseBody {
    CourseBody {
        course_code: format!("COURSE-{}", rng.random_range(1000..=9999)),
        title: format!("Course Title {}", rng.random_range(1..=100)),
        description: "This is a description of the course.".to_string(),
        language: "English".to_string(),
        status: "Active".to_string(),
        start_date: format_date(days_from_today(rng.random_range(1..=30))),
        end_date: format_date(days_from_today(rng.random_range(31..=60))),
        max_students,
    }
}

/// Body for creating a new course, with a capacity between 1 and 50.
pub fn course_body(rng: &mut dyn RngCore) -> CourseBody {
    let max_students = rng.random_range(1..=50);
    course_details(rng, max_students)
}

/// New capacity for an updated course: never below the current enrollment, and grown
/// by a random amount between zero and the current capacity.
pub fn updated_capacity(course: &Course, rng: &mut dyn RngCore) -> u32 {
    let enrolled = u32::try_from(course.student_ids.len()).unwrap_or(u32::MAX);
    let grown = course
        .max_students
        .saturating_add(rng.random_range(0..=course.max_students));
    enrolled.max(grown)
}

/// Body for replacing an existing course.
pub fn course_update_body(course: &Course, rng: &mut dyn RngCore) -> CourseBody {
    let max_students = updated_capacity(course, rng);
    course_details(rng, max_students)
}

/// Body for creating or replacing a student or instructor.
pub fn person_body(
    faker: &dyn PersonFaker,
    birth_dates: BirthDates,
    rng: &mut dyn RngCore,
) -> PersonBody {
    let first_name = faker.first_name(rng);
    let last_name = faker.last_name(rng);
    let birth_date = match birth_dates {
        BirthDates::NearFuture => days_from_today(rng.random_range(1..=30)),
        BirthDates::Past => days_from_today(-rng.random_range(18 * 365..=65 * 365)),
    };
    PersonBody {
        email: faker.email(&first_name, &last_name, rng),
        phone: faker.phone_number(rng),
        first_name,
        last_name,
        birth_date: format_date(birth_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EntityId;

    fn parse_date(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap()
    }

    #[test]
    fn new_course() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let body = course_body(&mut rng);
            assert!((1..=50).contains(&body.max_students));
            assert!(body.course_code.starts_with("COURSE-"));
            assert_eq!(body.course_code.len(), "COURSE-".len() + 4);
            let start = parse_date(&body.start_date);
            let end = parse_date(&body.end_date);
            assert!(start > Local::now().date_naive());
            assert!(end > start);
        }
    }

    #[test]
    fn course_serializes_camel_case() {
        let body = course_body(&mut rand::rng());
        let value = serde_json::to_value(&body).unwrap();
        for key in &[
            "courseCode",
            "title",
            "description",
            "language",
            "status",
            "startDate",
            "endDate",
            "maxStudents",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn updated_capacity_never_shrinks_below_enrollment() {
        let mut rng = rand::rng();
        let mut course = Course::new(EntityId::from("c1"), 2);
        course.student_ids = (0..7)
            .map(|i| EntityId::from(format!("s{}", i).as_str()))
            .collect();
        for _ in 0..100 {
            let capacity = updated_capacity(&course, &mut rng);
            assert!(capacity >= 7);
        }

        let course = Course::new(EntityId::from("c2"), 10);
        for _ in 0..100 {
            let capacity = updated_capacity(&course, &mut rng);
            assert!((10..=20).contains(&capacity));
        }

        // Zero capacity stays zero.
        let course = Course::new(EntityId::from("c3"), 0);
        assert_eq!(course_update_body(&course, &mut rng).max_students, 0);
    }

    #[test]
    fn updated_capacity_saturates() {
        let mut rng = rand::rng();
        let course = Course::new(EntityId::from("c1"), u32::MAX);
        for _ in 0..100 {
            assert_eq!(updated_capacity(&course, &mut rng), u32::MAX);
        }
        let course = Course::new(EntityId::from("c2"), u32::MAX - 1);
        for _ in 0..100 {
            assert!(updated_capacity(&course, &mut rng) >= u32::MAX - 1);
        }
    }

    #[test]
    fn person() {
        let mut rng = rand::rng();
        let today = Local::now().date_naive();

        let body = person_body(&WordListFaker, BirthDates::NearFuture, &mut rng);
        assert!(FIRST_NAMES.contains(&body.first_name.as_str()));
        assert!(LAST_NAMES.contains(&body.last_name.as_str()));
        assert!(body.email.starts_with(&body.first_name.to_lowercase()));
        assert!(body.email.contains('@'));
        assert!(body.phone.starts_with("+1-"));
        let birth_date = parse_date(&body.birth_date);
        assert!(birth_date > today && birth_date <= today + Duration::days(30));

        let body = person_body(&WordListFaker, BirthDates::Past, &mut rng);
        assert!(parse_date(&body.birth_date) < today - Duration::days(17 * 365));

        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("firstName").is_some());
        assert!(value.get("birthDate").is_some());
    }
}
