//! Shared, lock-guarded models of the entities believed to exist on the remote services.
//!
//! All virtual users share one [`Registries`] instance. Each registry owns its own
//! [`RwLock`]: every mutation takes the write lock, and every compound
//! "find then mutate" sequence runs inside a single critical section so concurrent
//! users can't lose each other's updates.
//!
//! The remote services are the source of truth. A registry is only advisory: an id
//! picked at random may already have been deleted remotely, in which case the task
//! using it gets a non-success status and leaves the registry alone.

use rand::seq::IndexedRandom;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::api::{CourseRecord, EntityId};

/// Instructor membership of a course is capped at this many.
pub const MAX_INSTRUCTORS: usize = 10;

/// A course as tracked locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub course_id: EntityId,
    pub student_ids: Vec<EntityId>,
    pub instructor_ids: Vec<EntityId>,
    pub max_students: u32,
}
impl Course {
    /// A freshly created course with no members.
    pub fn new(course_id: EntityId, max_students: u32) -> Self {
        Course {
            course_id,
            student_ids: Vec::new(),
            instructor_ids: Vec::new(),
            max_students,
        }
    }

    /// How many more students can be added before reaching `max_students`.
    pub fn remaining_student_slots(&self) -> usize {
        (self.max_students as usize).saturating_sub(self.student_ids.len())
    }

    /// How many more instructors can be added before reaching [`MAX_INSTRUCTORS`].
    pub fn remaining_instructor_slots(&self) -> usize {
        MAX_INSTRUCTORS.saturating_sub(self.instructor_ids.len())
    }
}
impl From<CourseRecord> for Course {
    fn from(record: CourseRecord) -> Self {
        Course {
            course_id: record.id,
            student_ids: dedup(record.students),
            instructor_ids: dedup(record.instructors),
            max_students: record.max_students,
        }
    }
}

/// Which membership list of a course an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Students,
    Instructors,
}
impl Membership {
    fn members<'a>(&self, course: &'a Course) -> &'a Vec<EntityId> {
        match self {
            Membership::Students => &course.student_ids,
            Membership::Instructors => &course.instructor_ids,
        }
    }

    fn members_mut<'a>(&self, course: &'a mut Course) -> &'a mut Vec<EntityId> {
        match self {
            Membership::Students => &mut course.student_ids,
            Membership::Instructors => &mut course.instructor_ids,
        }
    }
}

// Remove duplicates, keeping the first occurrence of each id.
fn dedup(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut unique: Vec<EntityId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

// Registry data stays structurally valid even if a holder panicked, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// All courses believed to exist, with their membership and capacity.
#[derive(Debug, Default)]
pub struct CourseRegistry {
    courses: RwLock<Vec<Course>>,
}
impl CourseRegistry {
    pub fn new() -> Self {
        CourseRegistry::default()
    }

    /// A copy of every course currently tracked.
    pub fn snapshot(&self) -> Vec<Course> {
        read(&self.courses).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.courses).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.courses).is_empty()
    }

    /// A copy of the course with the given id, if still tracked.
    pub fn get(&self, course_id: &EntityId) -> Option<Course> {
        read(&self.courses)
            .iter()
            .find(|course| &course.course_id == course_id)
            .cloned()
    }

    /// A copy of a random course, or `None` if the registry is empty.
    pub fn random(&self) -> Option<Course> {
        read(&self.courses).choose(&mut rand::rng()).cloned()
    }

    /// A copy of a random course that has at least one member of the given kind.
    pub fn random_with_members(&self, membership: Membership) -> Option<Course> {
        let courses = read(&self.courses);
        let candidates: Vec<&Course> = courses
            .iter()
            .filter(|course| !membership.members(course).is_empty())
            .collect();
        candidates.choose(&mut rand::rng()).map(|course| (*course).clone())
    }

    /// Track a course. Returns `false` and leaves the registry unchanged if a course
    /// with the same id is already tracked.
    pub fn insert(&self, course: Course) -> bool {
        let mut courses = write(&self.courses);
        if courses
            .iter()
            .any(|existing| existing.course_id == course.course_id)
        {
            return false;
        }
        courses.push(course);
        true
    }

    /// Track every course not already tracked, returning how many were added.
    pub fn merge(&self, records: Vec<Course>) -> usize {
        let mut courses = write(&self.courses);
        let mut added = 0;
        for course in records {
            if !courses
                .iter()
                .any(|existing| existing.course_id == course.course_id)
            {
                courses.push(course);
                added += 1;
            }
        }
        added
    }

    /// Stop tracking a course. Returns `false` if it wasn't tracked.
    pub fn remove(&self, course_id: &EntityId) -> bool {
        let mut courses = write(&self.courses);
        let before = courses.len();
        courses.retain(|course| &course.course_id != course_id);
        courses.len() != before
    }

    /// Overwrite a course's membership list with an authoritative list returned by the
    /// remote service. Returns `false` if the course is no longer tracked.
    pub fn replace_membership(
        &self,
        course_id: &EntityId,
        membership: Membership,
        members: Vec<EntityId>,
    ) -> bool {
        let members = dedup(members);
        let mut courses = write(&self.courses);
        match courses
            .iter_mut()
            .find(|course| &course.course_id == course_id)
        {
            Some(course) => {
                *membership.members_mut(course) = members;
                true
            }
            None => false,
        }
    }

    pub fn replace_students(&self, course_id: &EntityId, students: Vec<EntityId>) -> bool {
        self.replace_membership(course_id, Membership::Students, students)
    }

    pub fn replace_instructors(&self, course_id: &EntityId, instructors: Vec<EntityId>) -> bool {
        self.replace_membership(course_id, Membership::Instructors, instructors)
    }
}

/// A set of student or instructor ids believed to exist.
#[derive(Debug, Default)]
pub struct IdPool {
    ids: RwLock<Vec<EntityId>>,
}
impl IdPool {
    pub fn new() -> Self {
        IdPool::default()
    }

    pub fn snapshot(&self) -> Vec<EntityId> {
        read(&self.ids).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.ids).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.ids).is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        read(&self.ids).contains(id)
    }

    /// A random id, or `None` if the pool is empty.
    pub fn random(&self) -> Option<EntityId> {
        read(&self.ids).choose(&mut rand::rng()).cloned()
    }

    /// Up to `count` distinct random ids that are not in `exclude`.
    pub fn sample_excluding(&self, count: usize, exclude: &[EntityId]) -> Vec<EntityId> {
        let ids = read(&self.ids);
        let eligible: Vec<&EntityId> = ids.iter().filter(|id| !exclude.contains(id)).collect();
        eligible
            .choose_multiple(&mut rand::rng(), count)
            .map(|id| (*id).clone())
            .collect()
    }

    /// Add an id. Returns `false` if it was already present.
    pub fn insert(&self, id: EntityId) -> bool {
        let mut ids = write(&self.ids);
        if ids.contains(&id) {
            return false;
        }
        ids.push(id);
        true
    }

    /// Add every id not already present, returning how many were added.
    pub fn merge(&self, new_ids: Vec<EntityId>) -> usize {
        let mut ids = write(&self.ids);
        let mut added = 0;
        for id in new_ids {
            if !ids.contains(&id) {
                ids.push(id);
                added += 1;
            }
        }
        added
    }

    /// Remove an id. Returns `false` if it wasn't present.
    pub fn remove(&self, id: &EntityId) -> bool {
        let mut ids = write(&self.ids);
        match ids.iter().position(|existing| existing == id) {
            Some(index) => {
                // Order is irrelevant.
                ids.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

/// The three registries shared by every virtual user of a load test.
#[derive(Debug, Default)]
pub struct Registries {
    pub courses: CourseRegistry,
    pub students: IdPool,
    pub instructors: IdPool,
}
impl Registries {
    pub fn new() -> Self {
        Registries::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ids(raw: &[&str]) -> Vec<EntityId> {
        raw.iter().map(|id| EntityId::from(*id)).collect()
    }

    #[test]
    fn course_insert_and_remove() {
        let registry = CourseRegistry::new();
        assert!(registry.random().is_none());

        assert!(registry.insert(Course::new("c1".into(), 5)));
        assert!(!registry.insert(Course::new("c1".into(), 9)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&"c1".into()).unwrap().max_students, 5);

        assert!(registry.remove(&"c1".into()));
        assert!(!registry.remove(&"c1".into()));
        assert!(registry.is_empty());
    }

    #[test]
    fn replace_membership_overwrites() {
        let registry = CourseRegistry::new();
        registry.insert(Course::new("c1".into(), 5));
        assert!(registry.replace_students(&"c1".into(), ids(&["s3"])));
        assert!(registry.replace_students(&"c1".into(), ids(&["s1", "s2", "s1"])));
        let course = registry.get(&"c1".into()).unwrap();
        assert_eq!(course.student_ids, ids(&["s1", "s2"]));
        assert!(course.instructor_ids.is_empty());

        // Applying the same list twice is the same as applying it once.
        let once = registry.snapshot();
        assert!(registry.replace_students(&"c1".into(), ids(&["s1", "s2"])));
        assert_eq!(registry.snapshot(), once);

        // Course deleted in the meantime: nothing to update.
        assert!(!registry.replace_instructors(&"c2".into(), ids(&["i1"])));
    }

    #[test]
    fn random_with_members() {
        let registry = CourseRegistry::new();
        registry.insert(Course::new("c1".into(), 5));
        assert!(registry.random_with_members(Membership::Students).is_none());
        registry.insert(Course::new("c2".into(), 5));
        registry.replace_instructors(&"c2".into(), ids(&["i1"]));
        assert!(registry.random_with_members(Membership::Students).is_none());
        let course = registry
            .random_with_members(Membership::Instructors)
            .unwrap();
        assert_eq!(course.course_id, EntityId::from("c2"));
    }

    #[test]
    fn remaining_slots() {
        let mut course = Course::new("c1".into(), 3);
        assert_eq!(course.remaining_student_slots(), 3);
        course.student_ids = ids(&["s1", "s2", "s3", "s4"]);
        assert_eq!(course.remaining_student_slots(), 0);
        assert_eq!(course.remaining_instructor_slots(), MAX_INSTRUCTORS);
    }

    #[test]
    fn merge_skips_known_entities() {
        let pool = IdPool::new();
        assert_eq!(pool.merge(ids(&["s1", "s2", "s1"])), 2);
        assert_eq!(pool.merge(ids(&["s2", "s3"])), 1);
        assert_eq!(pool.len(), 3);

        let courses = CourseRegistry::new();
        let batch = vec![Course::new("c1".into(), 1), Course::new("c2".into(), 2)];
        assert_eq!(courses.merge(batch.clone()), 2);
        assert_eq!(courses.merge(batch), 0);
        assert_eq!(courses.len(), 2);
    }

    #[test]
    fn sample_excluding() {
        let pool = IdPool::new();
        pool.merge(ids(&["s1", "s2", "s3", "s4"]));
        let exclude = ids(&["s1", "s2"]);
        let sample = pool.sample_excluding(10, &exclude);
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|id| !exclude.contains(id)));
        assert_ne!(sample[0], sample[1]);
        assert!(pool.sample_excluding(3, &pool.snapshot()).is_empty());
    }

    #[test]
    fn concurrent_mutations_never_duplicate() {
        let registries = Arc::new(Registries::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let registries = Arc::clone(&registries);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let id = EntityId::from(format!("id{}", i % 50).as_str());
                    registries.students.insert(id.clone());
                    registries.courses.insert(Course::new(id.clone(), 3));
                    if (i + worker) % 3 == 0 {
                        registries.students.remove(&id);
                        registries.courses.remove(&id);
                    }
                    registries
                        .courses
                        .replace_students(&id, vec![id.clone(), id.clone()]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let students = registries.students.snapshot();
        let mut unique = students.clone();
        unique.sort_by_key(|id| id.to_string());
        unique.dedup();
        assert_eq!(unique.len(), students.len());

        let courses = registries.courses.snapshot();
        let mut course_ids: Vec<String> =
            courses.iter().map(|c| c.course_id.to_string()).collect();
        course_ids.sort();
        course_ids.dedup();
        assert_eq!(course_ids.len(), courses.len());
        assert!(courses.iter().all(|c| c.student_ids.len() <= 1));
    }
}
