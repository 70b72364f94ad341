use campus_load::prelude::*;

fn main() -> Result<(), LoadTestError> {
    LoadTest::initialize()?
        .register_user_kind(course_user())
        .register_user_kind(student_user())
        .register_user_kind(instructor_user())
        // Where the services listen when run locally, overridden by --host and
        // the per-service host options.
        .set_default(ConfigDefault::CoursesHost, "http://localhost:5001")?
        .set_default(ConfigDefault::StudentsHost, "http://localhost:5002")?
        .set_default(ConfigDefault::InstructorsHost, "http://localhost:5003")?
        .execute()?;

    Ok(())
}
