use crate::domain::Course;
use tracing::info;

/// Appends the "not applicable" career path so students defaulted to
/// `current_career_path_id = 0` have a join target.
///
/// The append is unconditional: a table that already ends with the sentinel
/// gets a second one.
pub fn augment_courses(mut courses: Vec<Course>) -> Vec<Course> {
    info!("Managing courses table...");
    courses.push(Course::not_applicable());
    courses
}
