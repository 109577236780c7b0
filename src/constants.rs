//! Table and column name constants shared by the reader, normalizer and joiner.

// Default source table names in the cademycode database
pub const STUDENTS_TABLE: &str = "cademycode_students";
pub const COURSES_TABLE: &str = "cademycode_courses";
pub const JOBS_TABLE: &str = "cademycode_student_jobs";

// Raw student columns
pub const COL_UUID: &str = "uuid";
pub const COL_NAME: &str = "name";
pub const COL_SEX: &str = "sex";
pub const COL_DOB: &str = "dob";
pub const COL_CONTACT_INFO: &str = "contact_info";
pub const COL_JOB_ID: &str = "job_id";
pub const COL_CAREER_PATH_FK: &str = "current_career_path_id";
pub const COL_NUM_COURSE_TAKEN: &str = "num_course_taken";
pub const COL_TIME_SPENT_HRS: &str = "time_spent_hrs";

// Normalized student columns
pub const COL_DATE_OF_BIRTH: &str = "date_of_birth";
pub const COL_AGE: &str = "age";
pub const COL_AGE_GROUP: &str = "age_group";
pub const COL_EMAIL: &str = "email";
pub const COL_MAILING_ADDRESS: &str = "mailing_address";
pub const COL_ADDRESS_LINE_1: &str = "address_line_1";
pub const COL_CITY: &str = "city";
pub const COL_STATE: &str = "state";
pub const COL_ZIP_CODE: &str = "zip_code";
pub const COL_TIME_SPENT: &str = "time_spent";
pub const COL_FIRST_NAME: &str = "first_name";
pub const COL_LAST_NAME: &str = "last_name";

// Course columns
pub const COL_CAREER_PATH_ID: &str = "career_path_id";
pub const COL_CAREER_PATH_NAME: &str = "career_path_name";
pub const COL_HOURS_TO_COMPLETE: &str = "hours_to_complete";

// Sentinel course row for students without a career path
pub const SENTINEL_CAREER_PATH_ID: i64 = 0;
pub const SENTINEL_CAREER_PATH_NAME: &str = "not applicable";
pub const SENTINEL_HOURS_TO_COMPLETE: i64 = 0;

/// Days per year used for age derivation, accounts for leap years
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Accepted date of birth layouts, tried in order
pub const DOB_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
pub const DOB_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Student column order before the contact-info keys are spliced in
pub fn student_leading_columns() -> Vec<&'static str> {
    vec![
        COL_UUID,
        COL_SEX,
        COL_DATE_OF_BIRTH,
        COL_JOB_ID,
        COL_CAREER_PATH_FK,
        COL_NUM_COURSE_TAKEN,
        COL_AGE,
        COL_AGE_GROUP,
        COL_EMAIL,
    ]
}

/// Student column order after the contact-info keys
pub fn student_trailing_columns() -> Vec<&'static str> {
    vec![
        COL_ADDRESS_LINE_1,
        COL_CITY,
        COL_STATE,
        COL_ZIP_CODE,
        COL_TIME_SPENT,
        COL_FIRST_NAME,
        COL_LAST_NAME,
    ]
}

pub fn course_columns() -> Vec<&'static str> {
    vec![COL_CAREER_PATH_ID, COL_CAREER_PATH_NAME, COL_HOURS_TO_COMPLETE]
}
