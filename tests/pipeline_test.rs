use anyhow::Result;
use cademycode_etl::config::{ContactInfoPolicy, DuplicateKeyPolicy, FillPolicy, PipelineConfig};
use cademycode_etl::pipeline::{FindingKind, Pipeline};
use cademycode_etl::types::Value;
use cademycode_etl::PipelineError;
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const SCHEMA: &str = r#"
CREATE TABLE cademycode_students (
    uuid INTEGER, name TEXT, dob TEXT, sex TEXT, contact_info TEXT,
    job_id TEXT, num_course_taken TEXT, current_career_path_id TEXT, time_spent_hrs TEXT
);
CREATE TABLE cademycode_courses (career_path_id INTEGER, career_path_name TEXT, hours_to_complete INTEGER);
CREATE TABLE cademycode_student_jobs (job_id INTEGER, job_category TEXT, avg_salary INTEGER);
INSERT INTO cademycode_courses VALUES (1, 'data scientist', 20);
INSERT INTO cademycode_courses VALUES (2, 'data engineer', 20);
INSERT INTO cademycode_student_jobs VALUES (1, 'analytics', 86000);
INSERT INTO cademycode_student_jobs VALUES (2, 'engineer', 101000);
"#;

fn seed_database(dir: &TempDir, students: &str) -> PathBuf {
    let path = dir.path().join("cademycode.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(students).unwrap();
    path
}

fn pipeline(database: &Path) -> Pipeline {
    let config = PipelineConfig {
        database: database.to_path_buf(),
        ..PipelineConfig::default()
    };
    Pipeline::new(config).with_reference_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
}

const JANE_DOE: &str = r#"
INSERT INTO cademycode_students VALUES (
    1, 'Jane Doe', '1990-01-01', 'F',
    '{"mailing_address": "123 Main St, Anytown, New York, 12345", "email": "a@b.com"}',
    '1.0', '4.0', '2.0', '10.5'
);
"#;

#[test]
fn test_end_to_end_jane_doe() -> Result<()> {
    let dir = tempdir()?;
    let db = seed_database(&dir, JANE_DOE);

    let output = pipeline(&db).run()?;
    let table = &output.table;
    assert_eq!(table.len(), 1);
    assert!(output.report.is_empty());

    assert_eq!(
        table.columns(),
        vec![
            "uuid",
            "sex",
            "date_of_birth",
            "job_id",
            "current_career_path_id",
            "num_course_taken",
            "age",
            "age_group",
            "email",
            "address_line_1",
            "city",
            "state",
            "zip_code",
            "time_spent",
            "first_name",
            "last_name",
            "career_path_id",
            "career_path_name",
            "hours_to_complete",
            "job_category",
            "avg_salary",
        ]
    );
    assert_eq!(table.cell(0, "age"), Some(Value::Integer(33)));
    assert_eq!(table.cell(0, "age_group"), Some(Value::Integer(30)));
    assert_eq!(table.cell(0, "date_of_birth"), Some(Value::Date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())));
    assert_eq!(table.cell(0, "address_line_1"), Some(Value::from("123 Main St")));
    assert_eq!(table.cell(0, "city"), Some(Value::from("Anytown")));
    assert_eq!(table.cell(0, "state"), Some(Value::from("New York")));
    assert_eq!(table.cell(0, "zip_code"), Some(Value::from("12345")));
    assert_eq!(table.cell(0, "email"), Some(Value::from("a@b.com")));
    assert_eq!(table.cell(0, "first_name"), Some(Value::from("Jane")));
    assert_eq!(table.cell(0, "last_name"), Some(Value::from("Doe")));
    assert_eq!(table.cell(0, "time_spent"), Some(Value::Duration(Duration::minutes(630))));
    assert_eq!(table.cell(0, "career_path_name"), Some(Value::from("data engineer")));
    assert_eq!(table.cell(0, "career_path_id"), Some(Value::Integer(2)));
    assert_eq!(table.cell(0, "hours_to_complete"), Some(Value::Integer(20)));
    assert_eq!(table.cell(0, "job_category"), Some(Value::from("analytics")));
    assert_eq!(table.cell(0, "avg_salary"), Some(Value::Integer(86000)));
    Ok(())
}

#[test]
fn test_row_count_is_preserved_and_nulls_meet_the_sentinel() -> Result<()> {
    let dir = tempdir()?;
    let students = r#"
        INSERT INTO cademycode_students VALUES (1, 'Ann Lee', '1990-05-05', 'F',
            '{"mailing_address": "1 A St, Reno, Nevada, 89501", "email": "ann@x.com"}', '2.0', NULL, '1.0', '3');
        INSERT INTO cademycode_students VALUES (2, 'Bob Ray', '1985-02-02', 'M',
            '{"mailing_address": "2 B St, Reno, Nevada, 89501", "email": "bob@x.com"}', NULL, '1.0', NULL, NULL);
        INSERT INTO cademycode_students VALUES (3, 'Cy Poe', '2000-07-07', 'N',
            '{"mailing_address": "3 C St, Reno, Nevada, 89501", "email": "cy@x.com"}', '9.0', '2.0', '7.0', '1.25');
    "#;
    let db = seed_database(&dir, students);

    let output = pipeline(&db).run()?;
    assert_eq!(output.table.len(), 3);
    assert_eq!(output.stats.students_read, 3);
    assert_eq!(output.stats.courses_read, 2);
    assert_eq!(output.stats.courses_augmented, 3);

    // Null career path is filled with 0 and lands on the sentinel course
    assert_eq!(output.table.cell(1, "current_career_path_id"), Some(Value::Integer(0)));
    assert_eq!(output.table.cell(1, "career_path_name"), Some(Value::from("not applicable")));
    assert_eq!(output.table.cell(1, "hours_to_complete"), Some(Value::Integer(0)));
    assert_eq!(output.table.cell(1, "time_spent"), Some(Value::Duration(Duration::zero())));

    // Unmatched keys keep the row with null right-side columns
    assert_eq!(output.table.cell(2, "career_path_name"), Some(Value::Null));
    assert_eq!(output.table.cell(2, "job_category"), Some(Value::Null));
    assert_eq!(output.report.count(FindingKind::UnmatchedCareerPath), 1);
    assert_eq!(output.report.count(FindingKind::UnmatchedJob), 1);

    let uuids: Vec<Value> = (0..3).filter_map(|i| output.table.cell(i, "uuid")).collect();
    assert_eq!(uuids, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
    Ok(())
}

#[test]
fn test_missing_database_is_not_created() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nope.db");

    let err = pipeline(&db).run().unwrap_err();
    assert!(matches!(err, PipelineError::DataSource { .. }));
    assert!(!db.exists());
}

#[test]
fn test_duplicate_job_ids_are_rejected_by_default() -> Result<()> {
    let dir = tempdir()?;
    let db = seed_database(&dir, JANE_DOE);
    let conn = Connection::open(&db)?;
    conn.execute_batch("INSERT INTO cademycode_student_jobs VALUES (1, 'analytics', 86000);")?;
    drop(conn);

    let err = pipeline(&db).run().unwrap_err();
    match err {
        PipelineError::SchemaAssumptionViolation { table, detail } => {
            assert_eq!(table, "jobs");
            assert!(detail.contains("job_id 1"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Exact duplicates are tolerated when asked for
    let mut lenient = PipelineConfig {
        database: db.clone(),
        ..PipelineConfig::default()
    };
    lenient.duplicate_key_policy = DuplicateKeyPolicy::DropIdentical;
    let output = Pipeline::new(lenient)
        .with_reference_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .run()?;
    assert_eq!(output.table.len(), 1);
    assert_eq!(output.report.count(FindingKind::DuplicateJoinKey), 1);
    Ok(())
}

#[test]
fn test_contact_info_and_fill_policies() -> Result<()> {
    let dir = tempdir()?;
    let students = r#"
        INSERT INTO cademycode_students VALUES (1, 'Ann Lee', '1990-05-05', NULL, 'not json', '1.0', NULL, NULL, NULL);
        INSERT INTO cademycode_students VALUES (2, 'Bob Ray', '1985-02-02', 'M',
            '{"mailing_address": "2 B St, Reno, Nevada, 89501", "email": "bob@x.com"}', NULL, NULL, NULL, NULL);
    "#;
    let db = seed_database(&dir, students);

    let err = pipeline(&db).run().unwrap_err();
    assert!(matches!(err, PipelineError::MalformedContactInfo { ref uuid, .. } if uuid == "1"));

    let mut config = PipelineConfig {
        database: db.clone(),
        ..PipelineConfig::default()
    };
    config.contact_info_policy = ContactInfoPolicy::Lenient;
    let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    let output = Pipeline::new(config.clone()).with_reference_date(as_of).run()?;
    assert_eq!(output.table.len(), 2);
    assert_eq!(output.report.count(FindingKind::MalformedContactInfo), 1);
    assert_eq!(output.table.cell(0, "email"), Some(Value::from("0")));
    assert_eq!(output.table.cell(0, "sex"), Some(Value::from("0")));

    config.fill_policy = FillPolicy::Typed;
    let output = Pipeline::new(config).with_reference_date(as_of).run()?;
    assert_eq!(output.table.cell(0, "email"), Some(Value::from("")));
    assert_eq!(output.table.cell(0, "city"), Some(Value::from("")));
    assert_eq!(output.table.cell(1, "city"), Some(Value::from("Reno")));
    Ok(())
}

#[test]
fn test_single_quoted_contact_info_is_read_from_the_store() -> Result<()> {
    let dir = tempdir()?;
    let students = r#"
        INSERT INTO cademycode_students VALUES (1, 'Ann Lee', '1990-05-05', 'F',
            '{''mailing_address'': ''1 A St, Reno, Nevada, 89501'', ''email'': ''ann@x.com''}', '1.0', NULL, '1.0', '2');
    "#;
    let db = seed_database(&dir, students);

    let output = pipeline(&db).run()?;
    assert_eq!(output.table.len(), 1);
    assert_eq!(output.table.cell(0, "email"), Some(Value::from("ann@x.com")));
    assert_eq!(output.table.cell(0, "address_line_1"), Some(Value::from("1 A St")));
    assert_eq!(output.table.cell(0, "career_path_name"), Some(Value::from("data scientist")));
    assert!(output.report.is_empty());
    Ok(())
}

#[test]
fn test_rendered_outputs_have_one_line_per_row() -> Result<()> {
    let dir = tempdir()?;
    let db = seed_database(&dir, JANE_DOE);
    let output = pipeline(&db).run()?;

    let mut json = Vec::new();
    output.table.write_json_lines(&mut json, None)?;
    let json = String::from_utf8(json)?;
    let line: serde_json::Value = serde_json::from_str(json.trim_end())?;
    assert_eq!(line["first_name"], "Jane");
    assert_eq!(line["career_path_name"], "data engineer");

    let mut csv = Vec::new();
    output.table.write_csv(&mut csv, None)?;
    let csv = String::from_utf8(csv)?;
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("uuid,sex,date_of_birth"));
    assert_eq!(lines.count(), 1);
    Ok(())
}

#[test]
fn test_convenience_run_returns_the_table() -> Result<()> {
    let dir = tempdir()?;
    let db = seed_database(&dir, JANE_DOE);
    let table = cademycode_etl::run(&db)?;
    assert_eq!(table.len(), 1);
    assert_eq!(table.cell(0, "job_category"), Some(Value::from("analytics")));
    Ok(())
}
