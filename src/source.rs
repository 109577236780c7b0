//! Source reader: fetches the student, course and job tables.

use crate::config::TableNames;
use crate::error::{PipelineError, Result};
use crate::types::{RawTable, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The three source tables, always in student, course, job order
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTables {
    pub students: RawTable,
    pub courses: RawTable,
    pub jobs: RawTable,
}

/// Anything that can hand over the three named tables
pub trait TableSource {
    /// Identifies the backing store in logs and errors
    fn identifier(&self) -> String;

    fn read_tables(&self, tables: &TableNames) -> Result<SourceTables>;
}

/// Reads from a SQLite database file opened read-only.
///
/// The connection lives only for the duration of [`TableSource::read_tables`]
/// and is closed on both the success and the failure path.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(&self.path, flags)
            .map_err(|e| PipelineError::data_source(self.identifier(), e))
    }

    fn read_table(&self, conn: &Connection, name: &str) -> Result<RawTable> {
        let started = Instant::now();
        let query = format!("SELECT * FROM \"{}\"", name);
        let table = select_all(conn, name, &query)
            .map_err(|e| PipelineError::data_source(self.identifier(), e))?;
        debug!(
            table = name,
            rows = table.len(),
            columns = table.columns.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Read table"
        );
        crate::metrics::source::rows_extracted(name, table.len());
        Ok(table)
    }
}

fn select_all(conn: &Connection, name: &str, query: &str) -> rusqlite::Result<RawTable> {
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut table = RawTable::new(name, columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(to_value(row.get_ref(i)?));
        }
        table.rows.push(values);
    }
    Ok(table)
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl TableSource for SqliteSource {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn read_tables(&self, tables: &TableNames) -> Result<SourceTables> {
        info!("Retrieving tables from {}...", self.identifier());
        let conn = self.open()?;

        let result = (|| -> Result<SourceTables> {
            Ok(SourceTables {
                students: self.read_table(&conn, &tables.students)?,
                courses: self.read_table(&conn, &tables.courses)?,
                jobs: self.read_table(&conn, &tables.jobs)?,
            })
        })();

        if let Err((_, e)) = conn.close() {
            warn!("Failed to close connection to {}: {}", self.identifier(), e);
        }

        if let Err(e) = &result {
            tracing::error!("Error retrieving tables from {}: {}", self.identifier(), e);
        }
        result
    }
}

/// Serves tables held in memory, keyed by table name
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    tables: HashMap<String, RawTable>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: HashMap::new(),
        }
    }

    pub fn with_table(mut self, table: RawTable) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    fn table(&self, name: &str) -> Result<RawTable> {
        let table = self.tables.get(name).cloned().ok_or_else(|| {
            PipelineError::data_source(&self.name, format!("no such table: {}", name))
        })?;
        crate::metrics::source::rows_extracted(name, table.len());
        Ok(table)
    }
}

impl TableSource for InMemorySource {
    fn identifier(&self) -> String {
        self.name.clone()
    }

    fn read_tables(&self, tables: &TableNames) -> Result<SourceTables> {
        Ok(SourceTables {
            students: self.table(&tables.students)?,
            courses: self.table(&tables.courses)?,
            jobs: self.table(&tables.jobs)?,
        })
    }
}
