use crate::constants::{COURSES_TABLE, JOBS_TABLE, STUDENTS_TABLE};
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "cademycode.toml";
pub const DEFAULT_DATABASE: &str = "./data/cademycode.db";
pub const ENV_DATABASE: &str = "CADEMYCODE_DB";
pub const ENV_LOG_DIR: &str = "CADEMYCODE_LOG_DIR";

static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier pattern"));

/// How nulls left after the contact/address steps are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Every null becomes 0; text columns receive the text "0"
    #[default]
    LiteralZero,
    /// Text columns get "", numeric columns get 0
    Typed,
}

/// What to do with a contact_info payload that does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ContactInfoPolicy {
    /// Abort the run with a malformed contact info error
    #[default]
    Strict,
    /// Null-fill the row's contact fields and record a finding
    Lenient,
}

/// What to do when a join key repeats on the right side of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Any repeated key is a schema assumption violation
    #[default]
    Reject,
    /// Exact duplicate rows collapse to one; conflicting rows are still rejected
    DropIdentical,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub students: String,
    pub courses: String,
    pub jobs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            students: STUDENTS_TABLE.to_string(),
            courses: COURSES_TABLE.to_string(),
            jobs: JOBS_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub file_name: String,
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            file_name: "pipeline.log".to_string(),
            file_logging: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: PathBuf,
    pub tables: TableNames,
    pub fill_policy: FillPolicy,
    pub contact_info_policy: ContactInfoPolicy,
    pub duplicate_key_policy: DuplicateKeyPolicy,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            tables: TableNames::default(),
            fill_policy: FillPolicy::default(),
            contact_info_policy: ContactInfoPolicy::default(),
            duplicate_key_policy: DuplicateKeyPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config file (an explicit path must exist, the default one may be absent),
    /// then applies `.env` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        dotenv::dotenv().ok();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database = PathBuf::from(db);
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            self.logging.log_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (role, name) in [
            ("students", &self.tables.students),
            ("courses", &self.tables.courses),
            ("jobs", &self.tables.jobs),
        ] {
            if !SQL_IDENTIFIER.is_match(name) {
                return Err(PipelineError::Config(format!(
                    "{} table name '{}' is not a plain SQL identifier",
                    role, name
                )));
            }
        }
        Ok(())
    }
}
