use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Kinds of row-level data-quality problems the pipeline tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    UnparsableDateOfBirth,
    FutureDateOfBirth,
    MalformedContactInfo,
    MalformedAddress,
    InvalidTimeSpent,
    ExtraNameTokens,
    DuplicateJoinKey,
    UnmatchedCareerPath,
    UnmatchedJob,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::UnparsableDateOfBirth => "unparsable_date_of_birth",
            FindingKind::FutureDateOfBirth => "future_date_of_birth",
            FindingKind::MalformedContactInfo => "malformed_contact_info",
            FindingKind::MalformedAddress => "malformed_address",
            FindingKind::InvalidTimeSpent => "invalid_time_spent",
            FindingKind::ExtraNameTokens => "extra_name_tokens",
            FindingKind::DuplicateJoinKey => "duplicate_join_key",
            FindingKind::UnmatchedCareerPath => "unmatched_career_path",
            FindingKind::UnmatchedJob => "unmatched_job",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// Student uuid or right-side key the finding refers to
    pub subject: String,
    pub detail: String,
}

/// Sink for data-quality findings, handed to each stage by the orchestrator
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityReport {
    findings: Vec<Finding>,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: FindingKind, subject: impl fmt::Display, detail: impl Into<String>) {
        let finding = Finding {
            kind,
            subject: subject.to_string(),
            detail: detail.into(),
        };
        warn!(kind = %finding.kind, subject = %finding.subject, "{}", finding.detail);
        crate::metrics::quality::finding(kind.as_str());
        self.findings.push(finding);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<FindingKind, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.kind).or_insert(0) += 1;
        }
        counts
    }
}
