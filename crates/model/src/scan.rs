//! Security findings and pull request risk assessment.
//!
//! The scanners themselves are external services. This module only folds their
//! findings into one [`RiskAssessment`] that the scan gate posts as a comment.

use serde::{Deserialize, Serialize};

/// Severity of a finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Note,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Note,
    ];

    /// Parses the severity vocabularies used by dependency advisories and
    /// static-analysis rules.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" | "error" => Some(Self::High),
            "medium" | "moderate" | "warning" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "note" | "none" => Some(Self::Note),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Note => "note",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Which external scanner produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    /// A vulnerable dependency introduced by the pull request.
    DependencyReview,
    /// A static-analysis alert on the pull request ref.
    CodeScanning,
}

/// One finding from an external scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub source: FindingSource,
    pub severity: Severity,
    /// Advisory id or rule id.
    pub identifier: String,
    pub title: String,
    /// Package coordinate or `path:line`.
    pub location: Option<String>,
    pub url: Option<String>,
}

/// Overall risk of merging a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Note | Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Summary of all findings on one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// A dependency finding reached the failure threshold.
    pub blocking: bool,
    pub threshold: Severity,
    /// Findings sorted most severe first.
    pub findings: Vec<Finding>,
}

impl RiskAssessment {
    /// Number of findings at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Folds scanner findings into an assessment.
///
/// Only dependency-review findings at or above `threshold` block; static
/// analysis findings raise the level but are advisory.
pub fn assess_risk(mut findings: Vec<Finding>, threshold: Severity) -> RiskAssessment {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    let level = findings
        .iter()
        .map(|f| RiskLevel::from(f.severity))
        .max()
        .unwrap_or(RiskLevel::None);
    let blocking = findings
        .iter()
        .any(|f| f.source == FindingSource::DependencyReview && f.severity >= threshold);

    RiskAssessment {
        level,
        blocking,
        threshold,
        findings,
    }
}
