//! Validation report types for structured error reporting.

use std::fmt;

use serde_json::{json, Value};

use crate::frames::FrameKey;
use crate::ids::{EntityHash, SpaceId};

/// The result of validating a label row.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns true if validation passed in strict mode (no errors or warnings).
    pub fn is_ok_strict(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues carrying `code`, in report order.
    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    /// The report in the shape printed by `validate --output json`.
    pub fn to_json(&self) -> Value {
        json!({
            "error_count": self.error_count(),
            "warning_count": self.warning_count(),
            "issues": self.issues.iter().map(|issue| json!({
                "severity": issue.severity.as_str(),
                "code": format!("{:?}", issue.code),
                "message": issue.message,
                "context": issue.context.to_string(),
            })).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single validation issue (error or warning).
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: Severity,

    /// A stable code for the issue type.
    pub code: IssueCode,

    pub message: String,

    /// Where the issue was found.
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Serializes fine but probably not what the annotator meant.
    Warning,
    /// The document would be rejected or is corrupt.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A stable code identifying the type of validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IssueCode {
    // Geometry issues
    /// A geometry has NaN or infinite coordinates.
    GeometryNotFinite,
    /// A normalized coordinate lies outside `[0, 1]`.
    CoordinateOutOfBounds,
    /// A polygon ring has fewer than three points.
    PolygonTooFewPoints,
    /// A polyline has fewer than two points.
    PolylineTooFewPoints,
    /// A bitmask's extent differs from its media's pixel size.
    BitmaskDimensionMismatch,
    /// A bitmask's RLE string does not decode to its extent.
    InvalidRle,

    // Metadata issues
    /// Confidence outside `[0, 1]`.
    ConfidenceOutOfRange,

    // Entity issues
    /// A required top-level attribute has no answer.
    MissingRequiredAnswer,
    /// An entity exists in the registry but is neither placed nor attached.
    DetachedEntity,
}

/// Where a validation issue was found.
#[derive(Clone, Debug, PartialEq)]
pub enum IssueContext {
    LabelRow,
    /// An annotation on a space or on the label row's own frames.
    Annotation {
        space_id: SpaceId,
        entity: EntityHash,
        key: FrameKey,
    },
    Entity { hash: EntityHash },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::LabelRow => write!(f, "label row"),
            IssueContext::Annotation {
                space_id,
                entity,
                key,
            } => write!(f, "space '{}' entity {} at {}", space_id, entity, key),
            IssueContext::Entity { hash } => write!(f, "entity {}", hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_strictness() {
        let mut report = ValidationReport::new();
        assert!(report.is_ok_strict());
        report.add(ValidationIssue::warning(
            IssueCode::ConfidenceOutOfRange,
            "confidence 1.5",
            IssueContext::LabelRow,
        ));
        assert!(report.is_ok());
        assert!(!report.is_ok_strict());
        report.add(ValidationIssue::error(
            IssueCode::InvalidRle,
            "bad counts",
            IssueContext::Entity { hash: "e1".into() },
        ));
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.with_code(IssueCode::InvalidRle).count(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut report = ValidationReport::new();
        report.add(ValidationIssue::error(
            IssueCode::PolygonTooFewPoints,
            "ring 0 has 2 points",
            IssueContext::Annotation {
                space_id: SpaceId::root(),
                entity: "o1".into(),
                key: FrameKey::Frame(4),
            },
        ));
        let json = report.to_json();
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["issues"][0]["severity"], "error");
        assert_eq!(json["issues"][0]["code"], "PolygonTooFewPoints");
        assert!(json["issues"][0]["context"].as_str().unwrap().contains("at 4"));
    }
}
