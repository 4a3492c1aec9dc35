//! Validation issue types
//!
//! Defines the accumulated `ValidationResult` along with machine-readable
//! issue codes and the fatal schema-mismatch fault.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingOverlayId,
    MissingVersion,
    /// No capability/workflow/dataView/presentation/operation set
    MissingTarget,
    EmptyModifications,
    MissingField,
    MissingLabel,
    EmptyReorder,
    BlankReorderEntry,
    DuplicateReorderEntry,
    /// `setDefault` without a `value` key (explicit null is fine)
    MissingDefaultValue,
    MissingHelpText,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::MissingOverlayId => "MISSING_OVERLAY_ID",
            Self::MissingVersion => "MISSING_VERSION",
            Self::MissingTarget => "MISSING_TARGET",
            Self::EmptyModifications => "EMPTY_MODIFICATIONS",
            Self::MissingField => "MISSING_FIELD",
            Self::MissingLabel => "MISSING_LABEL",
            Self::EmptyReorder => "EMPTY_REORDER",
            Self::BlankReorderEntry => "BLANK_REORDER_ENTRY",
            Self::DuplicateReorderEntry => "DUPLICATE_REORDER_ENTRY",
            Self::MissingDefaultValue => "MISSING_DEFAULT_VALUE",
            Self::MissingHelpText => "MISSING_HELP_TEXT",
        };
        write!(f, "{}", code)
    }
}

/// A single structural problem found in an overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    /// Location within the overlay, e.g. `modifications[2].field`
    pub path: String,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.code, self.message, self.path)
    }
}

/// Outcome of validating one overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }

    pub fn codes(&self) -> Vec<IssueCode> {
        self.issues.iter().map(|i| i.code).collect()
    }
}

/// Aggregate of every issue found, raised by `assert_valid` and registration
#[derive(Debug, Clone, Error)]
#[error("overlay {overlay} failed validation: {}", join_issues(.issues))]
pub struct StructuralValidationError {
    /// `overlayId@version` as given (may contain blanks)
    pub overlay: String,
    pub issues: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.code, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal fault: input outside the closed modification set reached the validator
#[derive(Debug, Error)]
pub enum SchemaMismatchError {
    #[error("modifications[{index}] has unknown type '{kind}'")]
    UnknownModification { index: usize, kind: String },

    #[error("modifications[{index}] has no string 'type' tag")]
    MissingModificationTag { index: usize },

    #[error("overlay does not match the overlay schema: {0}")]
    Undecodable(#[from] serde_json::Error),
}
