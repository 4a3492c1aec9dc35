//! Validator - structural well-formedness checks for overlays
//!
//! Runs before registration. Checks accumulate: every problem in a spec is
//! reported, except that a `reorderFields` list stops at its first blank or
//! duplicate entry. Input that escapes the closed modification set is a
//! fatal `SchemaMismatchError`, not an issue.

mod issue;

pub use issue::{
    IssueCode, SchemaMismatchError, StructuralValidationError, ValidationIssue, ValidationResult,
};

use std::collections::HashSet;

use overlay_spec::{OverlayModification, OverlaySpec, MODIFICATION_TYPES};
use serde_json::Value;

/// Validate a typed overlay spec
///
/// This is a pure function: spec -> ValidationResult
pub fn validate(spec: &OverlaySpec) -> ValidationResult {
    let mut issues = Vec::new();

    if is_blank(&spec.overlay_id) {
        issues.push(ValidationIssue::new(
            IssueCode::MissingOverlayId,
            "overlayId",
            "overlayId must be a non-empty string",
        ));
    }

    if is_blank(&spec.version) {
        issues.push(ValidationIssue::new(
            IssueCode::MissingVersion,
            "version",
            "version must be a non-empty string",
        ));
    }

    // Scope keys (tenantId, role, ...) do not count as a target
    if !spec.applies_to.target.has_any() {
        issues.push(ValidationIssue::new(
            IssueCode::MissingTarget,
            "appliesTo",
            "appliesTo must name at least one of capability, workflow, dataView, presentation, operation",
        ));
    }

    if spec.modifications.is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::EmptyModifications,
            "modifications",
            "at least one modification is required",
        ));
    }

    for (index, modification) in spec.modifications.iter().enumerate() {
        check_modification(index, modification, &mut issues);
    }

    ValidationResult::from_issues(issues)
}

/// Validate and fail fast with every issue concatenated into one error
pub fn assert_valid(spec: &OverlaySpec) -> Result<(), StructuralValidationError> {
    let result = validate(spec);
    if result.valid {
        Ok(())
    } else {
        Err(StructuralValidationError {
            overlay: spec.overlay_ref().to_string(),
            issues: result.issues,
        })
    }
}

/// Validate an untyped overlay (e.g. straight from a bundle file)
///
/// Modification tags are checked against the closed set before decoding, so an
/// unknown variant surfaces as `SchemaMismatchError::UnknownModification`
/// instead of a generic decode failure.
pub fn validate_json(value: &Value) -> Result<ValidationResult, SchemaMismatchError> {
    check_modification_tags(value)?;
    let spec: OverlaySpec = serde_json::from_value(value.clone())?;
    Ok(validate(&spec))
}

/// Reject modification `type` tags outside the closed set
pub fn check_modification_tags(value: &Value) -> Result<(), SchemaMismatchError> {
    let Some(modifications) = value.get("modifications").and_then(Value::as_array) else {
        return Ok(());
    };

    for (index, modification) in modifications.iter().enumerate() {
        match modification.get("type").and_then(Value::as_str) {
            Some(kind) if MODIFICATION_TYPES.contains(&kind) => {}
            Some(kind) => {
                return Err(SchemaMismatchError::UnknownModification {
                    index,
                    kind: kind.to_string(),
                })
            }
            None => return Err(SchemaMismatchError::MissingModificationTag { index }),
        }
    }
    Ok(())
}

fn check_modification(index: usize, modification: &OverlayModification, issues: &mut Vec<ValidationIssue>) {
    let at = |suffix: &str| format!("modifications[{}].{}", index, suffix);

    if let Some(field) = modification.field() {
        if is_blank(field) {
            issues.push(ValidationIssue::new(
                IssueCode::MissingField,
                at("field"),
                format!("{} requires a field key", modification.kind()),
            ));
        }
    }

    match modification {
        OverlayModification::HideField(_) | OverlayModification::MakeRequired(_) => {}
        OverlayModification::RenameLabel(m) => {
            if is_blank(&m.new_label) {
                issues.push(ValidationIssue::new(
                    IssueCode::MissingLabel,
                    at("newLabel"),
                    "renameLabel requires a non-empty newLabel",
                ));
            }
        }
        OverlayModification::ReorderFields(m) => {
            if m.fields.is_empty() {
                issues.push(ValidationIssue::new(
                    IssueCode::EmptyReorder,
                    at("fields"),
                    "reorderFields requires at least one field",
                ));
                return;
            }

            let mut seen = HashSet::new();
            for (position, entry) in m.fields.iter().enumerate() {
                if is_blank(entry) {
                    issues.push(ValidationIssue::new(
                        IssueCode::BlankReorderEntry,
                        format!("modifications[{}].fields[{}]", index, position),
                        "reorderFields entries must be non-empty",
                    ));
                    break;
                }
                if !seen.insert(entry.as_str()) {
                    issues.push(ValidationIssue::new(
                        IssueCode::DuplicateReorderEntry,
                        format!("modifications[{}].fields[{}]", index, position),
                        format!("field '{}' is listed more than once", entry),
                    ));
                    break;
                }
            }
        }
        OverlayModification::SetDefault(m) => {
            if m.value.is_none() {
                issues.push(ValidationIssue::new(
                    IssueCode::MissingDefaultValue,
                    at("value"),
                    "setDefault requires a value (null is allowed)",
                ));
            }
        }
        OverlayModification::AddHelpText(m) => {
            if is_blank(&m.text) {
                issues.push(ValidationIssue::new(
                    IssueCode::MissingHelpText,
                    at("text"),
                    "addHelpText requires non-empty text",
                ));
            }
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
