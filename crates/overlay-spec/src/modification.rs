//! Field-level modifications carried by an overlay.
//!
//! The variant set is closed: adding a variant forces the validator and the
//! merger to handle it through exhaustive matches.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Wire tags of every known modification variant.
pub const MODIFICATION_TYPES: [&str; 6] = [
    "hideField",
    "renameLabel",
    "reorderFields",
    "setDefault",
    "addHelpText",
    "makeRequired",
];

/// A single modification, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OverlayModification {
    HideField(HideField),
    RenameLabel(RenameLabel),
    ReorderFields(ReorderFields),
    SetDefault(SetDefault),
    AddHelpText(AddHelpText),
    MakeRequired(MakeRequired),
}

impl OverlayModification {
    /// Wire tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HideField(_) => "hideField",
            Self::RenameLabel(_) => "renameLabel",
            Self::ReorderFields(_) => "reorderFields",
            Self::SetDefault(_) => "setDefault",
            Self::AddHelpText(_) => "addHelpText",
            Self::MakeRequired(_) => "makeRequired",
        }
    }

    /// Target field key, for the single-field variants.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::HideField(m) => Some(&m.field),
            Self::RenameLabel(m) => Some(&m.field),
            Self::SetDefault(m) => Some(&m.field),
            Self::AddHelpText(m) => Some(&m.field),
            Self::MakeRequired(m) => Some(&m.field),
            Self::ReorderFields(_) => None,
        }
    }

    pub fn hide(field: impl Into<String>) -> Self {
        Self::HideField(HideField {
            field: field.into(),
        })
    }

    pub fn rename(field: impl Into<String>, new_label: impl Into<String>) -> Self {
        Self::RenameLabel(RenameLabel {
            field: field.into(),
            new_label: new_label.into(),
        })
    }

    pub fn reorder<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ReorderFields(ReorderFields {
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    pub fn set_default(field: impl Into<String>, value: Value) -> Self {
        Self::SetDefault(SetDefault {
            field: field.into(),
            value: Some(value),
        })
    }

    pub fn help_text(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::AddHelpText(AddHelpText {
            field: field.into(),
            text: text.into(),
        })
    }

    pub fn require(field: impl Into<String>, required: Option<bool>) -> Self {
        Self::MakeRequired(MakeRequired {
            field: field.into(),
            required,
        })
    }
}

/// Marks a field invisible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideField {
    #[serde(default)]
    pub field: String,
}

/// Replaces a field's display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameLabel {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub new_label: String,
}

/// Moves the listed fields to the front, in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderFields {
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Replaces a field's default value.
///
/// `value: None` means the key was absent; an explicit JSON `null` is
/// `Some(Value::Null)` and is a valid default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDefault {
    #[serde(default)]
    pub field: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

/// Sets or overwrites a field's help text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddHelpText {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub text: String,
}

/// Sets the required flag (true when `required` is omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeRequired {
    #[serde(default)]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl MakeRequired {
    pub fn effective(&self) -> bool {
        self.required.unwrap_or(true)
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
