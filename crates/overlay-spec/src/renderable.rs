//! The artifact overlays customize.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Metadata;

/// A field/layout descriptor produced by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayRenderable {
    #[serde(default)]
    pub fields: Vec<OverlayRenderableField>,

    /// Passed through merges untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl OverlayRenderable {
    pub fn new(fields: Vec<OverlayRenderableField>) -> Self {
        Self {
            fields,
            layout: None,
            metadata: None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&OverlayRenderableField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Field keys in list order.
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }
}

/// One field of a renderable. `key` is unique within its renderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRenderableField {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Position within the renderable
    #[serde(default)]
    pub order: u32,
}

impl OverlayRenderableField {
    pub fn new(key: impl Into<String>, order: u32) -> Self {
        Self {
            key: key.into(),
            label: None,
            visible: true,
            required: None,
            help_text: None,
            default_value: None,
            metadata: None,
            order,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

fn default_visible() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_defaults_to_true() {
        let field: OverlayRenderableField =
            serde_json::from_str(r#"{"key":"name","order":0}"#).unwrap();
        assert!(field.visible);
        assert_eq!(field.order, 0);
    }

    #[test]
    fn test_renderable_lookup_by_key() {
        let renderable = OverlayRenderable::new(vec![
            OverlayRenderableField::new("name", 0).with_label("Name"),
            OverlayRenderableField::new("email", 1),
        ]);

        assert_eq!(renderable.keys(), vec!["name", "email"]);
        assert_eq!(
            renderable.field("name").and_then(|f| f.label.as_deref()),
            Some("Name")
        );
        assert!(renderable.field("ssn").is_none());
    }
}
