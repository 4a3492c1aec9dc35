//! Target and audience scoping.
//!
//! An overlay names *what* it customizes (`OverlayTargetRef`) and *who* it
//! applies to (`OverlayScopeContext`). A request lookup carries the same two
//! halves. Unset or empty keys impose no constraint.

use serde::{Deserialize, Serialize};

/// Identifiers naming the artifact an overlay applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayTargetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_view: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl OverlayTargetRef {
    /// All target keys with their value, empty strings reported as unset.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("capability", non_empty(&self.capability)),
            ("workflow", non_empty(&self.workflow)),
            ("dataView", non_empty(&self.data_view)),
            ("presentation", non_empty(&self.presentation)),
            ("operation", non_empty(&self.operation)),
        ]
    }

    /// True if at least one target key holds something other than whitespace.
    pub fn has_any(&self) -> bool {
        self.entries()
            .iter()
            .any(|(_, value)| value.map_or(false, |v| !v.trim().is_empty()))
    }
}

/// Identifiers naming the audience an overlay applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayScopeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Overlay side: tags the caller must all carry. Lookup side: the caller's tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl OverlayScopeContext {
    /// The single-valued scope keys, empty strings reported as unset.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("tenantId", non_empty(&self.tenant_id)),
            ("role", non_empty(&self.role)),
            ("userId", non_empty(&self.user_id)),
            ("device", non_empty(&self.device)),
        ]
    }

    /// Tags, or an empty slice when none were given.
    pub fn tag_list(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

/// Where and to whom an overlay applies, plus an optional rationale label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayAppliesTo {
    #[serde(flatten)]
    pub target: OverlayTargetRef,

    #[serde(flatten)]
    pub scope: OverlayScopeContext,

    /// Human-readable rationale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Request-time context used to resolve matching overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayLookup {
    #[serde(flatten)]
    pub target: OverlayTargetRef,

    #[serde(flatten)]
    pub scope: OverlayScopeContext,
}

macro_rules! scoped_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn with_capability(mut self, value: impl Into<String>) -> Self {
                self.target.capability = Some(value.into());
                self
            }

            pub fn with_workflow(mut self, value: impl Into<String>) -> Self {
                self.target.workflow = Some(value.into());
                self
            }

            pub fn with_data_view(mut self, value: impl Into<String>) -> Self {
                self.target.data_view = Some(value.into());
                self
            }

            pub fn with_presentation(mut self, value: impl Into<String>) -> Self {
                self.target.presentation = Some(value.into());
                self
            }

            pub fn with_operation(mut self, value: impl Into<String>) -> Self {
                self.target.operation = Some(value.into());
                self
            }

            pub fn with_tenant(mut self, value: impl Into<String>) -> Self {
                self.scope.tenant_id = Some(value.into());
                self
            }

            pub fn with_role(mut self, value: impl Into<String>) -> Self {
                self.scope.role = Some(value.into());
                self
            }

            pub fn with_user(mut self, value: impl Into<String>) -> Self {
                self.scope.user_id = Some(value.into());
                self
            }

            pub fn with_device(mut self, value: impl Into<String>) -> Self {
                self.scope.device = Some(value.into());
                self
            }

            pub fn with_tag(mut self, value: impl Into<String>) -> Self {
                self.scope.tags.get_or_insert_with(Vec::new).push(value.into());
                self
            }
        }
    };
}

scoped_builders!(OverlayAppliesTo);
scoped_builders!(OverlayLookup);

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
