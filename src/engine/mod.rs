//! Engine - the single entry point consumers call
//!
//! `apply` resolves overlays (registry lookup, or an explicit list for
//! previews), merges them onto the target, and reports every resolved overlay
//! to the audit sink. Audit delivery never affects the result of `apply`.

mod audit;

pub use audit::{AuditDispatcher, AuditError, AuditSink, OverlayAuditEvent};

use std::sync::Arc;

use chrono::Utc;
use overlay_spec::{OverlayLookup, OverlayRef, OverlayRenderable, SignedOverlaySpec};
use tracing::debug;

use crate::merger::{self, MergeError, MergeOptions};
use crate::registry::OverlayRegistry;

/// Parameters for one `apply` call (the target is passed separately)
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// Request context used for registry lookup and audit events
    pub lookup: OverlayLookup,

    /// Bypasses the registry when set, e.g. to preview a draft overlay
    pub overlays: Option<Vec<SignedOverlaySpec>>,

    /// Falls back to the engine's default when unset
    pub strict: Option<bool>,
}

impl ApplyRequest {
    pub fn for_lookup(lookup: OverlayLookup) -> Self {
        Self {
            lookup,
            ..Default::default()
        }
    }
}

/// Result of `apply`
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub target: OverlayRenderable,
    /// Every resolved overlay, in merge order, even if all its edits were no-ops
    pub overlays_applied: Vec<Arc<SignedOverlaySpec>>,
}

impl ApplyOutcome {
    pub fn applied_refs(&self) -> Vec<OverlayRef> {
        self.overlays_applied
            .iter()
            .map(|o| o.spec.overlay_ref())
            .collect()
    }
}

/// Orchestrates lookup, merge and audit
#[derive(Debug)]
pub struct OverlayEngine {
    registry: Arc<OverlayRegistry>,
    audit: Option<AuditDispatcher>,
    default_strict: bool,
}

impl OverlayEngine {
    pub fn new(registry: Arc<OverlayRegistry>) -> Self {
        Self {
            registry,
            audit: None,
            default_strict: false,
        }
    }

    /// Report applied overlays to `sink` on a background thread
    pub fn with_audit_sink(mut self, sink: impl AuditSink) -> Self {
        self.audit = Some(AuditDispatcher::spawn(Arc::new(sink)));
        self
    }

    pub fn with_default_strict(mut self, strict: bool) -> Self {
        self.default_strict = strict;
        self
    }

    pub fn registry(&self) -> &Arc<OverlayRegistry> {
        &self.registry
    }

    /// Resolve, merge and audit
    pub fn apply(
        &self,
        target: &OverlayRenderable,
        request: &ApplyRequest,
    ) -> Result<ApplyOutcome, MergeError> {
        let overlays: Vec<Arc<SignedOverlaySpec>> = match &request.overlays {
            Some(explicit) => explicit.iter().cloned().map(Arc::new).collect(),
            None => self.registry.for_context(&request.lookup),
        };

        let options = MergeOptions {
            strict: request.strict.unwrap_or(self.default_strict),
        };
        let merged = merger::apply(target, overlays.iter().map(Arc::as_ref), &options)?;

        debug!(
            applied = overlays.len(),
            explicit = request.overlays.is_some(),
            "applied overlays"
        );

        if let Some(audit) = &self.audit {
            let timestamp = Utc::now();
            for overlay in &overlays {
                audit.dispatch(OverlayAuditEvent {
                    overlay: overlay.spec.overlay_ref(),
                    context: request.lookup.clone(),
                    timestamp,
                });
            }
        }

        Ok(ApplyOutcome {
            target: merged,
            overlays_applied: overlays,
        })
    }

    /// Wait for queued audit events to reach the sink
    pub fn flush_audit(&self) {
        if let Some(audit) = &self.audit {
            audit.flush();
        }
    }
}
