//! Engine orchestration: lookup, merge and audit together

use std::sync::Arc;

use overlay_engine::engine::AuditError;
use overlay_engine::{
    sign, ApplyRequest, OverlayAppliesTo, OverlayAuditEvent, OverlayEngine, OverlayLookup,
    OverlayModification, OverlayRegistry, OverlayRenderable, OverlayRenderableField, OverlaySpec,
    RegisterOptions, SignOptions, SigningKeyMaterial,
};
use parking_lot::Mutex;

fn target() -> OverlayRenderable {
    OverlayRenderable::new(vec![
        OverlayRenderableField::new("name", 0),
        OverlayRenderableField::new("ssn", 1),
        OverlayRenderableField::new("email", 2),
    ])
}

fn signed_registry() -> Arc<OverlayRegistry> {
    let key = SigningKeyMaterial::ed25519_from_bytes(&[9u8; 32]).unwrap();
    let registry = Arc::new(OverlayRegistry::new());

    let specs = [
        OverlaySpec::new("base", "1")
            .with_applies_to(OverlayAppliesTo::default().with_data_view("customerForm"))
            .with_modification(OverlayModification::reorder(["email"])),
        OverlaySpec::new("agents", "2")
            .with_applies_to(OverlayAppliesTo::default().with_data_view("customerForm").with_role("agent"))
            .with_modification(OverlayModification::hide("ssn")),
    ];
    for spec in specs {
        let signed = sign(&spec, &key, &SignOptions::default()).unwrap();
        registry.register(signed, &RegisterOptions::default()).unwrap();
    }
    registry
}

#[test]
fn test_apply_resolves_by_context() {
    let engine = OverlayEngine::new(signed_registry());

    let agent = OverlayLookup::default().with_data_view("customerForm").with_role("agent");
    let outcome = engine.apply(&target(), &ApplyRequest::for_lookup(agent)).unwrap();
    assert_eq!(outcome.target.keys(), vec!["email", "name"]);
    let applied: Vec<String> = outcome.applied_refs().iter().map(ToString::to_string).collect();
    assert_eq!(applied, vec!["base@1", "agents@2"]);

    let anyone = OverlayLookup::default().with_data_view("customerForm");
    let outcome = engine.apply(&target(), &ApplyRequest::for_lookup(anyone)).unwrap();
    assert_eq!(outcome.target.keys(), vec!["email", "name", "ssn"]);
}

#[test]
fn test_no_matching_overlays_returns_reindexed_copy() {
    let engine = OverlayEngine::new(signed_registry());
    let lookup = OverlayLookup::default().with_data_view("invoice");

    let outcome = engine.apply(&target(), &ApplyRequest::for_lookup(lookup)).unwrap();
    assert!(outcome.overlays_applied.is_empty());
    assert_eq!(outcome.target, target());
}

#[test]
fn test_audit_receives_each_applied_overlay() {
    let events: Arc<Mutex<Vec<OverlayAuditEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let engine = OverlayEngine::new(signed_registry()).with_audit_sink(
        move |event: &OverlayAuditEvent| -> Result<(), AuditError> {
            sink_events.lock().push(event.clone());
            Ok(())
        },
    );

    let lookup = OverlayLookup::default()
        .with_data_view("customerForm")
        .with_role("agent")
        .with_tenant("t1");
    engine.apply(&target(), &ApplyRequest::for_lookup(lookup.clone())).unwrap();
    engine.flush_audit();

    let events = events.lock();
    let ids: Vec<&str> = events.iter().map(|e| e.overlay.overlay_id.as_str()).collect();
    assert_eq!(ids, vec!["base", "agents"]);
    assert!(events.iter().all(|e| e.context == lookup));
}

#[test]
fn test_panicking_audit_sink_is_contained() {
    let engine = OverlayEngine::new(signed_registry()).with_audit_sink(
        |_: &OverlayAuditEvent| -> Result<(), AuditError> { panic!("sink exploded") },
    );
    let lookup = OverlayLookup::default().with_data_view("customerForm");

    for _ in 0..3 {
        let outcome = engine.apply(&target(), &ApplyRequest::for_lookup(lookup.clone())).unwrap();
        assert_eq!(outcome.overlays_applied.len(), 1);
    }
    engine.flush_audit();
}

#[test]
fn test_failed_merge_emits_no_audit() {
    let events: Arc<Mutex<Vec<OverlayAuditEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let engine = OverlayEngine::new(Arc::new(OverlayRegistry::new())).with_audit_sink(
        move |event: &OverlayAuditEvent| -> Result<(), AuditError> {
            sink_events.lock().push(event.clone());
            Ok(())
        },
    );

    let broken = OverlaySpec::new("broken", "1")
        .with_applies_to(OverlayAppliesTo::default().with_data_view("customerForm"))
        .with_modification(OverlayModification::hide("missing"));
    let request = ApplyRequest {
        lookup: OverlayLookup::default().with_data_view("customerForm"),
        overlays: Some(vec![broken.into()]),
        strict: Some(true),
    };

    assert!(engine.apply(&target(), &request).is_err());
    engine.flush_audit();
    assert!(events.lock().is_empty());
}
