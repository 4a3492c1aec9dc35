//! Property tests for specificity ordering and merge determinism

use overlay_engine::merger::{self, MergeOptions};
use overlay_engine::registry::{
    specificity, DEVICE_WEIGHT, ROLE_WEIGHT, TAGS_WEIGHT, TENANT_WEIGHT, USER_WEIGHT,
};
use overlay_engine::{
    OverlayAppliesTo, OverlayModification, OverlayRenderable, OverlayRenderableField, OverlaySpec,
    SignedOverlaySpec,
};
use proptest::prelude::*;

const KEYS: [&str; 5] = ["name", "ssn", "email", "phone", "country"];

fn scope_strategy() -> impl Strategy<Value = OverlayAppliesTo> {
    (
        proptest::option::of("[a-z]{1,4}"),
        proptest::option::of("[a-z]{1,4}"),
        proptest::option::of("[a-z]{1,4}"),
        proptest::option::of("[a-z]{1,4}"),
        proptest::collection::vec("[a-z]{1,4}", 0..3),
    )
        .prop_map(|(tenant, role, user, device, tags)| {
            let mut applies_to = OverlayAppliesTo::default().with_data_view("customerForm");
            applies_to.scope.tenant_id = tenant;
            applies_to.scope.role = role;
            applies_to.scope.user_id = user;
            applies_to.scope.device = device;
            if !tags.is_empty() {
                applies_to.scope.tags = Some(tags);
            }
            applies_to
        })
}

fn modification_strategy() -> impl Strategy<Value = OverlayModification> {
    let key = proptest::sample::select(KEYS.to_vec());
    prop_oneof![
        key.clone().prop_map(|k| OverlayModification::hide(k)),
        (key.clone(), "[A-Z][a-z]{0,6}").prop_map(|(k, l)| OverlayModification::rename(k, l)),
        proptest::sample::subsequence(KEYS.to_vec(), 1..4).prop_map(|ks| OverlayModification::reorder(ks)),
        (key.clone(), any::<bool>()).prop_map(|(k, r)| OverlayModification::require(k, Some(r))),
        key.prop_map(|k| OverlayModification::help_text(k, "help")),
    ]
}

fn overlays_strategy() -> impl Strategy<Value = Vec<SignedOverlaySpec>> {
    proptest::collection::vec(proptest::collection::vec(modification_strategy(), 1..4), 0..4).prop_map(
        |overlays| {
            overlays
                .into_iter()
                .enumerate()
                .map(|(i, modifications)| {
                    let mut spec = OverlaySpec::new(format!("o{}", i), "1")
                        .with_applies_to(OverlayAppliesTo::default().with_data_view("customerForm"));
                    spec.modifications = modifications;
                    SignedOverlaySpec::unsigned(spec)
                })
                .collect()
        },
    )
}

fn target() -> OverlayRenderable {
    OverlayRenderable::new(
        KEYS.iter()
            .enumerate()
            .map(|(i, k)| OverlayRenderableField::new(*k, i as u32))
            .collect(),
    )
}

fn set_tenant(applies_to: &mut OverlayAppliesTo, value: String) {
    applies_to.scope.tenant_id = Some(value);
}

fn set_role(applies_to: &mut OverlayAppliesTo, value: String) {
    applies_to.scope.role = Some(value);
}

fn set_user(applies_to: &mut OverlayAppliesTo, value: String) {
    applies_to.scope.user_id = Some(value);
}

fn set_device(applies_to: &mut OverlayAppliesTo, value: String) {
    applies_to.scope.device = Some(value);
}

proptest! {
    #[test]
    fn prop_adding_scope_key_adds_its_weight(base in scope_strategy(), extra in "[a-z]{1,4}") {
        let before = specificity(&base);
        let scope = &base.scope;

        let additions = [
            (scope.tenant_id.is_none(), set_tenant as fn(&mut OverlayAppliesTo, String), TENANT_WEIGHT),
            (scope.role.is_none(), set_role, ROLE_WEIGHT),
            (scope.user_id.is_none(), set_user, USER_WEIGHT),
            (scope.device.is_none(), set_device, DEVICE_WEIGHT),
        ];
        for (absent, set, weight) in additions {
            if absent {
                let mut widened = base.clone();
                set(&mut widened, extra.clone());
                prop_assert_eq!(specificity(&widened), before + weight);
            }
        }

        // The first tag adds its weight once; further tags add nothing
        let had_tags = !scope.tag_list().is_empty();
        let mut tagged = base.clone();
        tagged.scope.tags.get_or_insert_with(Vec::new).push(extra.clone());
        let expected = if had_tags { before } else { before + TAGS_WEIGHT };
        prop_assert_eq!(specificity(&tagged), expected);

        tagged.scope.tags.get_or_insert_with(Vec::new).push(format!("{}x", extra));
        prop_assert_eq!(specificity(&tagged), expected);
    }

    #[test]
    fn prop_specificity_bounded(applies_to in scope_strategy()) {
        prop_assert!(specificity(&applies_to) <= 31);
    }

    #[test]
    fn prop_merge_is_deterministic(overlays in overlays_strategy()) {
        let first = merger::apply(&target(), &overlays, &MergeOptions::default()).unwrap();
        let second = merger::apply(&target(), &overlays, &MergeOptions::default()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_merge_output_is_contiguous_and_unique(overlays in overlays_strategy()) {
        let merged = merger::apply(&target(), &overlays, &MergeOptions::default()).unwrap();

        for (position, field) in merged.fields.iter().enumerate() {
            prop_assert_eq!(field.order, position as u32);
            prop_assert!(field.visible);
        }

        let mut keys = merged.keys();
        keys.sort_unstable();
        keys.dedup();
        prop_assert_eq!(keys.len(), merged.fields.len());
    }

    #[test]
    fn prop_hidden_fields_never_emitted(overlays in overlays_strategy()) {
        let merged = merger::apply(&target(), &overlays, &MergeOptions::default()).unwrap();

        let hidden: Vec<&str> = overlays
            .iter()
            .flat_map(|o| o.spec.modifications.iter())
            .filter(|m| matches!(m, OverlayModification::HideField(_)))
            .filter_map(|m| m.field())
            .collect();
        for key in hidden {
            prop_assert!(merged.field(key).is_none());
        }
    }
}
