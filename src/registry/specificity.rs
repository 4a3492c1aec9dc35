//! Specificity scoring and context matching
//!
//! Specificity is a weighted sum over the scope keys an overlay sets. Target
//! keys never contribute. Tags count once, however many are listed.

use overlay_spec::{OverlayAppliesTo, OverlayLookup};

pub const TENANT_WEIGHT: u32 = 8;
pub const ROLE_WEIGHT: u32 = 4;
pub const USER_WEIGHT: u32 = 16;
pub const DEVICE_WEIGHT: u32 = 2;
pub const TAGS_WEIGHT: u32 = 1;

/// Weighted specificity of an overlay's scope
pub fn specificity(applies_to: &OverlayAppliesTo) -> u32 {
    let scope = &applies_to.scope;
    let weights = [TENANT_WEIGHT, ROLE_WEIGHT, USER_WEIGHT, DEVICE_WEIGHT];

    let keyed: u32 = scope
        .entries()
        .iter()
        .zip(weights)
        .filter(|((_, value), _)| value.is_some())
        .map(|(_, weight)| weight)
        .sum();

    if scope.tag_list().is_empty() {
        keyed
    } else {
        keyed + TAGS_WEIGHT
    }
}

/// Whether an overlay's `appliesTo` admits the lookup context
///
/// Every key the overlay sets must equal the lookup's value; overlay tags
/// must be a subset of the lookup's tags. Unset keys impose nothing.
pub fn matches(applies_to: &OverlayAppliesTo, lookup: &OverlayLookup) -> bool {
    let targets_match = applies_to
        .target
        .entries()
        .iter()
        .zip(lookup.target.entries())
        .all(|((_, wanted), (_, actual))| wanted.map_or(true, |w| actual == Some(w)));
    if !targets_match {
        return false;
    }

    let scopes_match = applies_to
        .scope
        .entries()
        .iter()
        .zip(lookup.scope.entries())
        .all(|((_, wanted), (_, actual))| wanted.map_or(true, |w| actual == Some(w)));
    if !scopes_match {
        return false;
    }

    let caller_tags = lookup.scope.tag_list();
    applies_to
        .scope
        .tag_list()
        .iter()
        .all(|tag| caller_tags.contains(tag))
}
