//! Merger - apply resolved overlays onto a renderable
//!
//! Pure and single-pass: the input renderable and overlays are never mutated.
//! Overlays apply in the order given (callers pass the registry's
//! least-specific-first order) and each overlay's modifications apply in list
//! order, so later writes win.
//!
//! Hidden fields are dropped from the output rather than marked invisible.
//! Surviving fields get contiguous `order` values from 0 and `visible = true`.

use std::collections::{HashMap, HashSet};

use overlay_spec::{OverlayModification, OverlayRenderable, OverlayRenderableField, SignedOverlaySpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Merge-time errors (strict mode only)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("overlay {overlay_id} references unknown field '{field}'")]
    UnknownFieldReference { overlay_id: String, field: String },
}

/// Options for `apply`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Unknown field references fail instead of being skipped
    pub strict: bool,
}

struct FieldState {
    field: OverlayRenderableField,
    hidden: bool,
}

/// Apply overlays in order onto a copy of `target`
pub fn apply<'a, I>(
    target: &OverlayRenderable,
    overlays: I,
    options: &MergeOptions,
) -> Result<OverlayRenderable, MergeError>
where
    I: IntoIterator<Item = &'a SignedOverlaySpec>,
{
    let mut states: HashMap<String, FieldState> = HashMap::with_capacity(target.fields.len());
    let mut original_keys: Vec<String> = Vec::with_capacity(target.fields.len());

    for field in &target.fields {
        // First occurrence wins on duplicate keys
        if states.contains_key(&field.key) {
            continue;
        }
        original_keys.push(field.key.clone());
        states.insert(
            field.key.clone(),
            FieldState {
                field: field.clone(),
                hidden: !field.visible,
            },
        );
    }
    let mut order_sequence = original_keys.clone();

    let mut overlay_count = 0usize;
    for overlay in overlays {
        overlay_count += 1;
        let overlay_id = &overlay.spec.overlay_id;

        for modification in &overlay.spec.modifications {
            if let OverlayModification::ReorderFields(reorder) = modification {
                let front = known_reorder_keys(overlay_id, &reorder.fields, &states, options)?;
                order_sequence = reordered(&order_sequence, front);
                continue;
            }

            let Some(key) = modification.field() else {
                continue;
            };
            let Some(state) = states.get_mut(key) else {
                unknown_field(overlay_id, key, options)?;
                continue;
            };

            match modification {
                OverlayModification::HideField(_) => {
                    state.hidden = true;
                    state.field.visible = false;
                }
                OverlayModification::RenameLabel(m) => {
                    state.field.label = Some(m.new_label.clone());
                }
                OverlayModification::SetDefault(m) => {
                    state.field.default_value = m.value.clone();
                }
                OverlayModification::AddHelpText(m) => {
                    state.field.help_text = Some(m.text.clone());
                }
                OverlayModification::MakeRequired(m) => {
                    state.field.required = Some(m.effective());
                }
                OverlayModification::ReorderFields(_) => {}
            }
        }
    }

    let mut emitted: HashSet<&str> = HashSet::with_capacity(order_sequence.len());
    let mut fields: Vec<OverlayRenderableField> = Vec::with_capacity(order_sequence.len());

    for key in order_sequence.iter().chain(original_keys.iter()) {
        if !emitted.insert(key.as_str()) {
            continue;
        }
        if let Some(state) = states.get(key) {
            if !state.hidden {
                fields.push(state.field.clone());
            }
        }
    }

    for (position, field) in fields.iter_mut().enumerate() {
        field.order = position as u32;
        field.visible = true;
    }

    debug!(
        overlays = overlay_count,
        fields_in = target.fields.len(),
        fields_out = fields.len(),
        "merged overlays"
    );

    Ok(OverlayRenderable {
        fields,
        layout: target.layout.clone(),
        metadata: target.metadata.clone(),
    })
}

/// Filter a reorder list to known, non-blank keys, first occurrence winning
fn known_reorder_keys<'k>(
    overlay_id: &str,
    requested: &'k [String],
    states: &HashMap<String, FieldState>,
    options: &MergeOptions,
) -> Result<Vec<&'k str>, MergeError> {
    let mut seen = HashSet::new();
    let mut front = Vec::with_capacity(requested.len());

    for key in requested {
        let key = key.as_str();
        if key.trim().is_empty() || seen.contains(key) {
            continue;
        }
        if !states.contains_key(key) {
            unknown_field(overlay_id, key, options)?;
            continue;
        }
        seen.insert(key);
        front.push(key);
    }

    Ok(front)
}

/// `front` first, then every other key in its prior relative order
fn reordered(previous: &[String], front: Vec<&str>) -> Vec<String> {
    let moved: HashSet<&str> = front.iter().copied().collect();
    front
        .into_iter()
        .map(str::to_string)
        .chain(previous.iter().filter(|key| !moved.contains(key.as_str())).cloned())
        .collect()
}

fn unknown_field(overlay_id: &str, field: &str, options: &MergeOptions) -> Result<(), MergeError> {
    if options.strict {
        return Err(MergeError::UnknownFieldReference {
            overlay_id: overlay_id.to_string(),
            field: field.to_string(),
        });
    }
    warn!(overlay_id, field, "skipping modification for unknown field");
    Ok(())
}
