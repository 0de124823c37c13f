//! Differ - Compare desired state with current state
//!
//! Compares the declared resource with the state read back from the provider
//! and decides which CRUD operation, if any, brings them together.

use std::collections::HashMap;

use crate::provider::ResourceSchema;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete then create
    Replace {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: &ResourceSchema) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    if changed.iter().any(|attr| schema.is_force_new(attr)) {
        Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: &ResourceSchema,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        if key.starts_with('_') || schema.is_local_only(key) {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}
