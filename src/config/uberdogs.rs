//! Uberdog registry validation.
//!
//! Uberdogs are declared once for the whole cluster. Ids must be unique; the
//! class name is only checked for presence here and resolved against the DC
//! schema later.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

use serde::Serialize;
use serde_yaml::Value;

use crate::config::fields::{object, Diagnostics, KeySchema};
use crate::config::schema::UberdogDecl;
use crate::config::validation::{FieldPath, ValidationError};

const UBERDOG_KEYS: KeySchema = KeySchema {
    required: &["id", "class"],
    optional: &["anonymous"],
};

/// Validated uberdog declarations keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UberdogRegistry {
    by_id: BTreeMap<u64, UberdogDecl>,
}

impl UberdogRegistry {
    pub fn get(&self, id: u64) -> Option<&UberdogDecl> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Declarations in ascending id order.
    pub fn iter(&self) -> btree_map::Values<'_, u64, UberdogDecl> {
        self.by_id.values()
    }
}

/// Validate the `uberdogs` sequence found at `path`.
pub fn validate_uberdogs(value: &Value, path: &FieldPath) -> Result<UberdogRegistry, Vec<ValidationError>> {
    let mut diags = Diagnostics::default();
    let registry = collect_uberdogs(value, path, &mut diags);
    diags.finish(registry)
}

pub(crate) fn collect_uberdogs(value: &Value, path: &FieldPath, diags: &mut Diagnostics) -> Option<UberdogRegistry> {
    let Some(entries) = value.as_sequence() else {
        diags.push(ValidationError::InvalidType {
            path: path.clone(),
            expected: "sequence",
            found: crate::config::fields::type_name(value),
        });
        return None;
    };

    let mut registry = UberdogRegistry::default();
    let mut seen = BTreeSet::new();
    let mut complete = true;

    for (index, entry) in entries.iter().enumerate() {
        let entry_path = path.index(index);
        let Some(obj) = object(entry, &entry_path, UBERDOG_KEYS, diags) else {
            complete = false;
            continue;
        };

        let id = obj.u64("id", diags);
        let class = obj.non_empty_string("class", diags);
        let anonymous = obj.or_default("anonymous", false, |o| o.bool("anonymous", diags));

        if let Some(id) = id {
            if !seen.insert(id) {
                diags.push(ValidationError::DuplicateUberdogId {
                    path: entry_path.key("id"),
                    id,
                });
                complete = false;
                continue;
            }
        }

        match (id, class, anonymous) {
            (Some(id), Some(class), Some(anonymous)) => {
                registry.by_id.insert(id, UberdogDecl { id, class, anonymous });
            }
            _ => complete = false,
        }
    }

    complete.then_some(registry)
}
