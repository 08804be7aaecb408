//! Back-reference index between categories.
//!
//! The tracker never owns records. It only remembers, for each referenced
//! entity, which other entities point at it and through which field, so the
//! store can refuse to remove an entity that is still referenced.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::model::{BlogError, BlogErrors, Category, ErrorCode, Id, Record};

/// Lookup of live entity ids, implemented by a store's data
pub trait EntityIndex {
    fn contains(&self, category: Category, id: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub category: Category,
    pub id: Id,
}

impl EntityKey {
    pub fn new(category: Category, id: impl Into<Id>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }
}

/// One entity referencing another
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackReference {
    pub referencing_category: Category,
    pub referencing_id: Id,
    pub via_field: String,
}

/// Foreign key value carried by a record about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub via_field: &'static str,
    pub target: Category,
    pub target_id: Id,
}

/// Foreign key values in `fields`, as declared by the category metadata
pub fn foreign_key_refs(category: Category, fields: &Record) -> Vec<ForeignKeyRef> {
    category
        .meta()
        .foreign_keys()
        .filter_map(|(field, target)| {
            fields
                .get(field.name)
                .and_then(|v| v.as_str())
                .map(|id| ForeignKeyRef {
                    via_field: field.name,
                    target,
                    target_id: id.to_string(),
                })
        })
        .collect()
}

pub fn missing_target(category: Category, fk: &ForeignKeyRef) -> BlogError {
    BlogError::new(
        ErrorCode::BadId,
        format!(
            "{} '{}' referenced by {} field '{}' does not exist",
            fk.target, fk.target_id, category, fk.via_field
        ),
    )
}

/// `BAD_ID` for an operation naming a record that does not exist
pub fn unknown_id(category: Category, id: &str) -> BlogErrors {
    BlogErrors::single(ErrorCode::BadId, format!("no {} for id '{}'", category, id))
}

/// `BAD_ID` list for a removal blocked by live references, one entry per referencing field
pub fn removal_blocked(category: Category, id: &str, references: &[BackReference]) -> BlogErrors {
    let mut grouped: BTreeMap<(Category, &str), Vec<&str>> = BTreeMap::new();
    for r in references {
        grouped
            .entry((r.referencing_category, r.via_field.as_str()))
            .or_default()
            .push(r.referencing_id.as_str());
    }
    BlogErrors(
        grouped
            .into_iter()
            .map(|((from, field), ids)| {
                BlogError::new(
                    ErrorCode::BadId,
                    format!(
                        "{} {} is referenced by {} field '{}' of {}",
                        category,
                        id,
                        from,
                        field,
                        ids.join(", ")
                    ),
                )
            })
            .collect(),
    )
}

#[derive(Debug, Default)]
pub struct ReferenceTracker {
    /// target -> (referencing category, field) -> referencing ids in registration order
    back: HashMap<EntityKey, BTreeMap<(Category, &'static str), Vec<Id>>>,
    /// source -> targets it registered, so removal of the source is cheap
    forward: HashMap<EntityKey, Vec<(EntityKey, &'static str)>>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_exists<E: EntityIndex + ?Sized>(entities: &E, category: Category, id: &str) -> bool {
        entities.contains(category, id)
    }

    /// Foreign keys of a record about to be created, or `BAD_ID` for every missing target
    pub fn resolve_targets<E: EntityIndex + ?Sized>(
        entities: &E,
        category: Category,
        fields: &Record,
    ) -> Result<Vec<ForeignKeyRef>, Vec<BlogError>> {
        let refs = foreign_key_refs(category, fields);
        let missing: Vec<BlogError> = refs
            .iter()
            .filter(|fk| !Self::check_exists(entities, fk.target, &fk.target_id))
            .map(|fk| missing_target(category, fk))
            .collect();
        if missing.is_empty() {
            Ok(refs)
        } else {
            Err(missing)
        }
    }

    pub fn register_reference(
        &mut self,
        from_category: Category,
        from_id: &str,
        to_category: Category,
        to_id: &str,
        via_field: &'static str,
    ) {
        let target = EntityKey::new(to_category, to_id);
        self.back
            .entry(target.clone())
            .or_default()
            .entry((from_category, via_field))
            .or_default()
            .push(from_id.to_string());
        self.forward
            .entry(EntityKey::new(from_category, from_id))
            .or_default()
            .push((target, via_field));
    }

    pub fn register_all(&mut self, from_category: Category, from_id: &str, refs: &[ForeignKeyRef]) {
        for fk in refs {
            self.register_reference(from_category, from_id, fk.target, &fk.target_id, fk.via_field);
        }
    }

    pub fn references_to(&self, category: Category, id: &str) -> Vec<BackReference> {
        let Some(by_field) = self.back.get(&EntityKey::new(category, id)) else {
            return Vec::new();
        };
        by_field
            .iter()
            .flat_map(|((from, field), ids)| {
                ids.iter().map(move |rid| BackReference {
                    referencing_category: *from,
                    referencing_id: rid.clone(),
                    via_field: field.to_string(),
                })
            })
            .collect()
    }

    /// Forget every reference the entity made, and its own (empty) target entry
    pub fn remove_references_from(&mut self, category: Category, id: &str) {
        let source = EntityKey::new(category, id);
        for (target, field) in self.forward.remove(&source).unwrap_or_default() {
            let Some(by_field) = self.back.get_mut(&target) else {
                continue;
            };
            if let Some(ids) = by_field.get_mut(&(category, field)) {
                ids.retain(|rid| rid != id);
                if ids.is_empty() {
                    by_field.remove(&(category, field));
                }
            }
            if by_field.is_empty() {
                self.back.remove(&target);
            }
        }
        self.back.remove(&source);
    }

    pub fn clear(&mut self) {
        self.back.clear();
        self.forward.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.back.is_empty()
    }
}
