//! Records
//!
//! A record is an attribute map over a fixed, schema-derived attribute
//! set, plus the "old attribute" snapshot used for dirty diffing and
//! WHERE-by-old-primary-key, plus the populated-relation cache. A record
//! with no old snapshot is new (unsaved); loading or saving establishes
//! the baseline.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

use super::def::ModelDef;

/// A populated relation slot.
///
/// Shape follows the relation's `multiple` flag; `ManyIndexed` carries a
/// has-many re-keyed by the relation's `index_by` column.
#[derive(Debug, Clone)]
pub enum RelatedValue {
    One(Option<Record>),
    Many(Vec<Record>),
    ManyIndexed(IndexMap<String, Record>),
}

impl RelatedValue {
    pub fn len(&self) -> usize {
        match self {
            RelatedValue::One(one) => usize::from(one.is_some()),
            RelatedValue::Many(list) => list.len(),
            RelatedValue::ManyIndexed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The related records regardless of shape.
    pub fn records(&self) -> Vec<&Record> {
        match self {
            RelatedValue::One(one) => one.iter().collect(),
            RelatedValue::Many(list) => list.iter().collect(),
            RelatedValue::ManyIndexed(map) => map.values().collect(),
        }
    }

    pub(crate) fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            RelatedValue::One(one) => one.iter_mut().collect(),
            RelatedValue::Many(list) => list.iter_mut().collect(),
            RelatedValue::ManyIndexed(map) => map.values_mut().collect(),
        }
    }

    /// The single related record of a has-one slot.
    pub fn one(&self) -> Option<&Record> {
        match self {
            RelatedValue::One(one) => one.as_ref(),
            _ => None,
        }
    }
}

/// One in-memory record.
#[derive(Debug, Clone)]
pub struct Record {
    def: Arc<ModelDef>,
    attributes: HashMap<String, DbValue>,
    /// Loaded-from-store baseline; `None` means the record is new
    old_attributes: Option<HashMap<String, DbValue>>,
    related: HashMap<String, RelatedValue>,
}

impl Record {
    /// A new, unsaved record.
    pub fn new(def: Arc<ModelDef>) -> Self {
        Self {
            def,
            attributes: HashMap::new(),
            old_attributes: None,
            related: HashMap::new(),
        }
    }

    /// A record populated from a result row. The baseline is set, so the
    /// record reads as unchanged until an attribute is written.
    pub fn from_row(def: Arc<ModelDef>, row: &Row) -> Self {
        let mut attributes = HashMap::new();
        for name in &def.attributes {
            if let Some(value) = row.get(name) {
                attributes.insert(name.clone(), value.clone());
            }
        }
        Self {
            def,
            old_attributes: Some(attributes.clone()),
            attributes,
            related: HashMap::new(),
        }
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    pub fn get_attribute(&self, name: &str) -> Option<&DbValue> {
        self.attributes.get(name)
    }

    /// The attribute value, `Null` when unset.
    pub fn attribute(&self, name: &str) -> DbValue {
        self.attributes.get(name).cloned().unwrap_or(DbValue::Null)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<DbValue>) -> OrmResult<()> {
        if !self.def.has_attribute(name) {
            return Err(OrmError::InvalidKey(format!(
                "model '{}' has no attribute '{}'",
                self.def.name, name
            )));
        }
        self.attributes.insert(name.to_string(), value.into());
        Ok(())
    }

    pub(crate) fn set_attribute_unchecked(&mut self, name: &str, value: DbValue) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn attributes(&self) -> &HashMap<String, DbValue> {
        &self.attributes
    }

    /// Whether this record has never been saved.
    pub fn is_new_record(&self) -> bool {
        self.old_attributes.is_none()
    }

    /// Adopt the current attributes as the loaded-from-store baseline.
    pub fn mark_as_old(&mut self) {
        self.old_attributes = Some(self.attributes.clone());
    }

    pub(crate) fn clear_baseline(&mut self) {
        self.old_attributes = None;
    }

    pub fn old_attribute(&self, name: &str) -> Option<&DbValue> {
        self.old_attributes.as_ref().and_then(|m| m.get(name))
    }

    /// Attributes whose current value differs from the baseline, in the
    /// definition's attribute order. A new record diffs against the empty
    /// set, so every set attribute is dirty.
    pub fn dirty_attributes(&self, names: Option<&[&str]>) -> Vec<(String, DbValue)> {
        let mut dirty = Vec::new();
        for name in &self.def.attributes {
            if let Some(filter) = names {
                if !filter.contains(&name.as_str()) {
                    continue;
                }
            }
            let Some(current) = self.attributes.get(name) else {
                continue;
            };
            let changed = match &self.old_attributes {
                None => true,
                Some(old) => old.get(name) != Some(current),
            };
            if changed {
                dirty.push((name.clone(), current.clone()));
            }
        }
        dirty
    }

    /// Current primary key values, in key-column order.
    pub fn primary_key_values(&self) -> OrmResult<Vec<(String, DbValue)>> {
        self.key_pairs(&self.attributes)
    }

    /// Baseline primary key values, used for WHERE clauses on update and
    /// delete so a key change in memory still addresses the stored row.
    pub fn old_primary_key_values(&self) -> OrmResult<Vec<(String, DbValue)>> {
        match &self.old_attributes {
            Some(old) => self.key_pairs(old),
            None => Err(OrmError::InvalidKey(format!(
                "record of '{}' has no stored baseline",
                self.def.name
            ))),
        }
    }

    fn key_pairs(&self, source: &HashMap<String, DbValue>) -> OrmResult<Vec<(String, DbValue)>> {
        if self.def.primary_key.is_empty() {
            return Err(OrmError::Configuration(format!(
                "model '{}' declares no primary key",
                self.def.name
            )));
        }
        Ok(self
            .def
            .primary_key
            .iter()
            .map(|name| (name.clone(), source.get(name).cloned().unwrap_or(DbValue::Null)))
            .collect())
    }

    /// Values of the given columns, in order.
    pub(crate) fn key_values(&self, columns: &[String]) -> Vec<DbValue> {
        columns.iter().map(|c| self.attribute(c)).collect()
    }

    /// Whether two records address the same stored entity.
    pub fn same_entity(&self, other: &Record) -> bool {
        if self.def.name != other.def.name {
            return false;
        }
        match (self.primary_key_values(), other.primary_key_values()) {
            (Ok(a), Ok(b)) => !a.is_empty() && a == b,
            _ => false,
        }
    }

    /// Whether a relation slot is populated.
    pub fn is_relation_populated(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    /// Populate a relation slot, replacing any previous value.
    pub fn populate_relation(&mut self, name: impl Into<String>, value: RelatedValue) {
        self.related.insert(name.into(), value);
    }

    /// The populated value of a relation slot, if any.
    pub fn populated_relation(&self, name: &str) -> Option<&RelatedValue> {
        self.related.get(name)
    }

    pub(crate) fn populated_relation_mut(&mut self, name: &str) -> Option<&mut RelatedValue> {
        self.related.get_mut(name)
    }

    /// Remove a populated relation so the next access reloads it.
    pub fn unset_relation(&mut self, name: &str) {
        self.related.remove(name);
    }

    pub(crate) fn take_relation(&mut self, name: &str) -> Option<RelatedValue> {
        self.related.remove(name)
    }

    /// Clear every populated relation slot.
    pub fn unset_all_relations(&mut self) {
        self.related.clear();
    }

    /// A copy carrying attributes and baseline but no populated relations.
    /// Inverse back-references use this to avoid cyclic record graphs.
    pub(crate) fn stripped_clone(&self) -> Record {
        Record {
            def: Arc::clone(&self.def),
            attributes: self.attributes.clone(),
            old_attributes: self.old_attributes.clone(),
            related: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_def() -> Arc<ModelDef> {
        Arc::new(ModelDef::new(
            "User",
            "users",
            ["id", "name", "age"],
            vec!["id".to_string()],
        ))
    }

    fn loaded_user() -> Record {
        let row = Row::new(
            vec!["id".into(), "name".into(), "age".into()],
            vec![
                DbValue::Int64(1),
                DbValue::String("ada".into()),
                DbValue::Int32(36),
            ],
        );
        Record::from_row(user_def(), &row)
    }

    #[test]
    fn test_new_record_is_fully_dirty() {
        let mut record = Record::new(user_def());
        record.set_attribute("name", "ada").unwrap();
        assert!(record.is_new_record());
        let dirty = record.dirty_attributes(None);
        assert_eq!(dirty, vec![("name".to_string(), DbValue::String("ada".into()))]);
    }

    #[test]
    fn test_loaded_record_diffs_against_baseline() {
        let mut record = loaded_user();
        assert!(!record.is_new_record());
        assert!(record.dirty_attributes(None).is_empty());

        record.set_attribute("age", 37).unwrap();
        let dirty = record.dirty_attributes(None);
        assert_eq!(dirty, vec![("age".to_string(), DbValue::Int32(37))]);

        // writing the identical value back is not a change
        record.set_attribute("age", 36).unwrap();
        assert!(record.dirty_attributes(None).is_empty());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut record = Record::new(user_def());
        assert!(matches!(
            record.set_attribute("ghost", 1),
            Err(OrmError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_old_primary_key_survives_key_change() {
        let mut record = loaded_user();
        record.set_attribute("id", 99).unwrap();
        let old = record.old_primary_key_values().unwrap();
        assert_eq!(old, vec![("id".to_string(), DbValue::Int64(1))]);
        let current = record.primary_key_values().unwrap();
        assert_eq!(current, vec![("id".to_string(), DbValue::Int32(99))]);
    }

    #[test]
    fn test_relation_slot_state_machine() {
        let mut record = loaded_user();
        assert!(!record.is_relation_populated("orders"));
        record.populate_relation("orders", RelatedValue::Many(vec![]));
        assert!(record.is_relation_populated("orders"));
        record.unset_relation("orders");
        assert!(!record.is_relation_populated("orders"));
    }

    #[test]
    fn test_same_entity_is_key_based() {
        let a = loaded_user();
        let mut b = loaded_user();
        b.set_attribute("name", "different").unwrap();
        assert!(a.same_entity(&b));
        b.set_attribute("id", 2).unwrap();
        assert!(!a.same_entity(&b));
    }
}
