//! Lazy relation access
//!
//! A relation accessed on a single record that was not eagerly populated
//! executes exactly one query, filtered by the owning record's key values,
//! and caches the result on the record until explicitly invalidated with
//! `unset_relation`.

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::model::{ModelRegistry, Record, RelatedValue};

use super::eager;

impl Record {
    /// The resolved value of a relation, loading it on first access.
    ///
    /// Population is synchronous from the caller's point of view: the slot
    /// is either unpopulated or populated, never in between.
    pub async fn get_relation(
        &mut self,
        name: &str,
        conn: &Connection,
        registry: &ModelRegistry,
    ) -> OrmResult<&RelatedValue> {
        if !self.is_relation_populated(name) {
            let value = find_for(self, name, conn, registry).await?;
            self.populate_relation(name, value);
        }
        self.populated_relation(name)
            .ok_or_else(|| OrmError::Relation(format!("relation '{}' failed to populate", name)))
    }
}

/// Resolve a relation for a single owning record.
///
/// Runs through the same machinery as eager loading with a one-element
/// owner set, so via traversal, bucket semantics, and inverse
/// back-population behave identically on both paths.
pub(crate) async fn find_for(
    owner: &Record,
    name: &str,
    conn: &Connection,
    registry: &ModelRegistry,
) -> OrmResult<RelatedValue> {
    let mut holders = vec![owner.stripped_clone()];
    eager::populate_relation(&mut holders, name, &[], conn, registry).await?;
    holders
        .first_mut()
        .and_then(|holder| holder.take_relation(name))
        .ok_or_else(|| OrmError::Relation(format!("relation '{}' failed to resolve", name)))
}
