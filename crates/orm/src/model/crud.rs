//! Record persistence
//!
//! Insert/update/delete built on dirty tracking: updates write only the
//! attributes that changed against the baseline, keyed by the baseline
//! primary key. With a version column declared, updates and deletes become
//! compare-and-swap: a zero-row result means someone else won the race and
//! surfaces as a stale-object error, never a silent retry.

use tracing::debug;

use crate::conditions::Condition;
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::query::{Query, QueryResults, SetExpr};
use crate::value::DbValue;

use super::record::Record;

impl Record {
    /// Insert this record.
    ///
    /// All set attributes are written; an auto-increment key left unset is
    /// filled from the driver's `last_insert_id`. On success the record
    /// adopts its attributes as the stored baseline.
    pub async fn insert(&mut self, conn: &Connection) -> OrmResult<()> {
        if !self.is_new_record() {
            return Err(OrmError::InvalidKey(
                "cannot insert a record that is already stored".to_string(),
            ));
        }
        let def = self.def().clone();

        if let Some(version_column) = &def.version_column {
            let unset = self
                .get_attribute(version_column)
                .map_or(true, DbValue::is_null);
            if unset {
                self.set_attribute_unchecked(version_column, DbValue::Int64(0));
            }
        }

        let values: Vec<(String, DbValue)> = def
            .attributes
            .iter()
            .filter_map(|name| self.get_attribute(name).map(|v| (name.clone(), v.clone())))
            .collect();

        let (sql, params) = conn.query_builder().insert(&def.table, &values);
        conn.create_command(sql, params).execute().await?;

        if let Some(auto) = &def.auto_increment {
            let missing = self.get_attribute(auto).map_or(true, DbValue::is_null);
            if missing {
                let id = conn.last_insert_id(def.sequence_name.as_deref()).await?;
                self.set_attribute_unchecked(auto, id);
            }
        }

        self.mark_as_old();
        debug!(table = %def.table, "record inserted");
        Ok(())
    }

    /// Update this record's dirty attributes.
    ///
    /// Returns the affected row count; 0 with nothing dirty means no
    /// statement was issued at all. With a version column the update is
    /// conditional on the baseline version and bumps it by exactly one; a
    /// zero-row result then raises `StaleObject`.
    pub async fn update(&mut self, conn: &Connection) -> OrmResult<u64> {
        if self.is_new_record() {
            return Err(OrmError::InvalidKey(
                "cannot update a record that was never stored".to_string(),
            ));
        }
        let def = self.def().clone();
        let dirty = self.dirty_attributes(None);
        if dirty.is_empty() && def.version_column.is_none() {
            return Ok(0);
        }

        let mut condition = Condition::hash(self.old_primary_key_values()?);
        let mut sets: Vec<(String, SetExpr)> = dirty
            .into_iter()
            .map(|(name, value)| (name, SetExpr::Value(value)))
            .collect();

        let mut bumped_version = None;
        if let Some(version_column) = &def.version_column {
            if sets.is_empty() {
                return Ok(0);
            }
            let old_version = self
                .old_attribute(version_column)
                .and_then(DbValue::as_i64)
                .unwrap_or(0);
            condition = condition.and_with(Condition::eq(version_column.clone(), old_version));
            sets.retain(|(name, _)| name != version_column);
            sets.push((
                version_column.clone(),
                SetExpr::Value(DbValue::Int64(old_version + 1)),
            ));
            bumped_version = Some((version_column.clone(), old_version + 1));
        }

        let (sql, params) = conn.query_builder().update(&def.table, &sets, &condition)?;
        let rows = conn.create_command(sql, params).execute().await?;

        if rows == 0 && def.version_column.is_some() {
            return Err(OrmError::StaleObject(format!(
                "the row in '{}' was updated or deleted by another writer",
                def.table
            )));
        }

        if let Some((column, version)) = bumped_version {
            self.set_attribute_unchecked(&column, DbValue::Int64(version));
        }
        self.mark_as_old();
        debug!(table = %def.table, rows, "record updated");
        Ok(rows)
    }

    /// Delete this record, keyed by the baseline primary key.
    ///
    /// With a version column the delete is conditional on the baseline
    /// version; a zero-row result raises `StaleObject`.
    pub async fn delete(&mut self, conn: &Connection) -> OrmResult<u64> {
        if self.is_new_record() {
            return Err(OrmError::InvalidKey(
                "cannot delete a record that was never stored".to_string(),
            ));
        }
        let def = self.def().clone();

        let mut condition = Condition::hash(self.old_primary_key_values()?);
        if let Some(version_column) = &def.version_column {
            let old_version = self
                .old_attribute(version_column)
                .and_then(DbValue::as_i64)
                .unwrap_or(0);
            condition = condition.and_with(Condition::eq(version_column.clone(), old_version));
        }

        let (sql, params) = conn.query_builder().delete(&def.table, &condition)?;
        let rows = conn.create_command(sql, params).execute().await?;

        if rows == 0 && def.version_column.is_some() {
            return Err(OrmError::StaleObject(format!(
                "the row in '{}' was updated or deleted by another writer",
                def.table
            )));
        }

        self.clear_baseline();
        debug!(table = %def.table, rows, "record deleted");
        Ok(rows)
    }

    /// Insert when new, update otherwise.
    pub async fn save(&mut self, conn: &Connection) -> OrmResult<u64> {
        if self.is_new_record() {
            self.insert(conn).await?;
            Ok(1)
        } else {
            self.update(conn).await
        }
    }

    /// Re-read this record's row by its baseline primary key.
    ///
    /// Returns `false` when the row no longer exists. On success the
    /// attributes, baseline, and populated relations are all reset.
    pub async fn refresh(&mut self, conn: &Connection) -> OrmResult<bool> {
        let def = self.def().clone();
        let condition = Condition::hash(self.old_primary_key_values()?);
        let row = Query::new()
            .from(def.table.clone())
            .where_(condition)
            .one(conn)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let fresh = Record::from_row(def, &row);
        *self = fresh;
        Ok(true)
    }

    /// Atomically adjust counter columns, bypassing dirty tracking.
    ///
    /// The increments run server-side (`col = col + n`), so concurrent
    /// writers never lose updates. The in-memory value and its baseline
    /// are adjusted by the same deltas on success.
    pub async fn update_counters(
        &mut self,
        conn: &Connection,
        counters: &[(&str, i64)],
    ) -> OrmResult<bool> {
        if self.is_new_record() {
            return Err(OrmError::InvalidKey(
                "cannot update counters on an unsaved record".to_string(),
            ));
        }
        if counters.is_empty() {
            return Ok(false);
        }
        let def = self.def().clone();
        let dialect = conn.dialect();

        let sets: Vec<(String, SetExpr)> = counters
            .iter()
            .map(|(name, delta)| {
                (
                    name.to_string(),
                    SetExpr::Expr(format!("{} + ({})", dialect.quote_identifier(name), delta)),
                )
            })
            .collect();
        let condition = Condition::hash(self.old_primary_key_values()?);
        let (sql, params) = conn.query_builder().update(&def.table, &sets, &condition)?;
        let rows = conn.create_command(sql, params).execute().await?;
        if rows == 0 {
            return Ok(false);
        }

        for (name, delta) in counters {
            let current = self
                .get_attribute(name)
                .and_then(DbValue::as_i64)
                .unwrap_or(0);
            self.set_attribute_unchecked(name, DbValue::Int64(current + delta));
        }
        self.mark_as_old();
        Ok(true)
    }
}

/// Find one record by primary key.
pub async fn find_by_pk(
    conn: &Connection,
    def: &std::sync::Arc<crate::model::ModelDef>,
    key: &[DbValue],
) -> OrmResult<Option<Record>> {
    if def.primary_key.is_empty() {
        return Err(OrmError::Configuration(format!(
            "model '{}' declares no primary key",
            def.name
        )));
    }
    if def.primary_key.len() != key.len() {
        return Err(OrmError::InvalidKey(format!(
            "expected {} key values for model '{}', got {}",
            def.primary_key.len(),
            def.name,
            key.len()
        )));
    }
    let pairs: Vec<(String, DbValue)> = def
        .primary_key
        .iter()
        .cloned()
        .zip(key.iter().cloned())
        .collect();
    let row = Query::new()
        .from(def.table.clone())
        .where_(Condition::hash(pairs))
        .one(conn)
        .await?;
    Ok(row.map(|r| Record::from_row(def.clone(), &r)))
}

/// Find all records matching a condition.
pub async fn find_all(
    conn: &Connection,
    def: &std::sync::Arc<crate::model::ModelDef>,
    condition: Condition,
) -> OrmResult<Vec<Record>> {
    let results: QueryResults = Query::new()
        .from(def.table.clone())
        .where_(condition)
        .all(conn)
        .await?;
    Ok(results
        .into_rows()
        .into_iter()
        .map(|row| Record::from_row(def.clone(), &row))
        .collect())
}
