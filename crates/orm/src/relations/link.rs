//! Establishing and breaking relations
//!
//! `link` makes two records related: for a direct relation it writes the
//! foreign-key attributes onto the dependent record and saves it; for a
//! `via` relation it inserts the junction row. `unlink` is the reverse,
//! optionally deleting the dependent record. Both keep an already
//! populated relation slot coherent with the change.

use crate::conditions::Condition;
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::model::{ModelRegistry, Record, RelatedValue};
use crate::query::SetExpr;
use crate::value::DbValue;

use super::Via;

impl Record {
    /// Relate `target` to this record through the named relation.
    pub async fn link(
        &mut self,
        name: &str,
        target: &mut Record,
        conn: &Connection,
        registry: &ModelRegistry,
    ) -> OrmResult<()> {
        let rel = self.def().relation(name)?.clone();
        match &rel.via {
            Some(via) => {
                let (junction_table, junction_link) = resolve_junction(self, via, registry)?;
                let mut columns: Vec<(String, DbValue)> = Vec::new();
                for (junction_col, owner_col) in &junction_link {
                    columns.push((junction_col.clone(), self.attribute(owner_col)));
                }
                for (target_col, junction_col) in &rel.link {
                    columns.push((junction_col.clone(), target.attribute(target_col)));
                }
                let (sql, params) = conn.query_builder().insert(&junction_table, &columns);
                conn.create_command(sql, params).execute().await?;
            }
            None => {
                for (target_col, owner_col) in &rel.link {
                    let value = self.attribute(owner_col);
                    if value.is_null() {
                        return Err(OrmError::InvalidKey(format!(
                            "cannot link '{}': owner key '{}' is unset",
                            name, owner_col
                        )));
                    }
                    target.set_attribute(target_col, value)?;
                }
                target.save(conn).await?;
            }
        }

        if let Some(value) = self.populated_relation_mut(name) {
            match value {
                RelatedValue::Many(list) => list.push(target.stripped_clone()),
                RelatedValue::ManyIndexed(map) => {
                    if let Some(column) = &rel.index_by {
                        let key = match target.get_attribute(column) {
                            Some(v) => v
                                .as_str()
                                .map(str::to_string)
                                .unwrap_or_else(|| v.to_json().to_string()),
                            None => String::new(),
                        };
                        map.insert(key, target.stripped_clone());
                    }
                }
                RelatedValue::One(slot) => *slot = Some(target.stripped_clone()),
            }
        }
        Ok(())
    }

    /// Break the relation between this record and `target`.
    ///
    /// For a `via` relation the junction row is deleted (or its key
    /// columns nulled when `delete` is false). For a direct relation the
    /// foreign keys on `target` are nulled; with `delete` the dependent
    /// record is deleted instead of saved.
    pub async fn unlink(
        &mut self,
        name: &str,
        target: &mut Record,
        delete: bool,
        conn: &Connection,
        registry: &ModelRegistry,
    ) -> OrmResult<()> {
        let rel = self.def().relation(name)?.clone();
        match &rel.via {
            Some(via) => {
                let (junction_table, junction_link) = resolve_junction(self, via, registry)?;
                let mut condition = Condition::None;
                for (junction_col, owner_col) in &junction_link {
                    condition = condition
                        .and_with(Condition::eq(junction_col.clone(), self.attribute(owner_col)));
                }
                for (target_col, junction_col) in &rel.link {
                    condition = condition.and_with(Condition::eq(
                        junction_col.clone(),
                        target.attribute(target_col),
                    ));
                }
                if delete {
                    let (sql, params) = conn.query_builder().delete(&junction_table, &condition)?;
                    conn.create_command(sql, params).execute().await?;
                } else {
                    let sets: Vec<(String, SetExpr)> = rel
                        .link
                        .iter()
                        .map(|(_, junction_col)| {
                            (junction_col.clone(), SetExpr::Value(DbValue::Null))
                        })
                        .collect();
                    let (sql, params) =
                        conn.query_builder()
                            .update(&junction_table, &sets, &condition)?;
                    conn.create_command(sql, params).execute().await?;
                }
            }
            None => {
                for (target_col, _) in &rel.link {
                    target.set_attribute(target_col, DbValue::Null)?;
                }
                if delete {
                    target.delete(conn).await?;
                } else {
                    target.save(conn).await?;
                }
            }
        }

        if let Some(value) = self.populated_relation_mut(name) {
            match value {
                RelatedValue::Many(list) => list.retain(|r| !r.same_entity(target)),
                RelatedValue::ManyIndexed(map) => map.retain(|_, r| !r.same_entity(target)),
                RelatedValue::One(slot) => {
                    if slot.as_ref().map_or(false, |r| r.same_entity(target)) {
                        *slot = None;
                    }
                }
            }
        }
        Ok(())
    }
}

/// The junction table and its `(junction column, owner column)` link for a
/// `via` specification.
fn resolve_junction(
    owner: &Record,
    via: &Via,
    registry: &ModelRegistry,
) -> OrmResult<(String, Vec<(String, String)>)> {
    match via {
        Via::Table { table, link } => Ok((table.clone(), link.clone())),
        Via::Relation(via_name) => {
            let via_rel = owner.def().relation(via_name)?;
            let via_def = registry.get(&via_rel.target)?;
            Ok((via_def.table.clone(), via_rel.link.clone()))
        }
    }
}
