//! Eager relation loading
//!
//! Resolves relations for whole sets of records at once: one batched query
//! per relation (two with a junction), independent of how many owner
//! records there are. Related records are bucketed by their key tuple and
//! assigned back onto the owners; `inverse_of` wires the reciprocal
//! relation on every loaded record without another query.
//!
//! Bucket keys serialize the key tuple as a JSON array of the raw values.
//! JSON keeps the type tags (`[1]` vs `["1"]`), so distinct composite keys
//! cannot collapse into one bucket.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::conditions::Condition;
use crate::connection::Connection;
use crate::error::OrmResult;
use crate::model::{ModelDef, ModelRegistry, Record, RelatedValue};
use crate::query::Query;
use crate::value::DbValue;

use super::{RelationDef, Via};

/// Eagerly load the named relations onto the given records.
///
/// Dotted names load nested relations: `"orders.address"` loads `orders`
/// on the given records, then `address` on every loaded order. Relations
/// sharing a head are resolved with a single query for the head.
pub async fn find_with(
    models: &mut [Record],
    relations: &[&str],
    conn: &Connection,
    registry: &ModelRegistry,
) -> OrmResult<()> {
    let owned: Vec<String> = relations.iter().map(|s| s.to_string()).collect();
    find_with_inner(models, &owned, conn, registry).await
}

fn find_with_inner<'a>(
    models: &'a mut [Record],
    relations: &'a [String],
    conn: &'a Connection,
    registry: &'a ModelRegistry,
) -> Pin<Box<dyn Future<Output = OrmResult<()>> + Send + 'a>> {
    Box::pin(async move {
        if models.is_empty() || relations.is_empty() {
            return Ok(());
        }
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for path in relations {
            match path.split_once('.') {
                Some((head, rest)) => grouped
                    .entry(head.to_string())
                    .or_default()
                    .push(rest.to_string()),
                None => {
                    grouped.entry(path.clone()).or_default();
                }
            }
        }
        for (name, nested) in &grouped {
            populate_relation(models, name, nested, conn, registry).await?;
        }
        Ok(())
    })
}

/// Load one relation for a set of records and assign the buckets.
pub(crate) async fn populate_relation(
    models: &mut [Record],
    name: &str,
    nested: &[String],
    conn: &Connection,
    registry: &ModelRegistry,
) -> OrmResult<()> {
    if models.is_empty() {
        return Ok(());
    }
    let owner_def = models[0].def().clone();
    let rel = owner_def.relation(name)?.clone();
    let target_def = registry.get(&rel.target)?;

    let via = load_via_models(models, &rel, &owner_def, conn, registry).await?;

    // owner-side columns keying the primary records: through the junction
    // link when a via is involved, directly through the relation otherwise
    let owner_key_cols: Vec<String> = match &via {
        Some((_, via_link)) => via_link.iter().map(|(_, owner)| owner.clone()).collect(),
        None => rel.link.iter().map(|(_, local)| local.clone()).collect(),
    };

    let condition = match &via {
        Some((via_models, _)) => link_condition(&rel.link, via_models),
        None => link_condition(&rel.link, models),
    };

    // single-owner has-one access takes the cheaper one() path, with
    // identical inverse back-population
    if models.len() == 1 && !rel.multiple {
        let related = match condition {
            None => None,
            Some(cond) => relation_query(&target_def.table, cond, &rel)
                .one(conn)
                .await?
                .map(|row| Record::from_row(target_def.clone(), &row)),
        };
        let mut value = RelatedValue::One(related);
        if !nested.is_empty() {
            if let RelatedValue::One(Some(record)) = &mut value {
                find_with_inner(std::slice::from_mut(record), nested, conn, registry).await?;
            }
        }
        if let Some(inverse) = &rel.inverse_of {
            wire_inverse(&models[0], &mut value, inverse, &target_def)?;
        }
        models[0].populate_relation(name, value);
        return Ok(());
    }

    let mut related: Vec<Record> = match condition {
        None => Vec::new(),
        Some(cond) => relation_query(&target_def.table, cond, &rel)
            .all(conn)
            .await?
            .into_rows()
            .iter()
            .map(|row| Record::from_row(target_def.clone(), row))
            .collect(),
    };
    debug!(relation = name, count = related.len(), "eager-loaded relation");

    if !nested.is_empty() && !related.is_empty() {
        find_with_inner(&mut related, nested, conn, registry).await?;
    }

    let buckets = build_buckets(
        related,
        &rel,
        via.as_ref().map(|(m, l)| (m.as_slice(), l.as_slice())),
    );

    for model in models.iter_mut() {
        let keys = record_keys(model, &owner_key_cols);
        let mut merged: Vec<Record> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for key in &keys {
            if let Some(bucket) = buckets.get(key) {
                for record in bucket {
                    match record_signature(record) {
                        Some(signature) => {
                            if seen.insert(signature) {
                                merged.push(record.clone());
                            }
                        }
                        None => merged.push(record.clone()),
                    }
                }
            }
        }

        let mut value = if rel.multiple {
            match &rel.index_by {
                Some(column) => RelatedValue::ManyIndexed(index_records(merged, column)),
                None => RelatedValue::Many(merged),
            }
        } else {
            RelatedValue::One(merged.into_iter().next())
        };
        if let Some(inverse) = &rel.inverse_of {
            wire_inverse(model, &mut value, inverse, &target_def)?;
        }
        model.populate_relation(name, value);
    }
    Ok(())
}

/// Resolve the junction rows for a `via` relation.
///
/// Returns the junction records plus the junction link `(junction column,
/// owner column)` pairs, or `None` for a direct relation.
async fn load_via_models(
    models: &[Record],
    rel: &RelationDef,
    owner_def: &Arc<ModelDef>,
    conn: &Connection,
    registry: &ModelRegistry,
) -> OrmResult<Option<(Vec<Record>, Vec<(String, String)>)>> {
    match &rel.via {
        None => Ok(None),
        Some(Via::Relation(via_name)) => {
            let via_rel = owner_def.relation(via_name)?.clone();
            let via_def = registry.get(&via_rel.target)?;
            let records = match link_condition(&via_rel.link, models) {
                None => Vec::new(),
                Some(cond) => relation_query(&via_def.table, cond, &via_rel)
                    .all(conn)
                    .await?
                    .into_rows()
                    .iter()
                    .map(|row| Record::from_row(via_def.clone(), row))
                    .collect(),
            };
            Ok(Some((records, via_rel.link.clone())))
        }
        Some(Via::Table { table, link }) => {
            // transient definition covering exactly the junction columns in
            // play
            let mut columns: Vec<String> = Vec::new();
            for (junction, _) in link {
                if !columns.contains(junction) {
                    columns.push(junction.clone());
                }
            }
            for (_, junction) in &rel.link {
                if !columns.contains(junction) {
                    columns.push(junction.clone());
                }
            }
            let junction_def = Arc::new(ModelDef::new(
                format!("{}.junction", table),
                table.clone(),
                columns,
                Vec::new(),
            ));
            let records = match link_condition(link, models) {
                None => Vec::new(),
                Some(cond) => Query::new()
                    .from(table.clone())
                    .where_(cond)
                    .all(conn)
                    .await?
                    .into_rows()
                    .iter()
                    .map(|row| Record::from_row(junction_def.clone(), row))
                    .collect(),
            };
            Ok(Some((records, link.clone())))
        }
    }
}

/// The batched filter over the source records' key values: one `IN` for a
/// single-column link, OR-of-tuples for composite links. Duplicate keys
/// collapse before the query is built, and a local-side array value
/// contributes each of its elements.
fn link_condition(link: &[(String, String)], source: &[Record]) -> Option<Condition> {
    let target_cols: Vec<String> = link.iter().map(|(t, _)| t.clone()).collect();
    let source_cols: Vec<String> = link.iter().map(|(_, s)| s.clone()).collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut tuples: Vec<Vec<DbValue>> = Vec::new();
    let mut push = |tuple: Vec<DbValue>| {
        if seen.insert(bucket_key(&tuple)) {
            tuples.push(tuple);
        }
    };

    for record in source {
        if source_cols.len() == 1 {
            match record.get_attribute(&source_cols[0]) {
                Some(DbValue::Array(items)) => {
                    for item in items {
                        if !item.is_null() {
                            push(vec![item.clone()]);
                        }
                    }
                }
                Some(value) if !value.is_null() => push(vec![value.clone()]),
                _ => {}
            }
        } else {
            let tuple: Vec<DbValue> = source_cols.iter().map(|c| record.attribute(c)).collect();
            if !tuple.iter().all(DbValue::is_null) {
                push(tuple);
            }
        }
    }

    if tuples.is_empty() {
        None
    } else {
        Some(Condition::in_tuples(target_cols, tuples))
    }
}

fn relation_query(table: &str, condition: Condition, rel: &RelationDef) -> Query {
    let mut query = Query::new().from(table.to_string()).where_(condition);
    if !rel.condition.is_none() {
        query = query.and_where(rel.condition.clone());
    }
    if !rel.order_by.is_empty() {
        query = query.order_by(rel.order_by.clone());
    }
    query
}

/// Group related records by their link-key tuple. With junction rows the
/// related-side buckets are re-mapped onto owner-side keys through the
/// junction's two key sets.
fn build_buckets(
    related: Vec<Record>,
    rel: &RelationDef,
    via: Option<(&[Record], &[(String, String)])>,
) -> HashMap<String, Vec<Record>> {
    let link_key_cols: Vec<String> = rel.link.iter().map(|(t, _)| t.clone()).collect();

    let Some((via_models, via_link)) = via else {
        let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
        for record in related {
            for key in record_keys(&record, &link_key_cols) {
                buckets.entry(key).or_default().push(record.clone());
            }
        }
        return buckets;
    };

    // map each related-side key to the owner-side keys its junction rows
    // name, then walk the related records in result order so every owner
    // bucket keeps that order
    let junction_related_cols: Vec<String> =
        rel.link.iter().map(|(_, junction)| junction.clone()).collect();
    let junction_owner_cols: Vec<String> =
        via_link.iter().map(|(junction, _)| junction.clone()).collect();

    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for via_model in via_models {
        let owner_keys = record_keys(via_model, &junction_owner_cols);
        let related_keys = record_keys(via_model, &junction_related_cols);
        for related_key in &related_keys {
            let entry = map.entry(related_key.clone()).or_default();
            for owner_key in &owner_keys {
                if !entry.contains(owner_key) {
                    entry.push(owner_key.clone());
                }
            }
        }
    }

    let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
    for record in related {
        let mut assigned: HashSet<String> = HashSet::new();
        for related_key in record_keys(&record, &link_key_cols) {
            let Some(owner_keys) = map.get(&related_key) else {
                continue;
            };
            for owner_key in owner_keys {
                if assigned.insert(owner_key.clone()) {
                    buckets
                        .entry(owner_key.clone())
                        .or_default()
                        .push(record.clone());
                }
            }
        }
    }
    buckets
}

/// Back-populate the reciprocal relation on every loaded record.
///
/// The inverse slot takes a stripped clone of the owner (attributes and
/// baseline, no populated relations), shaped by the inverse relation's own
/// `multiple` flag.
fn wire_inverse(
    owner: &Record,
    value: &mut RelatedValue,
    inverse: &str,
    target_def: &Arc<ModelDef>,
) -> OrmResult<()> {
    let inverse_rel = target_def.relation(inverse)?;
    let back = if inverse_rel.multiple {
        RelatedValue::Many(vec![owner.stripped_clone()])
    } else {
        RelatedValue::One(Some(owner.stripped_clone()))
    };
    for record in value.records_mut() {
        record.populate_relation(inverse, back.clone());
    }
    Ok(())
}

/// Serialize a key tuple to a stable, collision-free bucket key.
pub(crate) fn bucket_key(values: &[DbValue]) -> String {
    let encoded: Vec<serde_json::Value> = values.iter().map(DbValue::to_json).collect();
    serde_json::to_string(&encoded).unwrap_or_default()
}

/// The bucket keys of one record over the given columns. A single
/// array-valued column yields one key per element (the many-valued link
/// mode); a composite key yields exactly one tuple key.
fn record_keys(record: &Record, columns: &[String]) -> Vec<String> {
    if columns.len() == 1 {
        match record.get_attribute(&columns[0]) {
            Some(DbValue::Array(items)) => items
                .iter()
                .map(|item| bucket_key(std::slice::from_ref(item)))
                .collect(),
            Some(value) => vec![bucket_key(std::slice::from_ref(value))],
            None => vec![bucket_key(&[DbValue::Null])],
        }
    } else {
        let values: Vec<DbValue> = columns.iter().map(|c| record.attribute(c)).collect();
        vec![bucket_key(&values)]
    }
}

fn record_signature(record: &Record) -> Option<String> {
    let pk = &record.def().primary_key;
    if pk.is_empty() {
        return None;
    }
    let values = record.key_values(pk);
    if values.iter().all(DbValue::is_null) {
        return None;
    }
    Some(bucket_key(&values))
}

fn index_records(records: Vec<Record>, column: &str) -> IndexMap<String, Record> {
    records
        .into_iter()
        .map(|record| {
            let key = match record.get_attribute(column) {
                Some(value) => value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_json().to_string()),
                None => String::new(),
            };
            (key, record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys_do_not_collide_across_types() {
        let int_key = bucket_key(&[DbValue::Int32(1), DbValue::Int32(2)]);
        let str_key = bucket_key(&[DbValue::String("1".into()), DbValue::String("2".into())]);
        let merged = bucket_key(&[DbValue::Int32(12)]);
        let mixed = bucket_key(&[DbValue::Int32(1), DbValue::String("2".into())]);
        let keys = [&int_key, &str_key, &merged, &mixed];
        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_bucket_key_is_deterministic() {
        let a = bucket_key(&[DbValue::Int64(5), DbValue::String("x".into())]);
        let b = bucket_key(&[DbValue::Int64(5), DbValue::String("x".into())]);
        assert_eq!(a, b);
    }
}
