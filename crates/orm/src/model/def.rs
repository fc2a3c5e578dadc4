//! Model definitions
//!
//! A `ModelDef` is the static description of one record type: its table,
//! the fixed attribute set, primary key, optional optimistic-lock column,
//! and declared relations. Definitions reference each other by model name
//! through a `ModelRegistry` so relation graphs (including cycles) never
//! need cyclic ownership.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{OrmError, OrmResult};
use crate::relations::RelationDef;
use crate::schema::TableSchema;

/// Static description of one record type.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    /// The fixed, schema-derived attribute set
    pub attributes: Vec<String>,
    pub primary_key: Vec<String>,
    /// Column filled from `last_insert_id` after insert
    pub auto_increment: Option<String>,
    /// Sequence name passed to the driver for `last_insert_id`
    pub sequence_name: Option<String>,
    /// Optimistic-lock version column
    pub version_column: Option<String>,
    pub relations: HashMap<String, RelationDef>,
}

impl ModelDef {
    pub fn new<I, S>(
        name: impl Into<String>,
        table: impl Into<String>,
        attributes: I,
        primary_key: Vec<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            primary_key,
            auto_increment: None,
            sequence_name: None,
            version_column: None,
            relations: HashMap::new(),
        }
    }

    /// Derive a definition from table metadata.
    pub fn from_table_schema(name: impl Into<String>, schema: &TableSchema) -> Self {
        let auto_increment = schema
            .columns
            .iter()
            .find(|c| c.auto_increment)
            .map(|c| c.name.clone());
        Self {
            name: name.into(),
            table: schema.name.clone(),
            attributes: schema.column_names(),
            primary_key: schema.primary_key.clone(),
            auto_increment,
            sequence_name: schema.sequence_name.clone(),
            version_column: None,
            relations: HashMap::new(),
        }
    }

    pub fn with_auto_increment(mut self, column: impl Into<String>) -> Self {
        self.auto_increment = Some(column.into());
        self
    }

    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence_name = Some(sequence.into());
        self
    }

    pub fn with_version_column(mut self, column: impl Into<String>) -> Self {
        self.version_column = Some(column.into());
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Look up a declared relation.
    pub fn relation(&self, name: &str) -> OrmResult<&RelationDef> {
        self.relations.get(name).ok_or_else(|| {
            OrmError::Relation(format!(
                "model '{}' declares no relation '{}'",
                self.name, name
            ))
        })
    }
}

/// Registry of model definitions, addressed by model name.
#[derive(Default)]
pub struct ModelRegistry {
    defs: RwLock<HashMap<String, Arc<ModelDef>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: ModelDef) -> Arc<ModelDef> {
        let def = Arc::new(def);
        self.defs
            .write()
            .unwrap()
            .insert(def.name.clone(), Arc::clone(&def));
        def
    }

    pub fn get(&self, name: &str) -> OrmResult<Arc<ModelDef>> {
        self.defs
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Configuration(format!("unknown model '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationDef;
    use crate::schema::{ColumnSchema, ColumnType};

    #[test]
    fn test_from_table_schema() {
        let schema = TableSchema::new("users")
            .with_column(ColumnSchema::new("id", ColumnType::BigInt).primary().auto_increment())
            .with_column(ColumnSchema::new("name", ColumnType::String).not_null());
        let def = ModelDef::from_table_schema("User", &schema);
        assert_eq!(def.table, "users");
        assert_eq!(def.primary_key, vec!["id".to_string()]);
        assert_eq!(def.auto_increment.as_deref(), Some("id"));
        assert_eq!(def.attributes, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ModelRegistry::new();
        registry.register(ModelDef::new(
            "User",
            "users",
            ["id", "name"],
            vec!["id".to_string()],
        ));
        assert!(registry.get("User").is_ok());
        assert!(matches!(
            registry.get("Ghost"),
            Err(OrmError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_relation_errors() {
        let def = ModelDef::new("User", "users", ["id"], vec!["id".to_string()])
            .with_relation("orders", RelationDef::has_many("Order", [("customer_id", "id")]));
        assert!(def.relation("orders").is_ok());
        assert!(matches!(def.relation("nope"), Err(OrmError::Relation(_))));
    }
}
