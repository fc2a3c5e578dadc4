//! Relation declarations and resolution
//!
//! A relation is declared on a model definition: which model it targets,
//! the foreign-key/local-key column pairs (`link`), whether it is
//! has-many, an optional junction (`via`), and an optional reciprocal
//! relation (`inverse_of`) to back-populate. Resolution is either lazy
//! (one query on first access, cached on the record) or eager (one
//! batched query for a whole set of records, bucketed by key).

pub mod eager;
pub mod lazy;
pub mod link;


pub use eager::find_with;

use crate::conditions::Condition;
use crate::query::OrderDirection;

/// Junction specification for a relation that hops through an
/// intermediate table.
#[derive(Debug, Clone, PartialEq)]
pub enum Via {
    /// A named relation declared on the same model supplies the junction
    /// rows; this relation's `link` then maps target columns to junction
    /// columns.
    Relation(String),
    /// A raw junction table; `link` maps junction columns to owner
    /// columns.
    Table {
        table: String,
        link: Vec<(String, String)>,
    },
}

/// One declared relation.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// Target model name, resolved through the registry
    pub target: String,
    /// Column pairs `(column on target, column on owner)`; for a `via`
    /// relation the owner side names junction columns instead
    pub link: Vec<(String, String)>,
    /// has-many vs. has-one
    pub multiple: bool,
    pub via: Option<Via>,
    /// Reciprocal relation on the target to back-populate after loading
    pub inverse_of: Option<String>,
    /// Re-key a has-many result by this target column
    pub index_by: Option<String>,
    /// Extra condition ANDed onto the target query
    pub condition: Condition,
    pub order_by: Vec<(String, OrderDirection)>,
}

impl RelationDef {
    fn new<L, A, B>(target: impl Into<String>, link: L, multiple: bool) -> Self
    where
        L: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            target: target.into(),
            link: link
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
            multiple,
            via: None,
            inverse_of: None,
            index_by: None,
            condition: Condition::None,
            order_by: Vec::new(),
        }
    }

    /// Declare a has-one relation: `link` pairs `(target column, owner
    /// column)`.
    pub fn has_one<L, A, B>(target: impl Into<String>, link: L) -> Self
    where
        L: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::new(target, link, false)
    }

    /// Declare a has-many relation.
    pub fn has_many<L, A, B>(target: impl Into<String>, link: L) -> Self
    where
        L: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::new(target, link, true)
    }

    /// Route this relation through a named relation's rows.
    pub fn via(mut self, relation: impl Into<String>) -> Self {
        self.via = Some(Via::Relation(relation.into()));
        self
    }

    /// Route this relation through a raw junction table; `link` pairs
    /// `(junction column, owner column)`.
    pub fn via_table<L, A, B>(mut self, table: impl Into<String>, link: L) -> Self
    where
        L: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.via = Some(Via::Table {
            table: table.into(),
            link: link
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        });
        self
    }

    /// Name the reciprocal relation to back-populate on loaded records.
    pub fn inverse_of(mut self, relation: impl Into<String>) -> Self {
        self.inverse_of = Some(relation.into());
        self
    }

    /// Re-key has-many results by a target column.
    pub fn index_by(mut self, column: impl Into<String>) -> Self {
        self.index_by = Some(column.into());
        self
    }

    /// AND an extra condition onto the target query.
    pub fn on_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }
}
