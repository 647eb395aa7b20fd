//! Schema snapshot types.
//!
//! A [`SchemaSnapshot`] is a complete description of every tracked table at
//! one point in time. Snapshots are produced by model introspection (the
//! "current" schema) or loaded from the state store (the "previous" schema)
//! and are compared structurally by the differ.
//!
//! All collections are ordered maps so that equality, iteration and the
//! persisted JSON are independent of insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// SQL data types tracked by the schema model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date and time.
    DateTime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON data.
    Json,
    /// UUID.
    Uuid,
    /// Any type the model layer reports that has no dedicated variant,
    /// kept verbatim (e.g. `"ENUM('a','b')"`).
    Custom(String),
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String literal default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL literal for this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if the referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL keyword(s) for this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Whether this column auto-increments.
    #[serde(default)]
    pub auto_increment: bool,
    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnDef {
    /// Creates a nullable column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            auto_increment: false,
            primary_key: false,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its table.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
    /// Index method (e.g. "BTREE"), opaque to the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl IndexDef {
    /// Creates a non-unique index over the given columns.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: None,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the index method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// Definition of a foreign key constraint.
///
/// A foreign key is identified within its table by its constrained columns,
/// see [`ForeignKeyDef::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name, used by renderers.
    pub name: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub references_table: String,
    /// Referenced column(s).
    pub references_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDef {
    /// Creates a single-column foreign key. The constraint name defaults to
    /// `fk_<column>`.
    #[must_use]
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            name: format!("fk_{}", column),
            columns: vec![column],
            references_table: references_table.into(),
            references_columns: vec![references_column.into()],
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Identity of this constraint within its table: the constrained
    /// columns joined by `,`.
    #[must_use]
    pub fn key(&self) -> String {
        self.columns.join(",")
    }
}

/// Complete definition of a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns by name.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnDef>,
    /// Indexes by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
    /// Foreign keys by [`ForeignKeyDef::key`].
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKeyDef>,
    /// Table-level options (engine, charset, comment, ...).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl TableDef {
    /// Creates an empty table definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column, replacing any column with the same name.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Adds an index, replacing any index with the same name.
    #[must_use]
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Adds a foreign key, replacing any constraint on the same columns.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.insert(fk.key(), fk);
        self
    }

    /// Sets a table option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    /// Primary key column names, in column-name order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Tables this table references through its foreign keys, excluding
    /// itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .values()
            .map(|fk| fk.references_table.as_str())
            .filter(move |t| *t != self.name)
    }

    /// Returns a copy of this table without its foreign keys.
    #[must_use]
    pub fn without_foreign_keys(&self) -> Self {
        Self {
            foreign_keys: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// A complete, revisioned description of all tracked tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Revision this snapshot was recorded at; 0 for the empty state.
    #[serde(default)]
    pub revision: u64,
    /// Tables by name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableDef>,
}

impl SchemaSnapshot {
    /// Creates the zero snapshot (revision 0, no tables).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table with the same name.
    #[must_use]
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Sets the revision.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Returns table names in order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Whether the snapshot describes no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
