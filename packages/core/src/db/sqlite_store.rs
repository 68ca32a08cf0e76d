//! SqliteTreeStore - TreeStore Implementation for the libsql Backend
//!
//! Every bulk request of the [`TreeStore`] trait becomes exactly one SQL
//! statement. Table and column names come from [`TreeConfig`] and are
//! interpolated into the statements (the config validator only admits plain
//! identifiers); all values travel as positional parameters.
//!
//! # Connections
//!
//! The store owns a single `libsql::Connection`. A `:memory:` database is
//! private to the connection that opened it, and the statements of one
//! structural operation must share the caller's transaction, so nothing here
//! ever opens a second connection.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nodespace_nested_set::config::TreeConfig;
//! use nodespace_nested_set::db::{SqliteTreeStore, TreeStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteTreeStore::open(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?;
//!     assert!(!store.supports_soft_delete());
//!     Ok(())
//! }
//! ```

use super::error::DatabaseError;
use super::store::{
    BoundsUpdate, HealthCheck, MarkFilter, ParentFilter, RangeFilter, Relocation, Selection,
    Selector, Shift, TrashFilter, TrashMatch, TreeScope, TreeStore,
};
use crate::config::{ColumnNames, TreeConfig};
use crate::models::{Key, NodeRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// `TreeStore` backed by a local libsql (SQLite) database
pub struct SqliteTreeStore {
    /// Kept alive for the lifetime of the connection
    _db: Database,
    conn: Connection,
    config: TreeConfig,
    db_path: Option<PathBuf>,
    in_transaction: AtomicBool,
}

impl SqliteTreeStore {
    /// Open (or create) a database file and initialize the node table
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The configuration names are not valid identifiers
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn open(db_path: PathBuf, config: TreeConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        if db_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        let conn = db.connect()?;

        let store = Self {
            _db: db,
            conn,
            config,
            db_path: Some(db_path),
            in_transaction: AtomicBool::new(false),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database
    pub async fn open_in_memory(config: TreeConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(PathBuf::from(":memory:"), e))?;
        let conn = db.connect()?;

        let store = Self {
            _db: db,
            conn,
            config,
            db_path: None,
            in_transaction: AtomicBool::new(false),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() instead of execute().
    async fn execute_pragma(&self, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = self.conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create the node table and its indexes (idempotent)
    ///
    /// `id`, `parent` and `tree` are declared without a type so that integer
    /// and text keys are stored as given.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        if self.db_path.is_some() {
            self.execute_pragma("PRAGMA journal_mode = WAL").await?;
        }
        self.execute_pragma("PRAGMA busy_timeout = 5000").await?;

        let t = &self.config.table;
        let c = &self.config.columns;

        self.conn
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {t} (
                        {id} PRIMARY KEY NOT NULL,
                        {left} INTEGER NOT NULL,
                        {right} INTEGER NOT NULL,
                        {level} INTEGER NOT NULL DEFAULT 0,
                        {parent},
                        {tree},
                        {deleted_at} TEXT,
                        {marker} INTEGER NOT NULL DEFAULT 0,
                        {properties} TEXT NOT NULL DEFAULT '{{}}'
                    )",
                    t = t,
                    id = c.id,
                    left = c.left,
                    right = c.right,
                    level = c.level,
                    parent = c.parent,
                    tree = c.tree,
                    deleted_at = c.deleted_at,
                    marker = c.marker,
                    properties = c.properties,
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create {} table: {}", t, e))
            })?;

        let indexes = [
            (
                format!("idx_{}_bounds", t),
                format!("{}, {}, {}", c.tree, c.left, c.right),
            ),
            (format!("idx_{}_parent", t), c.parent.clone()),
        ];
        for (name, columns) in indexes {
            self.conn
                .execute(
                    &format!("CREATE INDEX IF NOT EXISTS {} ON {}({})", name, t, columns),
                    (),
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to create index '{}': {}",
                        name, e
                    ))
                })?;
        }

        tracing::debug!("Initialized nested-set table '{}'", t);
        Ok(())
    }

    fn columns(&self) -> &ColumnNames {
        &self.config.columns
    }

    fn filter(&self, alias: &'static str) -> Filter<'_> {
        Filter::new(&self.config, alias)
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        self.conn
            .execute(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))
    }

    async fn query_scalar(&self, sql: &str, params: Vec<Value>) -> Result<Value, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))?;
        match rows.next().await? {
            Some(row) => Ok(row.get_value(0)?),
            None => Ok(Value::Null),
        }
    }

    async fn query_count(&self, sql: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        match self.query_scalar(sql, params).await? {
            Value::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(DatabaseError::unexpected_value(
                "COUNT(*)",
                format!("expected a non-negative integer, got {:?}", other),
            )),
        }
    }

    async fn query_records(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<NodeRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(self.row_to_record(&row)?);
        }
        Ok(records)
    }

    fn select_columns(&self) -> String {
        let c = self.columns();
        format!(
            "{}, {}, {}, {}, {}, {}, {}, {}",
            c.id, c.left, c.right, c.level, c.parent, c.tree, c.deleted_at, c.properties
        )
    }

    /// Convert a row produced by `select_columns()` into a record
    fn row_to_record(&self, row: &Row) -> Result<NodeRecord, DatabaseError> {
        let c = self.columns();

        let id = value_to_key(row.get_value(0)?, &c.id)?
            .ok_or_else(|| DatabaseError::unexpected_value(&c.id, "NULL primary key"))?;
        let left = value_to_int(row.get_value(1)?, &c.left)?;
        let right = value_to_int(row.get_value(2)?, &c.right)?;
        let level = value_to_int(row.get_value(3)?, &c.level)?;
        let parent_id = value_to_key(row.get_value(4)?, &c.parent)?;
        let tree_id = value_to_key(row.get_value(5)?, &c.tree)?;

        let deleted_at = match row.get_value(6)? {
            Value::Null => None,
            Value::Text(text) => Some(
                DateTime::parse_from_rfc3339(&text)
                    .map_err(|e| DatabaseError::unexpected_value(&c.deleted_at, e.to_string()))?
                    .with_timezone(&Utc),
            ),
            other => {
                return Err(DatabaseError::unexpected_value(
                    &c.deleted_at,
                    format!("expected RFC 3339 text, got {:?}", other),
                ))
            }
        };

        let properties = match row.get_value(7)? {
            Value::Null => serde_json::Value::Object(Default::default()),
            Value::Text(text) => serde_json::from_str(&text)
                .map_err(|e| DatabaseError::unexpected_value(&c.properties, e.to_string()))?,
            other => {
                return Err(DatabaseError::unexpected_value(
                    &c.properties,
                    format!("expected JSON text, got {:?}", other),
                ))
            }
        };

        Ok(NodeRecord {
            id,
            left,
            right,
            level,
            parent_id,
            tree_id,
            deleted_at,
            properties,
        })
    }

    fn same_tree(&self, a: &str, b: &str) -> String {
        if self.config.multi_tree {
            format!(" AND {a}.{tree} IS {b}.{tree}", a = a, b = b, tree = self.columns().tree)
        } else {
            String::new()
        }
    }

    fn health_sql(&self, check: HealthCheck, scope: &TreeScope) -> (String, Vec<Value>) {
        let t = &self.config.table;
        let c = self.columns();

        let mut filter = self.filter("c");
        filter.scope(scope);

        match check {
            HealthCheck::Oddness => {
                filter.push(
                    format!(
                        "(c.{l} >= c.{r} OR (c.{r} - c.{l}) % 2 = 0)",
                        l = c.left,
                        r = c.right
                    ),
                    [],
                );
                (
                    format!("SELECT COUNT(*) FROM {} c{}", t, filter.where_clause()),
                    filter.into_params(),
                )
            }
            HealthCheck::Duplicates => {
                let mut other = self.filter("d");
                other.scope(scope);
                filter.push(
                    format!(
                        "c.{id} < d.{id}{same} AND (c.{l} = d.{l} OR c.{r} = d.{r} OR c.{l} = d.{r} OR c.{r} = d.{l})",
                        id = c.id,
                        l = c.left,
                        r = c.right,
                        same = self.same_tree("c", "d")
                    ),
                    [],
                );
                filter.extend(other);
                (
                    format!("SELECT COUNT(*) FROM {t} c, {t} d{}", filter.where_clause(), t = t),
                    filter.into_params(),
                )
            }
            HealthCheck::WrongParent => {
                filter.push(
                    format!(
                        "(NOT (p.{l} < c.{l} AND c.{r} < p.{r}) OR EXISTS (
                            SELECT 1 FROM {t} m
                            WHERE m.{id} <> p.{id} AND m.{id} <> c.{id}{same}
                              AND m.{l} > p.{l} AND m.{r} < p.{r}
                              AND m.{l} < c.{l} AND m.{r} > c.{r}
                        ))",
                        t = t,
                        id = c.id,
                        l = c.left,
                        r = c.right,
                        same = self.same_tree("m", "c")
                    ),
                    [],
                );
                (
                    format!(
                        "SELECT COUNT(*) FROM {t} c JOIN {t} p ON p.{id} = c.{parent}{same}{filter}",
                        t = t,
                        id = c.id,
                        parent = c.parent,
                        same = self.same_tree("p", "c"),
                        filter = filter.where_clause()
                    ),
                    filter.into_params(),
                )
            }
            HealthCheck::MissingParent => {
                filter.push(
                    format!(
                        "c.{parent} IS NOT NULL AND NOT EXISTS (SELECT 1 FROM {t} p WHERE p.{id} = c.{parent}{same})",
                        t = t,
                        id = c.id,
                        parent = c.parent,
                        same = self.same_tree("p", "c")
                    ),
                    [],
                );
                (
                    format!("SELECT COUNT(*) FROM {} c{}", t, filter.where_clause()),
                    filter.into_params(),
                )
            }
            HealthCheck::WrongLevel => {
                filter.push(format!("c.{lvl} <> p.{lvl} + 1", lvl = c.level), []);
                (
                    format!(
                        "SELECT COUNT(*) FROM {t} c JOIN {t} p ON p.{id} = c.{parent}{same}{filter}",
                        t = t,
                        id = c.id,
                        parent = c.parent,
                        same = self.same_tree("p", "c"),
                        filter = filter.where_clause()
                    ),
                    filter.into_params(),
                )
            }
        }
    }
}

/// WHERE-clause builder; clauses are AND-ed, parameters kept in order
struct Filter<'a> {
    config: &'a TreeConfig,
    alias: &'static str,
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl<'a> Filter<'a> {
    fn new(config: &'a TreeConfig, alias: &'static str) -> Self {
        Self {
            config,
            alias,
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn col(&self, name: &str) -> String {
        if self.alias.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.alias, name)
        }
    }

    fn push(&mut self, clause: String, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause);
        self.params.extend(params);
    }

    fn extend(&mut self, other: Filter<'_>) {
        self.clauses.extend(other.clauses);
        self.params.extend(other.params);
    }

    fn scope(&mut self, scope: &TreeScope) {
        if let Some(tree_id) = scope.tree_id() {
            let clause = format!("{} = ?", self.col(&self.config.columns.tree));
            self.push(clause, [key_to_value(tree_id)]);
        }
    }

    fn tree(&mut self, tree_id: Option<&Key>) {
        if let Some(tree_id) = tree_id {
            self.scope(&TreeScope::Tree(tree_id.clone()));
        }
    }

    fn trash(&mut self, trash: TrashFilter) {
        if !self.config.soft_delete {
            return;
        }
        let column = self.col(&self.config.columns.deleted_at);
        match trash {
            TrashFilter::All => {}
            TrashFilter::WithoutTrashed => self.push(format!("{} IS NULL", column), []),
            TrashFilter::OnlyTrashed => self.push(format!("{} IS NOT NULL", column), []),
        }
    }

    fn marks(&mut self, marks: MarkFilter) {
        let column = self.col(&self.config.columns.marker);
        match marks {
            MarkFilter::Any => {}
            MarkFilter::Unmarked => self.push(format!("{} = 0", column), []),
            MarkFilter::Marked => self.push(format!("{} = 1", column), []),
        }
    }

    fn selector(&mut self, selector: &Selector) {
        let config = self.config;
        let c = &config.columns;
        match selector {
            Selector::Marked => self.marks(MarkFilter::Marked),
            Selector::Range { left, right } => {
                let clause = format!("{} >= ? AND {} <= ?", self.col(&c.left), self.col(&c.right));
                self.push(clause, [Value::Integer(*left), Value::Integer(*right)]);
            }
            Selector::Node(id) => {
                let clause = format!("{} = ?", self.col(&c.id));
                self.push(clause, [key_to_value(id)]);
            }
            Selector::Ids(ids) if ids.is_empty() => self.push("0 = 1".to_string(), []),
            Selector::Ids(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let clause = format!("{} IN ({})", self.col(&c.id), placeholders);
                self.push(clause, ids.iter().map(key_to_value));
            }
        }
    }

    fn selection(&mut self, selection: &Selection) {
        let config = self.config;
        let c = &config.columns;
        self.tree(selection.tree_id.as_ref());

        match selection.range {
            None => {}
            Some(RangeFilter::Within { left, right }) => {
                let clause = format!("{} >= ? AND {} <= ?", self.col(&c.left), self.col(&c.right));
                self.push(clause, [Value::Integer(left), Value::Integer(right)]);
            }
            Some(RangeFilter::Containing { left, right }) => {
                let clause = format!("{} < ? AND {} > ?", self.col(&c.left), self.col(&c.right));
                self.push(clause, [Value::Integer(left), Value::Integer(right)]);
            }
        }

        match &selection.parent {
            ParentFilter::Any => {}
            ParentFilter::Root => {
                let clause = format!("{} IS NULL", self.col(&c.parent));
                self.push(clause, []);
            }
            ParentFilter::Is(parent) => {
                let clause = format!("{} = ?", self.col(&c.parent));
                self.push(clause, [key_to_value(parent)]);
            }
        }

        if selection.leaves_only {
            let clause = format!("{} = {} + 1", self.col(&c.right), self.col(&c.left));
            self.push(clause, []);
        }

        self.trash(selection.trash);
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn into_params(self) -> Vec<Value> {
        self.params
    }
}

fn key_to_value(key: &Key) -> Value {
    match key {
        Key::Int(n) => Value::Integer(*n),
        Key::Text(s) => Value::Text(s.clone()),
    }
}

fn optional_key_value(key: Option<&Key>) -> Value {
    key.map_or(Value::Null, key_to_value)
}

fn value_to_key(value: Value, column: &str) -> Result<Option<Key>, DatabaseError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(Key::Int(n))),
        Value::Text(s) => Ok(Some(Key::Text(s))),
        other => Err(DatabaseError::unexpected_value(
            column,
            format!("expected integer or text key, got {:?}", other),
        )),
    }
}

fn value_to_int(value: Value, column: &str) -> Result<i64, DatabaseError> {
    match value {
        Value::Integer(n) => Ok(n),
        other => Err(DatabaseError::unexpected_value(
            column,
            format!("expected integer, got {:?}", other),
        )),
    }
}

fn timestamp_value(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, |at| {
        Value::Text(at.to_rfc3339_opts(SecondsFormat::Micros, true))
    })
}

/// `column >= ? [AND column <= ?]` for the shifted range
fn shift_range(column: &str, shift: &Shift) -> (String, Vec<Value>) {
    match shift.to {
        Some(to) => (
            format!("{c} >= ? AND {c} <= ?", c = column),
            vec![Value::Integer(shift.from), Value::Integer(to)],
        ),
        None => (
            format!("{} >= ?", column),
            vec![Value::Integer(shift.from)],
        ),
    }
}

#[async_trait]
impl TreeStore for SqliteTreeStore {
    fn supports_soft_delete(&self) -> bool {
        self.config.soft_delete
    }

    async fn begin(&self) -> Result<(), DatabaseError> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(DatabaseError::transaction("transaction already in progress"));
        }
        if let Err(e) = self.conn.execute("BEGIN IMMEDIATE", ()).await {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(DatabaseError::transaction(format!("BEGIN failed: {}", e)));
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        if !self.in_transaction.load(Ordering::SeqCst) {
            return Err(DatabaseError::transaction("no transaction in progress"));
        }
        // A failed COMMIT leaves the transaction open for a rollback.
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DatabaseError::transaction(format!("COMMIT failed: {}", e)))?;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::transaction("no transaction in progress"));
        }
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::transaction(format!("ROLLBACK failed: {}", e)))?;
        Ok(())
    }

    async fn find(&self, id: &Key) -> Result<Option<NodeRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.select_columns(),
            self.config.table,
            self.columns().id
        );
        Ok(self
            .query_records(&sql, vec![key_to_value(id)])
            .await?
            .into_iter()
            .next())
    }

    async fn insert(&self, record: &NodeRecord) -> Result<(), DatabaseError> {
        let c = self.columns();
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.config.table,
            c.id,
            c.left,
            c.right,
            c.level,
            c.parent,
            c.tree,
            c.deleted_at,
            c.properties
        );
        let properties = serde_json::to_string(&record.properties)
            .map_err(|e| DatabaseError::unexpected_value(&c.properties, e.to_string()))?;

        self.execute(
            &sql,
            vec![
                key_to_value(&record.id),
                Value::Integer(record.left),
                Value::Integer(record.right),
                Value::Integer(record.level),
                optional_key_value(record.parent_id.as_ref()),
                optional_key_value(record.tree_id.as_ref()),
                timestamp_value(record.deleted_at),
                Value::Text(properties),
            ],
        )
        .await?;
        Ok(())
    }

    async fn save_attributes(
        &self,
        id: &Key,
        properties: &serde_json::Value,
    ) -> Result<u64, DatabaseError> {
        let c = self.columns();
        let properties = serde_json::to_string(properties)
            .map_err(|e| DatabaseError::unexpected_value(&c.properties, e.to_string()))?;
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            self.config.table, c.properties, c.id
        );
        self.execute(&sql, vec![Value::Text(properties), key_to_value(id)])
            .await
    }

    async fn select(&self, selection: &Selection) -> Result<Vec<NodeRecord>, DatabaseError> {
        let c = self.columns();
        let mut filter = self.filter("");
        filter.selection(selection);

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}, {}, {}",
            self.select_columns(),
            self.config.table,
            filter.where_clause(),
            c.tree,
            c.left,
            c.id
        );
        self.query_records(&sql, filter.into_params()).await
    }

    async fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        let mut filter = self.filter("");
        filter.selection(selection);

        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            self.config.table,
            filter.where_clause()
        );
        self.query_count(&sql, filter.into_params()).await
    }

    async fn tree_ids(&self) -> Result<Vec<Key>, DatabaseError> {
        let tree = &self.columns().tree;
        let sql = format!(
            "SELECT DISTINCT {tree} FROM {t} WHERE {tree} IS NOT NULL ORDER BY {tree}",
            tree = tree,
            t = self.config.table
        );

        let mut rows = self
            .conn
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(key) = value_to_key(row.get_value(0)?, tree)? {
                ids.push(key);
            }
        }
        Ok(ids)
    }

    async fn max_tree_id(&self) -> Result<Option<i64>, DatabaseError> {
        let tree = &self.columns().tree;
        let sql = format!(
            "SELECT MAX({tree}) FROM {t} WHERE typeof({tree}) = 'integer'",
            tree = tree,
            t = self.config.table
        );
        match self.query_scalar(&sql, Vec::new()).await? {
            Value::Null => Ok(None),
            value => value_to_int(value, tree).map(Some),
        }
    }

    async fn shift(&self, shift: &Shift) -> Result<u64, DatabaseError> {
        if shift.is_noop() {
            return Ok(0);
        }

        let c = self.columns();
        let (left_hit, left_params) = shift_range(&c.left, shift);
        let (right_hit, right_params) = shift_range(&c.right, shift);

        let mut params = left_params.clone();
        params.push(Value::Integer(shift.delta));
        params.extend(right_params.iter().cloned());
        params.push(Value::Integer(shift.delta));

        let mut filter = self.filter("");
        filter.push(
            format!("(({}) OR ({}))", left_hit, right_hit),
            left_params.into_iter().chain(right_params),
        );
        filter.scope(&shift.scope);
        filter.marks(shift.marks);

        let sql = format!(
            "UPDATE {t} SET {l} = CASE WHEN {lh} THEN {l} + ? ELSE {l} END, \
             {r} = CASE WHEN {rh} THEN {r} + ? ELSE {r} END{w}",
            t = self.config.table,
            l = c.left,
            r = c.right,
            lh = left_hit,
            rh = right_hit,
            w = filter.where_clause()
        );
        params.extend(filter.into_params());
        self.execute(&sql, params).await
    }

    async fn mark(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
        let mut filter = self.filter("");
        filter.scope(scope);
        filter.selector(selector);

        let sql = format!(
            "UPDATE {} SET {} = 1{}",
            self.config.table,
            self.columns().marker,
            filter.where_clause()
        );
        self.execute(&sql, filter.into_params()).await
    }

    async fn unmark(&self, scope: &TreeScope) -> Result<u64, DatabaseError> {
        let mut filter = self.filter("");
        filter.marks(MarkFilter::Marked);
        filter.scope(scope);

        let sql = format!(
            "UPDATE {} SET {} = 0{}",
            self.config.table,
            self.columns().marker,
            filter.where_clause()
        );
        self.execute(&sql, filter.into_params()).await
    }

    async fn relocate(&self, relocation: &Relocation) -> Result<u64, DatabaseError> {
        let c = self.columns();
        let mut params = vec![
            Value::Integer(relocation.delta),
            Value::Integer(relocation.delta),
            Value::Integer(relocation.level_delta),
        ];

        let tree_assignment = match &relocation.tree_id {
            Some(tree_id) => {
                params.push(key_to_value(tree_id));
                format!(", {} = ?", c.tree)
            }
            None => String::new(),
        };

        let mut filter = self.filter("");
        filter.scope(&relocation.scope);
        filter.selector(&relocation.selector);

        let sql = format!(
            "UPDATE {t} SET {l} = {l} + ?, {r} = {r} + ?, {lvl} = {lvl} + ?{tree}, {m} = 0{w}",
            t = self.config.table,
            l = c.left,
            r = c.right,
            lvl = c.level,
            tree = tree_assignment,
            m = c.marker,
            w = filter.where_clause()
        );
        params.extend(filter.into_params());
        self.execute(&sql, params).await
    }

    async fn set_parent(&self, id: &Key, parent_id: Option<&Key>) -> Result<u64, DatabaseError> {
        let c = self.columns();
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            self.config.table, c.parent, c.id
        );
        self.execute(&sql, vec![optional_key_value(parent_id), key_to_value(id)])
            .await
    }

    async fn reparent_children(
        &self,
        scope: &TreeScope,
        from: &Key,
        to: Option<&Key>,
    ) -> Result<u64, DatabaseError> {
        let c = self.columns();
        let mut filter = self.filter("");
        filter.push(format!("{} = ?", c.parent), [key_to_value(from)]);
        filter.scope(scope);

        let sql = format!(
            "UPDATE {} SET {} = ?{}",
            self.config.table,
            c.parent,
            filter.where_clause()
        );
        let mut params = vec![optional_key_value(to)];
        params.extend(filter.into_params());
        self.execute(&sql, params).await
    }

    async fn delete(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
        let mut filter = self.filter("");
        filter.scope(scope);
        filter.selector(selector);

        let sql = format!("DELETE FROM {}{}", self.config.table, filter.where_clause());
        self.execute(&sql, filter.into_params()).await
    }

    async fn write_bounds(&self, updates: &[BoundsUpdate]) -> Result<u64, DatabaseError> {
        let c = self.columns();
        let sql = format!(
            "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ? WHERE {} = ?",
            self.config.table, c.left, c.right, c.level, c.parent, c.id
        );

        let mut touched = 0;
        for update in updates {
            touched += self
                .execute(
                    &sql,
                    vec![
                        Value::Integer(update.left),
                        Value::Integer(update.right),
                        Value::Integer(update.level),
                        optional_key_value(update.parent_id.as_ref()),
                        key_to_value(&update.id),
                    ],
                )
                .await?;
        }
        Ok(touched)
    }

    async fn set_deleted_at(
        &self,
        scope: &TreeScope,
        selector: &Selector,
        matching: TrashMatch,
        value: Option<DateTime<Utc>>,
    ) -> Result<u64, DatabaseError> {
        if !self.config.soft_delete {
            return Err(DatabaseError::sql_execution(
                "soft delete is not enabled for this store",
            ));
        }

        let c = self.columns();
        let mut filter = self.filter("");
        filter.scope(scope);
        filter.selector(selector);
        match matching {
            TrashMatch::Any => {}
            TrashMatch::Untrashed => filter.push(format!("{} IS NULL", c.deleted_at), []),
            TrashMatch::TrashedAt(at) => {
                filter.push(format!("{} = ?", c.deleted_at), [timestamp_value(Some(at))])
            }
        }

        let sql = format!(
            "UPDATE {} SET {} = ?{}",
            self.config.table,
            c.deleted_at,
            filter.where_clause()
        );
        let mut params = vec![timestamp_value(value)];
        params.extend(filter.into_params());
        self.execute(&sql, params).await
    }

    async fn health_count(
        &self,
        check: HealthCheck,
        scope: &TreeScope,
    ) -> Result<u64, DatabaseError> {
        let (sql, params) = self.health_sql(check, scope);
        self.query_count(&sql, params).await
    }
}
