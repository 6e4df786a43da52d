//! RelationalStore: SQLite backend
//!
//! One table per entity. Every JSON property is a single TEXT column holding
//! JSON text; scalar properties get a column of matching affinity; unique
//! properties are declared `UNIQUE`. A versioned entity gets an INTEGER
//! version column.
//!
//! Every batch runs inside one transaction. Constraint failures are mapped
//! onto [`StorageError::UniqueViolation`] / [`StorageError::DuplicateKey`].

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use rustc_hash::FxHashMap;
use strata_core::{EntityMetadata, PropertyKind, ScalarType, PRIMARY_KEY};
use tracing::debug;

use crate::backend::{Backend, BackendKind, BatchOutcome, Capabilities, Update, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::native::{ColumnValue, NativeValue, Selector, StoredRow};

#[derive(Debug, Clone)]
struct TableInfo {
    columns: Vec<String>,
    version_column: Option<String>,
}

impl TableInfo {
    fn has_column(&self, name: &str) -> bool {
        name == PRIMARY_KEY || self.columns.iter().any(|c| c == name)
    }
}

/// SQLite-backed store
pub struct RelationalStore {
    conn: Mutex<Connection>,
    tables: RwLock<FxHashMap<String, TableInfo>>,
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("tables", &self.tables.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_type(kind: &PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Json(_) => "TEXT",
        PropertyKind::Scalar(ScalarType::String)
        | PropertyKind::Scalar(ScalarType::DateTime)
        | PropertyKind::Scalar(ScalarType::Uuid) => "TEXT",
        PropertyKind::Scalar(ScalarType::Int) | PropertyKind::Scalar(ScalarType::Bool) => "INTEGER",
        PropertyKind::Scalar(ScalarType::Float) => "REAL",
    }
}

/// Column named in a "UNIQUE constraint failed: table.column" message
fn unique_column(message: &str) -> Option<String> {
    let (_, columns) = message.split_once(": ")?;
    let first = columns.split(',').next()?.trim();
    Some(first.rsplit('.').next().unwrap_or(first).to_string())
}

fn map_write_error(collection: &str, id: &str, err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ffi_err, message) = &err {
        if ffi_err.code == ErrorCode::ConstraintViolation {
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY {
                return StorageError::DuplicateKey {
                    collection: collection.to_string(),
                    id: id.to_string(),
                };
            }
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return StorageError::UniqueViolation {
                    collection: collection.to_string(),
                    field: message
                        .as_deref()
                        .and_then(unique_column)
                        .unwrap_or_else(|| "?".to_string()),
                };
            }
        }
    }
    StorageError::Sqlite(err)
}

fn column_value(collection: &str, name: &str, value: &NativeValue) -> StorageResult<rusqlite::types::Value> {
    match value {
        NativeValue::Column(v) => Ok(v.clone().into()),
        NativeValue::Document(_) => Err(StorageError::Unsupported(format!(
            "document value for {}.{} in relational store",
            collection, name
        ))),
    }
}

fn version_param(version: u64) -> rusqlite::types::Value {
    rusqlite::types::Value::Integer(version as i64)
}

impl RelationalStore {
    /// Open an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        RelationalStore {
            conn: Mutex::new(conn),
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    fn table(&self, collection: &str) -> StorageResult<TableInfo> {
        self.tables
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))
    }

    /// Raw stored column, for inspecting the native representation
    pub fn raw_column(&self, collection: &str, id: &str, column: &str) -> StorageResult<ColumnValue> {
        let table = self.table(collection)?;
        if !table.has_column(column) {
            return Err(StorageError::Unsupported(format!("unknown column '{}'", column)));
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            quote(column),
            quote(collection),
            quote(PRIMARY_KEY)
        );
        let conn = self.conn.lock();
        let value: Option<rusqlite::types::Value> = conn
            .query_row(&sql, [id], |row| row.get(0))
            .optional()?;
        Ok(value.map(ColumnValue::from).unwrap_or(ColumnValue::Null))
    }

    fn stored_version(
        tx: &rusqlite::Transaction<'_>,
        collection: &str,
        id: &str,
        version_column: &str,
    ) -> StorageResult<Option<Option<u64>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            quote(version_column),
            quote(collection),
            quote(PRIMARY_KEY)
        );
        let row: Option<Option<i64>> = tx.query_row(&sql, [id], |row| row.get(0)).optional()?;
        Ok(row.map(|v| v.map(|v| v as u64)))
    }

    fn apply_op(tx: &rusqlite::Transaction<'_>, table: &TableInfo, op: &WriteOp, outcome: &mut BatchOutcome) -> StorageResult<()> {
        match op {
            WriteOp::Insert {
                collection,
                id,
                fields,
                version,
            } => {
                let mut names = vec![quote(PRIMARY_KEY)];
                let mut params = vec![rusqlite::types::Value::Text(id.clone())];
                for (name, value) in fields {
                    if !table.has_column(name) {
                        return Err(StorageError::Unsupported(format!(
                            "unknown column {}.{}",
                            collection, name
                        )));
                    }
                    names.push(quote(name));
                    params.push(column_value(collection, name, value)?);
                }
                if let (Some(column), Some(v)) = (&table.version_column, version) {
                    names.push(quote(column));
                    params.push(version_param(*v));
                }
                let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote(collection),
                    names.join(", "),
                    placeholders.join(", ")
                );
                tx.execute(&sql, params_from_iter(params.iter()))
                    .map_err(|e| map_write_error(collection, id, e))?;
                outcome.inserted += 1;
            }
            WriteOp::Update {
                collection,
                id,
                update,
                version,
            } => {
                let columns = match update {
                    Update::Columns(columns) => columns,
                    Update::Paths(_) => {
                        return Err(StorageError::Unsupported(
                            "path update in relational store".to_string(),
                        ))
                    }
                };
                let mut assignments = Vec::new();
                let mut params = Vec::new();
                for (name, value) in columns {
                    if !table.has_column(name) || name == PRIMARY_KEY {
                        return Err(StorageError::Unsupported(format!(
                            "cannot update column {}.{}",
                            collection, name
                        )));
                    }
                    params.push(rusqlite::types::Value::from(value.clone()));
                    assignments.push(format!("{} = ?{}", quote(name), params.len()));
                }
                let version_column = table.version_column.as_deref();
                if let (Some(column), Some(bump)) = (version_column, version) {
                    params.push(version_param(bump.next));
                    assignments.push(format!("{} = ?{}", quote(column), params.len()));
                }
                if assignments.is_empty() {
                    return Ok(());
                }

                params.push(rusqlite::types::Value::Text(id.clone()));
                let mut sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?{}",
                    quote(collection),
                    assignments.join(", "),
                    quote(PRIMARY_KEY),
                    params.len()
                );
                if let (Some(column), Some(bump)) = (version_column, version) {
                    params.push(version_param(bump.expected));
                    sql.push_str(&format!(" AND {} = ?{}", quote(column), params.len()));
                }

                let changed = tx
                    .execute(&sql, params_from_iter(params.iter()))
                    .map_err(|e| map_write_error(collection, id, e))?;
                if changed == 0 {
                    return Err(Self::explain_miss(tx, table, collection, id, version.map(|b| b.expected))?);
                }
                outcome.updated += 1;
            }
            WriteOp::Delete {
                collection,
                id,
                expected_version,
            } => {
                let mut params = vec![rusqlite::types::Value::Text(id.clone())];
                let mut sql = format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote(collection),
                    quote(PRIMARY_KEY)
                );
                if let (Some(column), Some(expected)) = (&table.version_column, expected_version) {
                    params.push(version_param(*expected));
                    sql.push_str(&format!(" AND {} = ?2", quote(column)));
                }
                let changed = tx.execute(&sql, params_from_iter(params.iter()))?;
                if changed == 0 && expected_version.is_some() {
                    return Err(Self::explain_miss(tx, table, collection, id, *expected_version)?);
                }
                outcome.deleted += changed;
            }
        }
        Ok(())
    }

    /// Why an UPDATE/DELETE matched no row: gone, or stale version
    fn explain_miss(
        tx: &rusqlite::Transaction<'_>,
        table: &TableInfo,
        collection: &str,
        id: &str,
        expected: Option<u64>,
    ) -> StorageResult<StorageError> {
        let missing = StorageError::Missing {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let (Some(column), Some(expected)) = (&table.version_column, expected) else {
            return Ok(missing);
        };
        Ok(match Self::stored_version(tx, collection, id, column)? {
            None => missing,
            Some(actual) => StorageError::VersionMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                expected,
                actual,
            },
        })
    }
}

impl Backend for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            partial_updates: false,
            native_datetime: false,
            native_binary: false,
        }
    }

    fn ensure_collection(&self, entity: &EntityMetadata) -> StorageResult<()> {
        let mut defs = vec![format!("{} TEXT PRIMARY KEY NOT NULL", quote(PRIMARY_KEY))];
        for prop in &entity.properties {
            let mut def = format!("{} {}", quote(&prop.name), column_type(&prop.kind));
            if prop.unique {
                def.push_str(" UNIQUE");
            }
            defs.push(def);
        }
        if let Some(version) = &entity.version_field {
            defs.push(format!("{} INTEGER", quote(version)));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&entity.collection),
            defs.join(", ")
        );
        debug!(target: "strata::storage", sql = %sql, "ensure table");
        self.conn.lock().execute_batch(&sql)?;

        self.tables.write().insert(
            entity.collection.clone(),
            TableInfo {
                columns: entity.properties.iter().map(|p| p.name.clone()).collect(),
                version_column: entity.version_field.clone(),
            },
        );
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote(collection));
        debug!(target: "strata::storage", sql = %sql, "drop table");
        self.conn.lock().execute_batch(&sql)?;
        self.tables.write().remove(collection);
        Ok(())
    }

    fn find(
        &self,
        collection: &str,
        selector: &Selector,
        limit: Option<usize>,
    ) -> StorageResult<Vec<StoredRow>> {
        let table = self.table(collection)?;

        let mut select = vec![quote(PRIMARY_KEY)];
        select.extend(table.columns.iter().map(|c| quote(c)));
        if let Some(v) = &table.version_column {
            select.push(quote(v));
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for (field, value) in &selector.conditions {
            if !table.has_column(field) {
                return Err(StorageError::Unsupported(format!(
                    "unknown column {}.{}",
                    collection, field
                )));
            }
            if value.is_null() {
                clauses.push(format!("{} IS NULL", quote(field)));
            } else {
                params.push(column_value(collection, field, value)?);
                clauses.push(format!("{} = ?{}", quote(field), params.len()));
            }
        }

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote(collection));
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {}", quote(PRIMARY_KEY)));
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let id: String = row.get(0)?;
            let mut fields = BTreeMap::new();
            for (i, column) in table.columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i + 1)?;
                if value != rusqlite::types::Value::Null {
                    fields.insert(column.clone(), NativeValue::Column(value.into()));
                }
            }
            let version = match table.version_column {
                Some(_) => row
                    .get::<_, Option<i64>>(table.columns.len() + 1)?
                    .map(|v| v as u64),
                None => None,
            };
            Ok(StoredRow { id, version, fields })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn apply(&self, batch: &[WriteOp]) -> StorageResult<BatchOutcome> {
        let mut tables: FxHashMap<String, TableInfo> = FxHashMap::default();
        for op in batch {
            if !tables.contains_key(op.collection()) {
                tables.insert(op.collection().to_string(), self.table(op.collection())?);
            }
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut outcome = BatchOutcome::default();
        for op in batch {
            if let Some(table) = tables.get(op.collection()) {
                Self::apply_op(&tx, table, op, &mut outcome)?;
            }
        }
        tx.commit()?;

        debug!(
            target: "strata::storage",
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "relational batch committed"
        );
        Ok(outcome)
    }
}
