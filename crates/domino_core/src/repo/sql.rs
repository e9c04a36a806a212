//! Table-mapped SQLite repository.
//!
//! # Responsibility
//! - Serve the capability contracts over one table through a shared
//!   `Session`, so SQLite-backed repositories can join a unit of work.
//! - Keep SQL text generation and value conversion inside this module.
//!
//! # Invariants
//! - Table and column names are validated as plain identifiers before they
//!   reach SQL text; values are always bound as parameters.
//! - Keys are bound as text and rely on column affinity for comparison.
//! - Writes run inside the session's open transaction when there is one.

use super::capability::{
    CreateRepository, DeleteRepository, GetRepository, ListRepository, RelatedRepository,
    SaveRepository, Transactional, UpdateRepository,
};
use super::{Filter, RepoError, RepoResult};
use crate::db::{DbError, Session};
use crate::model::{dump, materialize, Key, Record};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};
use std::marker::PhantomData;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// CRUD repository over a single table.
#[derive(Debug)]
pub struct SqlRepository<E, C, U> {
    session: Session,
    table: String,
    primary_key: String,
    _marker: PhantomData<fn() -> (E, C, U)>,
}

impl<E, C, U> SqlRepository<E, C, U> {
    /// Binds a repository to `table` keyed by `primary_key`.
    ///
    /// # Errors
    /// - `PrimaryKeyPropertyNotDefined` for an empty primary key.
    /// - `InvalidIdentifier` when either name is not a plain identifier.
    pub fn new(
        session: Session,
        table: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> RepoResult<Self> {
        let table = table.into();
        let primary_key = primary_key.into();
        if primary_key.trim().is_empty() {
            return Err(RepoError::PrimaryKeyPropertyNotDefined);
        }
        ensure_identifier(&table)?;
        ensure_identifier(&primary_key)?;

        Ok(Self {
            session,
            table,
            primary_key,
            _marker: PhantomData,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn query_records(&self, sql: &str, params: Vec<SqlValue>) -> RepoResult<Vec<Record>> {
        let mut stmt = self.session.connection().prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row, &columns)?);
        }
        Ok(records)
    }

    fn query_one(&self, sql: &str, params: Vec<SqlValue>, id: &Key) -> RepoResult<Record> {
        self.query_records(sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::ItemNotFound(id.clone()))
    }

    fn select_by_key(&self, id: &Key) -> RepoResult<Record> {
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = ?1;",
            self.table, self.primary_key
        );
        self.query_one(&sql, vec![key_param(id)], id)
    }
}

impl<E, C, U> Transactional for SqlRepository<E, C, U> {
    fn begin(&mut self) -> RepoResult<()> {
        Ok(self.session.begin()?)
    }

    fn commit(&mut self) -> RepoResult<()> {
        Ok(self.session.commit()?)
    }

    fn rollback(&mut self) -> RepoResult<()> {
        Ok(self.session.rollback()?)
    }

    fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }
}

impl<E: DeserializeOwned, C, U> GetRepository<E> for SqlRepository<E, C, U> {
    fn get(&self, id: &Key) -> RepoResult<E> {
        Ok(materialize(self.select_by_key(id)?)?)
    }
}

impl<E: DeserializeOwned, C, U> ListRepository<E> for SqlRepository<E, C, U> {
    /// Exact-match listing ordered by primary key, newest first.
    fn list(&self, filter: &Filter) -> RepoResult<(usize, Vec<E>)> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        for (field, value) in filter.iter() {
            ensure_identifier(field)?;
            if value.is_null() {
                conditions.push(format!("\"{field}\" IS NULL"));
            } else {
                params.push(json_to_sql(value));
                conditions.push(format!("\"{field}\" = ?{}", params.len()));
            }
        }

        let mut sql = format!("SELECT * FROM \"{}\"", self.table);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY \"{}\" DESC;", self.primary_key));

        let items = self
            .query_records(&sql, params)?
            .into_iter()
            .map(|record| materialize(record).map_err(RepoError::from))
            .collect::<RepoResult<Vec<E>>>()?;
        Ok((items.len(), items))
    }
}

impl<E: DeserializeOwned, C: Serialize, U> CreateRepository<E, C> for SqlRepository<E, C, U> {
    /// Inserts the set fields of `data`; `null` fields fall back to column
    /// defaults.
    fn create(&mut self, data: &C) -> RepoResult<E> {
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (field, value) in dump(data)? {
            if value.is_null() {
                continue;
            }
            ensure_identifier(&field)?;
            columns.push(format!("\"{field}\""));
            params.push(json_to_sql(&value));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES RETURNING *;", self.table)
        } else {
            let placeholders = (1..=params.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({placeholders}) RETURNING *;",
                self.table,
                columns.join(", ")
            )
        };

        let record = self
            .query_records(&sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::InvalidData(format!("insert into {} returned no row", self.table)))?;

        debug!(
            "event=sql_create module=repo status=ok table={} key={}",
            self.table,
            record
                .get(&self.primary_key)
                .and_then(Key::from_value)
                .map(|key| key.to_string())
                .unwrap_or_default()
        );
        Ok(materialize(record)?)
    }
}

impl<E: DeserializeOwned, C, U: Serialize> UpdateRepository<E, U> for SqlRepository<E, C, U> {
    /// Overwrites only the fields present in `data`; explicit `null` clears.
    fn update(&mut self, id: &Key, data: &U) -> RepoResult<E> {
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (field, value) in dump(data)? {
            if field == self.primary_key {
                continue;
            }
            ensure_identifier(&field)?;
            params.push(json_to_sql(&value));
            assignments.push(format!("\"{field}\" = ?{}", params.len()));
        }

        if assignments.is_empty() {
            return self.get(id);
        }

        params.push(key_param(id));
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{} RETURNING *;",
            self.table,
            assignments.join(", "),
            self.primary_key,
            params.len()
        );
        let record = self.query_one(&sql, params, id)?;

        debug!(
            "event=sql_update module=repo status=ok table={} key={}",
            self.table, id
        );
        Ok(materialize(record)?)
    }
}

impl<E, C, U> DeleteRepository<E> for SqlRepository<E, C, U> {
    fn delete(&mut self, id: &Key) -> RepoResult<()> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = ?1;",
            self.table, self.primary_key
        );
        let changed = self
            .session
            .connection()
            .execute(&sql, [key_param(id)])?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound(id.clone()));
        }

        debug!(
            "event=sql_delete module=repo status=ok table={} key={}",
            self.table, id
        );
        Ok(())
    }
}

impl<E: Serialize + DeserializeOwned, C, U> SaveRepository<E> for SqlRepository<E, C, U> {
    /// Upserts every field of `entity` under its own key.
    fn save(&mut self, entity: &E) -> RepoResult<E> {
        let record = dump(entity)?;
        let id = record
            .get(&self.primary_key)
            .filter(|value| !value.is_null())
            .and_then(Key::from_value)
            .ok_or_else(|| RepoError::MissingPrimaryKey(self.primary_key.clone()))?;

        let mut columns = vec![format!("\"{}\"", self.primary_key)];
        let mut assignments = Vec::new();
        let mut params = vec![key_param(&id)];
        for (field, value) in &record {
            if *field == self.primary_key {
                continue;
            }
            ensure_identifier(field)?;
            params.push(json_to_sql(value));
            columns.push(format!("\"{field}\""));
            assignments.push(format!("\"{field}\" = excluded.\"{field}\""));
        }

        let placeholders = (1..=params.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({placeholders}) ON CONFLICT(\"{}\") {conflict};",
            self.table,
            columns.join(", "),
            self.primary_key
        );
        self.session
            .connection()
            .execute(&sql, params_from_iter(params))?;

        debug!(
            "event=sql_save module=repo status=ok table={} key={}",
            self.table, id
        );
        self.get(&id)
    }
}

impl<E: Serialize + DeserializeOwned, C, U> RelatedRepository for SqlRepository<E, C, U> {
    fn resolve(&self, id: &Key) -> RepoResult<Value> {
        let entity = self.get(id)?;
        serde_json::to_value(entity).map_err(|err| RepoError::InvalidData(err.to_string()))
    }
}

/// `deserialize_with` helper for boolean fields stored as SQLite integers.
///
/// Accepts JSON booleans as well as `0`/`1`.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde::Deserialize;

    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(D::Error::custom(format!("expected 0 or 1, got {number}"))),
        },
        other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

fn ensure_identifier(name: &str) -> Result<(), DbError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

fn key_param(id: &Key) -> SqlValue {
    SqlValue::Text(id.as_str().to_string())
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        nested @ (Value::Array(_) | Value::Object(_)) => SqlValue::Text(nested.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}

fn row_to_record(row: &Row<'_>, columns: &[String]) -> RepoResult<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        record.insert(column.clone(), sql_to_json(row.get_ref(index)?));
    }
    Ok(record)
}
