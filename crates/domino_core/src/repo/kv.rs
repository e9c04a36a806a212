//! In-memory key-value repository engine.
//!
//! # Responsibility
//! - Provide a volatile CRUD store for tests and local wiring.
//! - Generate keys, resolve declared foreign keys and load fixtures.
//!
//! # Invariants
//! - Exactly one record per key. Keys are stored in canonical text form.
//! - Auto-generated keys come from a counter that starts at 1, only grows and
//!   skips keys already in use; deleted keys are never generated again.
//! - Every mutation validates the fully rendered record first and then
//!   performs a single map write, so a failed call changes nothing.
//! - A dangling or falsy `{relation}_id` omits the relation instead of
//!   failing the read.
//! - Transactions only flag state: writes are visible immediately and
//!   rollback does not undo them.

use super::capability::{
    CreateRepository, DeleteRepository, GetRepository, ListRepository, RelatedRepository,
    SaveRepository, Transactional, UpdateRepository,
};
use super::{Filter, RepoError, RepoResult};
use crate::model::{dump, is_truthy, materialize, Key, Record};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

type RelationFactory = Box<dyn FnOnce() -> RepoResult<Box<dyn RelatedRepository>>>;

/// Per-instance configuration for a `KvRepository`.
pub struct KvRepositoryBuilder<E, C, U> {
    primary_key: Option<String>,
    relations: Vec<(String, RelationFactory)>,
    fixtures: Vec<C>,
    _marker: PhantomData<fn() -> (E, U)>,
}

impl<E, C, U> KvRepositoryBuilder<E, C, U> {
    /// Names the field that holds each record's key.
    pub fn primary_key(mut self, property: impl Into<String>) -> Self {
        self.primary_key = Some(property.into());
        self
    }

    /// Declares a relation resolved from the `{name}_id` field.
    ///
    /// `factory` runs once, when the repository is built. Redeclaring a name
    /// replaces the earlier factory.
    pub fn foreign_key<R, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        R: RelatedRepository + 'static,
        F: FnOnce() -> RepoResult<R> + 'static,
    {
        let name = name.into();
        let factory: RelationFactory = Box::new(move || {
            factory().map(|repo| Box::new(repo) as Box<dyn RelatedRepository>)
        });
        match self.relations.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = factory,
            None => self.relations.push((name, factory)),
        }
        self
    }

    /// Queues one create DTO to load at build time.
    pub fn fixture(mut self, data: C) -> Self {
        self.fixtures.push(data);
        self
    }

    /// Queues several create DTOs, loaded after any queued earlier.
    pub fn fixtures(mut self, data: impl IntoIterator<Item = C>) -> Self {
        self.fixtures.extend(data);
        self
    }

    /// Builds the repository, instantiating relations and loading fixtures
    /// in declaration order through `create`.
    ///
    /// # Errors
    /// - `PrimaryKeyPropertyNotDefined` when no (or an empty) primary key was
    ///   configured; checked before any factory or fixture runs.
    /// - Any error from a relation factory or a fixture `create`.
    pub fn build(self) -> RepoResult<KvRepository<E, C, U>>
    where
        E: DeserializeOwned,
        C: Serialize,
    {
        let primary_key = match self.primary_key {
            Some(property) if !property.trim().is_empty() => property,
            _ => return Err(RepoError::PrimaryKeyPropertyNotDefined),
        };

        let mut relations = Vec::with_capacity(self.relations.len());
        for (name, factory) in self.relations {
            relations.push((name, factory()?));
        }

        let mut repo = KvRepository {
            entity: short_type_name::<E>(),
            primary_key,
            relations,
            records: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 1,
            next_seq: 0,
            in_transaction: false,
            _marker: PhantomData,
        };

        for fixture in &self.fixtures {
            repo.create(fixture)?;
        }

        debug!(
            "event=kv_build module=repo status=ok entity={} primary_key={} relations={} fixtures={}",
            repo.entity,
            repo.primary_key,
            repo.relations.len(),
            repo.records.len()
        );
        Ok(repo)
    }
}

/// Volatile CRUD store over typed entities `E`, create DTOs `C` and update
/// DTOs `U`.
pub struct KvRepository<E, C, U> {
    entity: &'static str,
    primary_key: String,
    relations: Vec<(String, Box<dyn RelatedRepository>)>,
    /// Records by insertion sequence; keeps `list` in insertion order.
    records: BTreeMap<u64, Record>,
    index: HashMap<Key, u64>,
    next_id: u64,
    next_seq: u64,
    in_transaction: bool,
    _marker: PhantomData<fn() -> (E, C, U)>,
}

impl<E, C, U> KvRepository<E, C, U> {
    pub fn builder() -> KvRepositoryBuilder<E, C, U> {
        KvRepositoryBuilder {
            primary_key: None,
            relations: Vec::new(),
            fixtures: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &Key) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the stored record without relation resolution.
    pub fn raw(&self, id: &Key) -> Option<&Record> {
        self.index.get(id).and_then(|seq| self.records.get(seq))
    }

    fn stored(&self, id: &Key) -> RepoResult<&Record> {
        self.raw(id).ok_or_else(|| RepoError::ItemNotFound(id.clone()))
    }

    /// Smallest counter value at or above `next_id` that is not a live key.
    fn next_free_id(&self) -> u64 {
        let mut candidate = self.next_id;
        while self.index.contains_key(&Key::from(candidate)) {
            candidate += 1;
        }
        candidate
    }

    fn write(&mut self, id: Key, record: Record) {
        match self.index.get(&id) {
            Some(seq) => {
                self.records.insert(*seq, record);
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.records.insert(seq, record);
                self.index.insert(id, seq);
            }
        }
    }

    /// Raw fields plus resolved relations; relations win on name clashes.
    fn render(&self, raw: &Record) -> RepoResult<Record> {
        let mut rendered = raw.clone();
        for (name, related) in &self.relations {
            let field = relation_field(name);
            let Some(id) = raw.get(&field).filter(|value| is_truthy(value)) else {
                continue;
            };
            let Some(id) = Key::from_value(id) else {
                continue;
            };

            match related.resolve(&id) {
                Ok(value) => {
                    rendered.insert(name.clone(), value);
                }
                Err(RepoError::ItemNotFound(_)) => {
                    debug!(
                        "event=kv_relation module=repo status=missing entity={} relation={} key={}",
                        self.entity, name, id
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rendered)
    }
}

impl<E: DeserializeOwned, C, U> KvRepository<E, C, U> {
    fn entity_from(&self, raw: &Record) -> RepoResult<E> {
        Ok(materialize(self.render(raw)?)?)
    }
}

impl<E, C, U> Debug for KvRepository<E, C, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvRepository")
            .field("entity", &self.entity)
            .field("primary_key", &self.primary_key)
            .field(
                "relations",
                &self.relations.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("len", &self.records.len())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl<E, C, U> Transactional for KvRepository<E, C, U> {
    fn begin(&mut self) -> RepoResult<()> {
        if !self.in_transaction {
            self.in_transaction = true;
            debug!("event=kv_begin module=repo status=ok entity={}", self.entity);
        }
        Ok(())
    }

    fn commit(&mut self) -> RepoResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            debug!("event=kv_commit module=repo status=ok entity={}", self.entity);
        }
        Ok(())
    }

    fn rollback(&mut self) -> RepoResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            debug!("event=kv_rollback module=repo status=ok entity={}", self.entity);
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl<E: DeserializeOwned, C, U> GetRepository<E> for KvRepository<E, C, U> {
    fn get(&self, id: &Key) -> RepoResult<E> {
        let raw = self.stored(id)?;
        self.entity_from(raw)
    }
}

impl<E: Serialize + DeserializeOwned, C, U> ListRepository<E> for KvRepository<E, C, U> {
    /// Matches `filter` against each entity's own serialized fields, so the
    /// result does not depend on how the stored payload spelled a value.
    fn list(&self, filter: &Filter) -> RepoResult<(usize, Vec<E>)> {
        let mut items = Vec::new();
        for raw in self.records.values() {
            let entity = self.entity_from(raw)?;
            if filter.is_empty() || filter.matches(&dump(&entity)?) {
                items.push(entity);
            }
        }
        Ok((items.len(), items))
    }
}

impl<E: DeserializeOwned, C: Serialize, U> CreateRepository<E, C> for KvRepository<E, C, U> {
    fn create(&mut self, data: &C) -> RepoResult<E> {
        let mut record = dump(data)?;

        let (id, generated) = match record
            .get(&self.primary_key)
            .filter(|value| !value.is_null())
        {
            Some(value) => {
                let id = Key::from_value(value).ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "primary key `{}` must be a string or an integer",
                        self.primary_key
                    ))
                })?;
                (id, None)
            }
            None => {
                let next = self.next_free_id();
                (Key::from(next), Some(next))
            }
        };

        if self.index.contains_key(&id) {
            return Err(RepoError::DuplicateKey(id));
        }

        record.insert(self.primary_key.clone(), id.to_value());
        let entity = self.entity_from(&record)?;

        if let Some(next) = generated {
            self.next_id = next + 1;
        }
        self.write(id.clone(), record);

        debug!(
            "event=kv_create module=repo status=ok entity={} key={}",
            self.entity, id
        );
        Ok(entity)
    }
}

impl<E: DeserializeOwned, C, U: Serialize> UpdateRepository<E, U> for KvRepository<E, C, U> {
    fn update(&mut self, id: &Key, data: &U) -> RepoResult<E> {
        let changes = dump(data)?;
        let stored = self.stored(id)?;

        let mut merged = stored.clone();
        merged.extend(changes);
        merged.insert(self.primary_key.clone(), id.to_value());

        let entity = self.entity_from(&merged)?;
        self.write(id.clone(), merged);

        debug!(
            "event=kv_update module=repo status=ok entity={} key={}",
            self.entity, id
        );
        Ok(entity)
    }
}

impl<E, C, U> DeleteRepository<E> for KvRepository<E, C, U> {
    fn delete(&mut self, id: &Key) -> RepoResult<()> {
        let seq = self
            .index
            .remove(id)
            .ok_or_else(|| RepoError::ItemNotFound(id.clone()))?;
        self.records.remove(&seq);

        debug!(
            "event=kv_delete module=repo status=ok entity={} key={}",
            self.entity, id
        );
        Ok(())
    }
}

impl<E: Serialize + DeserializeOwned, C, U> SaveRepository<E> for KvRepository<E, C, U> {
    /// Upserts `entity` under its own key.
    ///
    /// Relation fields are derived data and are dropped before storing; the
    /// `{relation}_id` fields carry the link.
    fn save(&mut self, entity: &E) -> RepoResult<E> {
        let mut record = dump(entity)?;
        let id = record
            .get(&self.primary_key)
            .filter(|value| !value.is_null())
            .and_then(Key::from_value)
            .ok_or_else(|| RepoError::MissingPrimaryKey(self.primary_key.clone()))?;

        for (name, _) in &self.relations {
            record.remove(name);
        }
        record.insert(self.primary_key.clone(), id.to_value());

        let saved = self.entity_from(&record)?;
        self.write(id.clone(), record);

        debug!(
            "event=kv_save module=repo status=ok entity={} key={}",
            self.entity, id
        );
        Ok(saved)
    }
}

impl<E: Serialize + DeserializeOwned, C, U> RelatedRepository for KvRepository<E, C, U> {
    fn resolve(&self, id: &Key) -> RepoResult<Value> {
        let entity = self.get(id)?;
        serde_json::to_value(entity).map_err(|err| RepoError::InvalidData(err.to_string()))
    }
}

fn relation_field(name: &str) -> String {
    format!("{}_id", name.to_lowercase())
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::{relation_field, short_type_name, KvRepository};
    use crate::model::Key;
    use crate::repo::{CreateRepository, GetRepository, RepoError};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        id: Key,
        body: String,
    }

    type NoteRepository = KvRepository<Note, Value, Value>;

    #[test]
    fn relation_field_is_lowercased() {
        assert_eq!(relation_field("User"), "user_id");
    }

    #[test]
    fn short_type_name_drops_module_path() {
        assert_eq!(short_type_name::<Note>(), "Note");
    }

    #[test]
    fn failed_validation_does_not_consume_generated_key() {
        let mut repo = NoteRepository::builder().primary_key("id").build().unwrap();

        let err = repo.create(&json!({"title": "no body"})).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
        assert!(repo.is_empty());

        let note = repo.create(&json!({"body": "ok"})).unwrap();
        assert_eq!(note.id, Key::from(1));
    }

    #[test]
    fn generated_keys_skip_explicit_ones() {
        let mut repo = NoteRepository::builder().primary_key("id").build().unwrap();

        repo.create(&json!({"id": 1, "body": "explicit"})).unwrap();
        let generated = repo.create(&json!({"body": "generated"})).unwrap();

        assert_eq!(generated.id, Key::from(2));
        assert_eq!(repo.get(&Key::from(1)).unwrap().body, "explicit");
    }

    #[test]
    fn explicit_duplicate_key_is_rejected() {
        let mut repo = NoteRepository::builder().primary_key("id").build().unwrap();
        repo.create(&json!({"id": "a", "body": "first"})).unwrap();

        let err = repo.create(&json!({"id": "a", "body": "second"})).unwrap_err();
        assert!(matches!(err, RepoError::DuplicateKey(key) if key == Key::from("a")));
        assert_eq!(repo.get(&Key::from("a")).unwrap().body, "first");
    }

    #[test]
    fn raw_record_stores_stringified_key() {
        let mut repo = NoteRepository::builder().primary_key("id").build().unwrap();
        repo.create(&json!({"id": 9, "body": "n"})).unwrap();

        let raw = repo.raw(&Key::from(9)).unwrap();
        assert_eq!(raw.get("id"), Some(&json!("9")));
    }
}
