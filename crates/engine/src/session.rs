//! Sessions: identity map and unit of work
//!
//! An [`EntityManager`] tracks every entity it created or loaded, keyed by
//! `(entity name, primary key)`, together with the snapshot taken when the
//! entity was last read from or written to storage.
//!
//! # Flush
//!
//! 1. Plan (synchronous): extract live state of every tracked entity, diff
//!    it against its snapshot, encode inserts, updates and deletes.
//! 2. Apply: the batch goes to the backend in one atomic call on a blocking
//!    thread.
//! 3. Settle: only after the backend accepted the whole batch are snapshots
//!    replaced, versions bumped and removed entities forgotten.
//!
//! A failed flush leaves the session exactly as it was, so retrying it
//! recomputes the same changes.
//!
//! Sessions never share state. A write flushed by one session becomes
//! visible in another only when that session loads the row afresh: first
//! load, `refresh`, a find with `FindOptions::refresh`, or after `clear`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_core::{EntityId, EntityMetadata, Error, Result, Value};
use strata_mapping::{materialize, ChangeSet};
use strata_storage::{Selector, StoredRow, VersionBump, WriteOp};
use tracing::{debug, info, warn};

use crate::entity::EntityRef;
use crate::filter::{Filter, FindOptions};
use crate::orm::Orm;
use crate::snapshot::{capture, EntitySnapshot};

type Key = (String, EntityId);

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    /// Created in this session, not yet inserted
    New,
    /// Loaded or flushed; has a snapshot
    Managed,
    /// Scheduled for deletion at the next flush
    Removed,
}

struct Tracked {
    entity: EntityRef,
    status: EntityStatus,
    snapshot: Option<EntitySnapshot>,
    seq: u64,
}

/// Row counts of a flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Entities inserted
    pub inserted: usize,
    /// Entities updated
    pub updated: usize,
    /// Entities deleted
    pub deleted: usize,
    /// Managed entities with no changes
    pub unchanged: usize,
}

impl FlushSummary {
    /// True if the flush wrote nothing
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

enum Settle {
    Stored { key: Key, snapshot: EntitySnapshot },
    Deleted { key: Key },
}

struct FlushPlan {
    ops: Vec<WriteOp>,
    settle: Vec<Settle>,
    unchanged: usize,
}

/// One logical session
pub struct EntityManager {
    orm: Orm,
    id: u64,
    identity: FxHashMap<Key, Tracked>,
    next_seq: u64,
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("session", &self.id)
            .field("tracked", &self.identity.len())
            .finish()
    }
}

impl EntityManager {
    pub(crate) fn new(orm: Orm, id: u64) -> Self {
        debug!(target: "strata::session", session = id, "session opened");
        EntityManager {
            orm,
            id,
            identity: FxHashMap::default(),
            next_seq: 0,
        }
    }

    /// Session number, unique per `Orm`
    pub fn session_id(&self) -> u64 {
        self.id
    }

    /// The `Orm` this session belongs to
    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    /// New, empty session on the same `Orm`
    pub fn fork(&self) -> EntityManager {
        self.orm.fork()
    }

    /// Number of tracked entities
    pub fn len(&self) -> usize {
        self.identity.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }

    /// Lifecycle state of an entity, `None` if this session does not track it
    pub fn status(&self, entity: &EntityRef) -> Option<EntityStatus> {
        self.key_of(entity).ok().map(|key| self.identity[&key].status)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Create a new entity with a generated key
    ///
    /// Values are checked immediately (declared property, type, extractable
    /// value); the insert happens at the next flush.
    pub fn create<I, K, V>(&mut self, entity: &str, fields: I) -> Result<EntityRef>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.create_with_id(entity, EntityId::generate(), fields)
    }

    /// Create a new entity with a caller-supplied key
    pub fn create_with_id<I, K, V>(
        &mut self,
        entity: &str,
        id: impl Into<EntityId>,
        fields: I,
    ) -> Result<EntityRef>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let meta = self.orm.metadata(entity)?;
        let id = id.into();
        let key = (meta.name.clone(), id.clone());
        if self.identity.contains_key(&key) {
            return Err(Error::invalid_input(format!(
                "{} '{}' is already managed by this session",
                meta.name, id
            )));
        }

        let mut properties = BTreeMap::new();
        for (name, value) in fields {
            let name = name.into();
            meta.require_property(&name)?;
            let value = value.into();
            if !value.is_null() {
                properties.insert(name, value);
            }
        }
        capture(&meta, &properties, &self.orm.extractor())?;

        let handle = EntityRef::new(meta, id, properties, None);
        self.track(key, handle.clone(), EntityStatus::New, None);
        debug!(target: "strata::session", session = self.id, entity, id = %handle.id(), "created");
        Ok(handle)
    }

    // ========================================================================
    // Find
    // ========================================================================

    /// All entities matching `filter`, ordered by primary key
    pub async fn find(&mut self, entity: &str, filter: &Filter) -> Result<Vec<EntityRef>> {
        self.find_with(entity, filter, FindOptions::default()).await
    }

    /// Like [`find`](Self::find), with options
    ///
    /// Rows already tracked by this session yield the tracked handle, with
    /// any unflushed changes, unless `options.refresh` is set. Entities
    /// removed in this session are skipped. A lookup by primary key alone
    /// is answered from the identity map without a query.
    pub async fn find_with(
        &mut self,
        entity: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<EntityRef>> {
        let meta = self.orm.metadata(entity)?;
        let selector = filter.to_selector(&meta, self.orm.encoding())?;

        if !options.refresh {
            if let Some(id) = filter.as_id() {
                if let Some(tracked) = self.identity.get(&(meta.name.clone(), id)) {
                    return Ok(match tracked.status {
                        EntityStatus::Removed => Vec::new(),
                        _ => vec![tracked.entity.clone()],
                    });
                }
            }
        }

        let rows = self.fetch(&meta, selector, options.limit).await?;
        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(handle) = self.merge_row(&meta, row, options.refresh)? {
                found.push(handle);
            }
        }
        Ok(found)
    }

    /// First entity matching `filter`
    pub async fn find_one(&mut self, entity: &str, filter: &Filter) -> Result<Option<EntityRef>> {
        self.find_one_with(entity, filter, FindOptions::default()).await
    }

    /// Like [`find_one`](Self::find_one), with options
    pub async fn find_one_with(
        &mut self,
        entity: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Option<EntityRef>> {
        Ok(self.find_with(entity, filter, options).await?.into_iter().next())
    }

    /// First entity matching `filter`, or `NotFound`
    pub async fn find_one_or_fail(&mut self, entity: &str, filter: &Filter) -> Result<EntityRef> {
        self.find_one(entity, filter)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: entity.to_string(),
                filter: filter.to_string(),
            })
    }

    /// Reload a managed entity from storage, discarding unflushed changes
    pub async fn refresh(&mut self, entity: &EntityRef) -> Result<()> {
        let key = self.key_of(entity)?;
        match self.identity[&key].status {
            EntityStatus::Managed => {}
            status => {
                return Err(Error::invalid_input(format!(
                    "cannot refresh {} '{}' in state {:?}",
                    key.0, key.1, status
                )))
            }
        }

        let meta = entity.metadata();
        let filter = Filter::id(key.1.clone());
        let selector = filter.to_selector(&meta, self.orm.encoding())?;
        let row = self
            .fetch(&meta, selector, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound {
                entity: meta.name.clone(),
                filter: filter.to_string(),
            })?;
        self.merge_row(&meta, row, true)?;
        Ok(())
    }

    // ========================================================================
    // Remove / detach / clear
    // ========================================================================

    /// Schedule an entity for deletion at the next flush
    ///
    /// A new, never flushed entity is simply forgotten.
    pub fn remove(&mut self, entity: &EntityRef) -> Result<()> {
        let key = self.key_of(entity)?;
        let is_new = self.identity[&key].status == EntityStatus::New;
        if is_new {
            self.identity.remove(&key);
        } else if let Some(tracked) = self.identity.get_mut(&key) {
            tracked.status = EntityStatus::Removed;
        }
        debug!(target: "strata::session", session = self.id, entity = %key.0, id = %key.1, "removed");
        Ok(())
    }

    /// Stop tracking an entity; returns false if it was not tracked
    pub fn detach(&mut self, entity: &EntityRef) -> bool {
        match self.key_of(entity) {
            Ok(key) => self.identity.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Stop tracking everything; unflushed changes are dropped
    pub fn clear(&mut self) {
        let dropped = self.identity.len();
        self.identity.clear();
        debug!(target: "strata::session", session = self.id, dropped, "identity map cleared");
    }

    /// Changes the next flush would write for an entity
    pub fn changes(&self, entity: &EntityRef) -> Result<ChangeSet> {
        let key = self.key_of(entity)?;
        let meta = entity.metadata();
        let live = capture(&meta, &entity.properties(), &self.orm.extractor())?;
        Ok(match &self.identity[&key].snapshot {
            Some(snapshot) => snapshot.diff(&live),
            None => EntitySnapshot::default().diff(&live),
        })
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Write every pending change in one atomic batch
    ///
    /// # Errors
    ///
    /// - `Conflict` when a unique, primary-key or version check fails
    /// - `InvalidInput`, `UnsupportedValueKind`, `CyclicValue`,
    ///   `LimitExceeded` when live state cannot be persisted
    ///
    /// On error nothing in the session changes.
    pub async fn flush(&mut self) -> Result<FlushSummary> {
        let plan = self.plan()?;
        let mut summary = FlushSummary {
            unchanged: plan.unchanged,
            ..FlushSummary::default()
        };
        if plan.ops.is_empty() {
            debug!(target: "strata::flush", session = self.id, unchanged = summary.unchanged, "nothing to flush");
            return Ok(summary);
        }

        if self.orm.config().log_queries {
            for op in &plan.ops {
                debug!(target: "strata::flush", session = self.id, %op, "write");
            }
        }

        let backend = Arc::clone(self.orm.backend());
        let ops = plan.ops;
        let result = tokio::task::spawn_blocking(move || backend.apply(&ops))
            .await
            .map_err(|e| Error::storage(format!("flush task failed: {}", e)))?;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = Error::from(err);
                if err.is_conflict() {
                    warn!(target: "strata::flush", session = self.id, error = %err, "flush rejected");
                }
                return Err(err);
            }
        };

        for settle in plan.settle {
            self.settle(settle);
        }
        summary.inserted = outcome.inserted;
        summary.updated = outcome.updated;
        summary.deleted = outcome.deleted;
        info!(
            target: "strata::flush",
            session = self.id,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            "flush complete"
        );
        Ok(summary)
    }

    fn plan(&self) -> Result<FlushPlan> {
        let extractor = self.orm.extractor();
        let encoding = self.orm.encoding();
        let mut plan = FlushPlan {
            ops: Vec::new(),
            settle: Vec::new(),
            unchanged: 0,
        };

        let mut entries: Vec<(&Key, &Tracked)> = self.identity.iter().collect();
        entries.sort_by_key(|(_, tracked)| tracked.seq);

        for (key, tracked) in entries {
            let meta = tracked.entity.metadata();
            let id = key.1.as_str().to_string();
            let snapshot = tracked.snapshot.clone().unwrap_or_default();

            match tracked.status {
                EntityStatus::New => {
                    let live = capture(&meta, &tracked.entity.properties(), &extractor)?;
                    let mut fields = BTreeMap::new();
                    for (name, value) in &live {
                        let prop = meta.require_property(name)?;
                        fields.insert(name.clone(), encoding.encode_property(prop, value)?);
                    }
                    let version = meta.is_versioned().then_some(1);
                    plan.ops.push(WriteOp::Insert {
                        collection: meta.collection.clone(),
                        id,
                        fields,
                        version,
                    });
                    plan.settle.push(Settle::Stored {
                        key: key.clone(),
                        snapshot: EntitySnapshot::new(live, version),
                    });
                }
                EntityStatus::Managed => {
                    let live = capture(&meta, &tracked.entity.properties(), &extractor)?;
                    let changes = snapshot.diff(&live);
                    if changes.is_empty() {
                        plan.unchanged += 1;
                        continue;
                    }
                    let update = encoding.encode_changes(&meta, &changes, &live)?;
                    let bump = versioned_bump(&meta, snapshot.version());
                    plan.ops.push(WriteOp::Update {
                        collection: meta.collection.clone(),
                        id,
                        update,
                        version: bump,
                    });
                    plan.settle.push(Settle::Stored {
                        key: key.clone(),
                        snapshot: EntitySnapshot::new(
                            live,
                            bump.map(|b| b.next).or(snapshot.version()),
                        ),
                    });
                }
                EntityStatus::Removed => {
                    plan.ops.push(WriteOp::Delete {
                        collection: meta.collection.clone(),
                        id,
                        expected_version: if meta.is_versioned() {
                            snapshot.version()
                        } else {
                            None
                        },
                    });
                    plan.settle.push(Settle::Deleted { key: key.clone() });
                }
            }
        }
        Ok(plan)
    }

    fn settle(&mut self, settle: Settle) {
        match settle {
            Settle::Stored { key, snapshot } => {
                if let Some(tracked) = self.identity.get_mut(&key) {
                    tracked.entity.set_version(snapshot.version());
                    tracked.status = EntityStatus::Managed;
                    tracked.snapshot = Some(snapshot);
                }
            }
            Settle::Deleted { key } => {
                self.identity.remove(&key);
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn track(&mut self, key: Key, entity: EntityRef, status: EntityStatus, snapshot: Option<EntitySnapshot>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.identity.insert(
            key,
            Tracked {
                entity,
                status,
                snapshot,
                seq,
            },
        );
    }

    /// Identity-map key of a handle this session tracks
    fn key_of(&self, entity: &EntityRef) -> Result<Key> {
        let key = (entity.entity_name(), entity.id());
        match self.identity.get(&key) {
            Some(tracked) if tracked.entity.ptr_eq(entity) => Ok(key),
            _ => Err(Error::invalid_input(format!(
                "{} '{}' is not managed by this session",
                key.0, key.1
            ))),
        }
    }

    async fn fetch(
        &self,
        meta: &EntityMetadata,
        selector: Selector,
        limit: Option<usize>,
    ) -> Result<Vec<StoredRow>> {
        if self.orm.config().log_queries {
            debug!(
                target: "strata::query",
                session = self.id,
                collection = %meta.collection,
                %selector,
                "find"
            );
        }
        let backend = Arc::clone(self.orm.backend());
        let collection = meta.collection.clone();
        let rows = tokio::task::spawn_blocking(move || backend.find(&collection, &selector, limit))
            .await
            .map_err(|e| Error::storage(format!("find task failed: {}", e)))??;
        Ok(rows)
    }

    /// Merge a fetched row into the identity map
    fn merge_row(
        &mut self,
        meta: &Arc<EntityMetadata>,
        row: StoredRow,
        refresh: bool,
    ) -> Result<Option<EntityRef>> {
        let id = EntityId::new(row.id.clone());
        let key = (meta.name.clone(), id.clone());
        if let Some(tracked) = self.identity.get(&key) {
            match tracked.status {
                EntityStatus::Removed => return Ok(None),
                EntityStatus::New => return Ok(Some(tracked.entity.clone())),
                EntityStatus::Managed if !refresh => return Ok(Some(tracked.entity.clone())),
                EntityStatus::Managed => {}
            }
        }

        let (properties, snapshot) = self.hydrate(meta, &row)?;
        if let Some(tracked) = self.identity.get_mut(&key) {
            tracked.entity.replace(properties, snapshot.version());
            tracked.snapshot = Some(snapshot);
            return Ok(Some(tracked.entity.clone()));
        }

        let version = snapshot.version();
        let handle = EntityRef::new(Arc::clone(meta), id, properties, version);
        self.track(key, handle.clone(), EntityStatus::Managed, Some(snapshot));
        Ok(Some(handle))
    }

    /// Decode a stored row into fresh live values and a snapshot
    fn hydrate(
        &self,
        meta: &EntityMetadata,
        row: &StoredRow,
    ) -> Result<(BTreeMap<String, Value>, EntitySnapshot)> {
        let encoding = self.orm.encoding();
        let mut live = BTreeMap::new();
        let mut canonical = BTreeMap::new();
        for (field, native) in &row.fields {
            let Some(prop) = meta.property(field) else {
                debug!(target: "strata::session", entity = %meta.name, field = %field, "ignoring undeclared stored field");
                continue;
            };
            let value = encoding.decode_property(prop, native)?;
            if value.is_null() {
                continue;
            }
            live.insert(field.clone(), materialize(&value));
            canonical.insert(field.clone(), value);
        }
        Ok((live, EntitySnapshot::new(canonical, row.version)))
    }
}

fn versioned_bump(meta: &EntityMetadata, current: Option<u64>) -> Option<VersionBump> {
    if !meta.is_versioned() {
        return None;
    }
    current.map(|expected| VersionBump {
        expected,
        next: expected + 1,
    })
}
