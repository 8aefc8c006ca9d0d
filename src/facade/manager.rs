// ============================================================================
// Persistence manager
// ============================================================================
//
// The manager pairs one storage engine with one change-tracking context and
// exposes typed CRUD over every Persistable kind. Writes are staged in the
// context and saved in a single commit; a save with nothing staged never
// reaches the engine.
//
// ============================================================================

use super::config::StoreConfig;
use super::state::{ContainerState, UpdateOutcome};
use crate::context::{Change, Context};
use crate::core::{EntitySchema, Record, Result, StoreError};
use crate::entity::Persistable;
use crate::query::{FetchRequest, Page, Predicate, SortKey};
use crate::storage::{InMemoryStorage, StorageEngine};
use log::{debug, error, info, warn};
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

struct Inner {
    engine: Box<dyn StorageEngine>,
    context: Context,
    state: ContainerState,
    /// Kinds registered before the container was loaded
    models: Vec<EntitySchema>,
}

/// Typed CRUD facade over a storage engine.
///
/// Every operation is serialized through one lock, so a manager can be
/// shared across threads behind an `Arc`. Callbacks passed to `create` and
/// `update` run while that lock is held and must not call back into the
/// same manager. A callback that panics discards its staged changes and
/// leaves the manager usable.
///
/// # Examples
///
/// ```
/// use entitystore::{PersistenceManager, Predicate, User};
///
/// let manager = PersistenceManager::in_memory("Chat");
/// manager.initialize().unwrap();
///
/// manager
///     .create(|user: &mut User| {
///         user.user_id = 42;
///         user.name = "abc".into();
///     })
///     .unwrap();
///
/// let found: Vec<User> = manager
///     .fetch(Some(&Predicate::eq("user_id", 42)), &[])
///     .unwrap();
/// assert_eq!(found[0].name, "abc");
/// ```
pub struct PersistenceManager {
    name: String,
    inner: Mutex<Inner>,
    commits: AtomicU64,
}

impl PersistenceManager {
    /// Wrap an engine. The container is not opened until [`initialize`].
    ///
    /// [`initialize`]: PersistenceManager::initialize
    pub fn new(name: impl Into<String>, engine: Box<dyn StorageEngine>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                engine,
                context: Context::new(),
                state: ContainerState::Uninitialized,
                models: Vec::new(),
            }),
            commits: AtomicU64::new(0),
        }
    }

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Box::new(InMemoryStorage::new()))
    }

    /// Build a manager for `config` without opening it.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.name.clone(), config.build_engine()))
    }

    /// Build a manager for `config` and open its container.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let manager = Self::from_config(&config)?;
        manager.initialize()?;
        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open the container and load its persistent store.
    ///
    /// Safe to call again: a ready manager returns immediately and an
    /// unavailable one retries the load.
    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state.is_ready() {
            return Ok(());
        }

        let Inner { engine, state, models, .. } = &mut *inner;
        let loaded = engine.load().and_then(|_| {
            for schema in models.iter() {
                engine.register_entity(schema.clone())?;
            }
            Ok(())
        });

        match loaded {
            Ok(()) => {
                *state = ContainerState::Ready;
                info!("store '{}' ready", self.name);
                Ok(())
            }
            Err(err) => {
                let reason = match err {
                    StoreError::StoreLoad(reason) => reason,
                    other => other.to_string(),
                };
                error!("failed to load store '{}': {}", self.name, reason);
                *state = ContainerState::Unavailable(reason.clone());
                Err(StoreError::StoreLoad(reason))
            }
        }
    }

    pub fn state(&self) -> ContainerState {
        self.lock().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Number of commits that reached the storage engine.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Register `T`'s kind. Before `initialize` the schema is remembered and
    /// pushed to the engine once the container loads.
    pub fn register<T: Persistable>(&self) -> Result<()> {
        let schema = T::schema();
        if schema.name().is_empty() {
            return Err(StoreError::KindNotFound("Entity name is empty".into()));
        }

        let mut inner = self.lock();
        if let Some(known) = inner.models.iter().find(|m| m.name() == schema.name()) {
            if *known == schema {
                return Ok(());
            }
            return Err(StoreError::SchemaMismatch(format!(
                "Entity '{}' is already registered with a different schema",
                schema.name()
            )));
        }
        if inner.state.is_ready() {
            inner.engine.register_entity(schema.clone())?;
        }
        inner.models.push(schema);
        Ok(())
    }

    /// Insert a new record of kind `T`.
    ///
    /// `mutate` populates a blank draft; the populated value is returned once
    /// it has been committed.
    pub fn create<T, F>(&self, mutate: F) -> Result<T>
    where
        T: Persistable,
        F: FnOnce(&mut T),
    {
        self.run("create", |inner| {
            let schema = resolve_kind::<T>(inner)?;
            let id = inner.engine.allocate_id(schema.name())?;

            let mut draft = T::default();
            mutate(&mut draft);
            let values = draft.to_values();
            schema.validate(&values)?;

            inner.context.stage(Change::Insert {
                entity: T::ENTITY_NAME.to_string(),
                id,
                values,
            });
            self.save(inner)?;
            Ok(draft)
        })
    }

    /// Delete every record matching `predicate` (`None` matches all).
    /// Returns how many records were removed.
    pub fn delete<T: Persistable>(&self, predicate: Option<&Predicate>) -> Result<usize> {
        self.run("delete", |inner| {
            resolve_kind::<T>(inner)?;
            let records = inner.engine.fetch(&request::<T>(predicate, &[]))?;
            if records.is_empty() {
                warn!("delete on '{}' matched no records", T::ENTITY_NAME);
                return Ok(0);
            }

            let deleted = records.len();
            for record in records {
                inner.context.stage(Change::Delete {
                    entity: T::ENTITY_NAME.to_string(),
                    id: record.id,
                    old_values: record.values,
                });
            }
            self.save(inner)?;
            Ok(deleted)
        })
    }

    /// Fetch every record matching `predicate`, ordered by `sorts`.
    pub fn fetch<T: Persistable>(&self, predicate: Option<&Predicate>, sorts: &[SortKey]) -> Result<Vec<T>> {
        self.run("fetch", |inner| {
            resolve_kind::<T>(inner)?;
            let records = inner.engine.fetch(&request::<T>(predicate, sorts))?;
            decode_all(&records)
        })
    }

    /// Fetch one page of the filtered, sorted sequence.
    pub fn fetch_page<T: Persistable>(
        &self,
        offset: usize,
        limit: usize,
        predicate: Option<&Predicate>,
        sorts: &[SortKey],
    ) -> Result<Vec<T>> {
        self.run("fetch_page", |inner| {
            let page = Page::new(offset, limit)?;
            resolve_kind::<T>(inner)?;
            let records = inner
                .engine
                .fetch(&request::<T>(predicate, sorts).paginated(page))?;
            decode_all(&records)
        })
    }

    /// Number of records matching `predicate`.
    pub fn count<T: Persistable>(&self, predicate: Option<&Predicate>) -> Result<usize> {
        self.run("count", |inner| {
            resolve_kind::<T>(inner)?;
            Ok(inner.engine.fetch(&request::<T>(predicate, &[]))?.len())
        })
    }

    /// Mutate the first record matching `predicate`, in storage order.
    ///
    /// Nothing is committed unless the mutation actually changed a field.
    pub fn update<T, F>(&self, predicate: Option<&Predicate>, mutate: F) -> Result<UpdateOutcome>
    where
        T: Persistable,
        F: FnOnce(&mut T),
    {
        self.run("update", |inner| {
            let schema = resolve_kind::<T>(inner)?;
            let records = inner.engine.fetch(&request::<T>(predicate, &[]))?;
            let Some(record) = records.into_iter().next() else {
                warn!("update on '{}' matched no records", T::ENTITY_NAME);
                return Ok(UpdateOutcome::NotFound);
            };

            let mut value = T::from_record(&record)?;
            mutate(&mut value);
            match stage_update(inner, &schema, record, &value)? {
                true => {
                    self.save(inner)?;
                    Ok(UpdateOutcome::Updated)
                }
                false => Ok(UpdateOutcome::Unchanged),
            }
        })
    }

    /// Mutate every record matching `predicate` and commit once.
    /// Returns how many records actually changed.
    pub fn update_all<T, F>(&self, predicate: Option<&Predicate>, mut mutate: F) -> Result<usize>
    where
        T: Persistable,
        F: FnMut(&mut T),
    {
        self.run("update_all", |inner| {
            let schema = resolve_kind::<T>(inner)?;
            let records = inner.engine.fetch(&request::<T>(predicate, &[]))?;

            let mut changed = 0;
            for record in records {
                let mut value = match T::from_record(&record) {
                    Ok(value) => value,
                    Err(err) => {
                        inner.context.rollback();
                        return Err(err);
                    }
                };
                mutate(&mut value);
                match stage_update(inner, &schema, record, &value) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(err) => {
                        inner.context.rollback();
                        return Err(err);
                    }
                }
            }
            self.save(inner)?;
            Ok(changed)
        })
    }

    /// Lock, check readiness, run `op` and log its failure.
    fn run<R>(&self, op: &str, f: impl FnOnce(&mut Inner) -> Result<R>) -> Result<R> {
        let mut inner = self.lock();
        if !inner.state.is_ready() {
            let err = StoreError::Unavailable(format!("store '{}' is {}", self.name, inner.state));
            warn!("{} rejected: {}", op, err);
            return Err(err);
        }
        f(&mut *inner).inspect_err(|err| warn!("{} on '{}' failed: {}", op, self.name, err))
    }

    /// Lock the shared state. A callback that panicked under the lock never
    /// got as far as a commit, so its staged changes are dropped and the
    /// rest of the state is reused.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("recovering store '{}' after a panicked operation", self.name);
                self.inner.clear_poison();
                let mut guard = poisoned.into_inner();
                guard.context.rollback();
                guard
            }
        }
    }

    /// Commit the staged changes, if any. On failure the context is rolled
    /// back so no stale change survives into the next save.
    fn save(&self, inner: &mut Inner) -> Result<bool> {
        if !inner.context.has_changes() {
            return Ok(false);
        }
        let changes = inner.context.take_changes();
        let count = changes.len();
        if let Err(err) = inner.engine.commit(changes) {
            error!("commit to '{}' failed: {}", self.name, err);
            inner.context.rollback();
            return Err(err);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!("committed {} change(s) to '{}'", count, self.name);
        Ok(true)
    }
}

/// Make sure `T`'s kind is known to the engine, registering it on first use.
fn resolve_kind<T: Persistable>(inner: &mut Inner) -> Result<EntitySchema> {
    let schema = T::schema();
    if schema.name().is_empty() {
        return Err(StoreError::KindNotFound("Entity name is empty".into()));
    }
    match inner.engine.entity(schema.name()) {
        Some(known) if *known == schema => {}
        Some(_) => {
            return Err(StoreError::SchemaMismatch(format!(
                "Entity '{}' is registered with a different schema",
                schema.name()
            )));
        }
        None => inner.engine.register_entity(schema.clone())?,
    }
    Ok(schema)
}

fn request<T: Persistable>(predicate: Option<&Predicate>, sorts: &[SortKey]) -> FetchRequest {
    FetchRequest::new(T::ENTITY_NAME)
        .with_predicate(predicate.cloned())
        .sorted_by(sorts.to_vec())
}

fn decode_all<T: Persistable>(records: &[Record]) -> Result<Vec<T>> {
    records.iter().map(T::from_record).collect()
}

/// Stage an update if `value` differs from the stored record.
fn stage_update<T: Persistable>(
    inner: &mut Inner,
    schema: &EntitySchema,
    record: Record,
    value: &T,
) -> Result<bool> {
    let new_values = value.to_values();
    if new_values == record.values {
        return Ok(false);
    }
    schema.validate(&new_values)?;
    inner.context.stage(Change::Update {
        entity: T::ENTITY_NAME.to_string(),
        id: record.id,
        old_values: record.values,
        new_values,
    });
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectId;
    use crate::entity::User;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    /// In-memory engine whose load and commit can be made to fail.
    struct FlakyStorage {
        memory: InMemoryStorage,
        fail_load: bool,
        fail_commit: Arc<AtomicBool>,
    }

    impl StorageEngine for FlakyStorage {
        fn load(&mut self) -> Result<()> {
            if self.fail_load {
                return Err(StoreError::StoreLoad("container missing".into()));
            }
            self.memory.load()
        }

        fn register_entity(&mut self, schema: EntitySchema) -> Result<()> {
            self.memory.register_entity(schema)
        }

        fn entity(&self, name: &str) -> Option<&EntitySchema> {
            self.memory.entity(name)
        }

        fn entity_names(&self) -> Vec<String> {
            self.memory.entity_names()
        }

        fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>> {
            self.memory.fetch(request)
        }

        fn allocate_id(&mut self, entity: &str) -> Result<ObjectId> {
            self.memory.allocate_id(entity)
        }

        fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(StoreError::Commit("disk full".into()));
            }
            self.memory.commit(changes)
        }
    }

    fn flaky(fail_load: bool) -> (PersistenceManager, Arc<AtomicBool>) {
        let fail_commit = Arc::new(AtomicBool::new(false));
        let engine = FlakyStorage {
            memory: InMemoryStorage::new(),
            fail_load,
            fail_commit: fail_commit.clone(),
        };
        (PersistenceManager::new("Flaky", Box::new(engine)), fail_commit)
    }

    fn ready() -> PersistenceManager {
        let manager = PersistenceManager::in_memory("Test");
        manager.initialize().unwrap();
        manager
    }

    fn add(manager: &PersistenceManager, id: i64, name: &str) -> User {
        manager
            .create(|u: &mut User| {
                u.user_id = id;
                u.name = name.to_string();
                u.update_time = id * 10;
            })
            .unwrap()
    }

    #[test]
    fn test_uninitialized_rejects_operations() {
        let manager = PersistenceManager::in_memory("Test");
        assert_eq!(manager.state(), ContainerState::Uninitialized);
        let err = manager.fetch::<User>(None, &[]).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let manager = ready();
        manager.initialize().unwrap();
        assert!(manager.is_ready());
    }

    #[test]
    fn test_load_failure_marks_unavailable() {
        let (manager, _) = flaky(true);
        let err = manager.initialize().unwrap_err();
        assert!(matches!(err, StoreError::StoreLoad(_)));
        assert_eq!(
            manager.state(),
            ContainerState::Unavailable("container missing".into())
        );

        let err = manager.create(|_: &mut User| {}).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(matches!(
            manager.delete::<User>(None).unwrap_err(),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_create_then_fetch() {
        let manager = ready();
        let created = add(&manager, 42, "abc");

        let found: Vec<User> = manager
            .fetch(Some(&Predicate::eq("user_id", 42)), &[])
            .unwrap();
        assert_eq!(found, vec![created]);
        assert_eq!(manager.commit_count(), 1);
    }

    #[test]
    fn test_register_before_initialize() {
        let manager = PersistenceManager::in_memory("Test");
        manager.register::<User>().unwrap();
        manager.register::<User>().unwrap();
        manager.initialize().unwrap();
        assert_eq!(manager.count::<User>(None).unwrap(), 0);
    }

    #[test]
    fn test_update_first_match_only() {
        let manager = ready();
        add(&manager, 1, "same");
        add(&manager, 2, "same");

        let outcome = manager
            .update(Some(&Predicate::eq("name", "same")), |u: &mut User| {
                u.last_msg = "hi".into();
            })
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let users: Vec<User> = manager.fetch(None, &[]).unwrap();
        assert_eq!(users[0].last_msg, "hi");
        assert_eq!(users[1].last_msg, "");
    }

    #[test]
    fn test_noop_update_does_not_commit() {
        let manager = ready();
        add(&manager, 1, "a");
        let before = manager.commit_count();

        let outcome = manager
            .update(Some(&Predicate::eq("user_id", 1)), |u: &mut User| {
                u.name = "a".into();
            })
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Unchanged);
        assert_eq!(manager.commit_count(), before);

        let outcome = manager
            .update(Some(&Predicate::eq("user_id", 99)), |_: &mut User| {})
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
        assert_eq!(manager.commit_count(), before);
    }

    #[test]
    fn test_update_all() {
        let manager = ready();
        add(&manager, 1, "a");
        add(&manager, 2, "b");
        add(&manager, 3, "c");
        let before = manager.commit_count();

        let changed = manager
            .update_all(Some(&Predicate::gt("user_id", 1)), |u: &mut User| {
                u.last_msg = "bulk".into();
            })
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(manager.commit_count(), before + 1);
        assert_eq!(
            manager
                .count::<User>(Some(&Predicate::eq("last_msg", "bulk")))
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let manager = ready();
        add(&manager, 1, "a");
        add(&manager, 2, "b");

        let predicate = Predicate::eq("user_id", 1);
        assert_eq!(manager.delete::<User>(Some(&predicate)).unwrap(), 1);
        let before = manager.commit_count();
        assert_eq!(manager.delete::<User>(Some(&predicate)).unwrap(), 0);
        assert_eq!(manager.commit_count(), before);
        assert_eq!(manager.count::<User>(None).unwrap(), 1);
    }

    #[test]
    fn test_fetch_page() {
        let manager = ready();
        for id in 1..=5 {
            add(&manager, id, "u");
        }
        let sorts = [SortKey::descending("update_time")];

        let page: Vec<User> = manager.fetch_page(1, 2, None, &sorts).unwrap();
        let ids: Vec<i64> = page.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![4, 3]);

        let tail: Vec<User> = manager.fetch_page(4, 2, None, &sorts).unwrap();
        assert_eq!(tail.len(), 1);
        let empty: Vec<User> = manager.fetch_page(5, 2, None, &sorts).unwrap();
        assert!(empty.is_empty());

        let err = manager.fetch_page::<User>(0, 0, None, &sorts).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn test_unknown_field_is_reported() {
        let manager = ready();
        let err = manager
            .fetch::<User>(Some(&Predicate::eq("nope", 1)), &[])
            .unwrap_err();
        assert!(matches!(err, StoreError::FieldNotFound(_, _)));
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let (manager, fail_commit) = flaky(false);
        manager.initialize().unwrap();
        fail_commit.store(true, Ordering::SeqCst);

        let err = manager.create(|u: &mut User| u.user_id = 7).unwrap_err();
        assert!(matches!(err, StoreError::Commit(_)));
        assert_eq!(manager.commit_count(), 0);

        // nothing stale is left behind for the next save
        fail_commit.store(false, Ordering::SeqCst);
        add(&manager, 8, "ok");
        let users: Vec<User> = manager.fetch(None, &[]).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 8);
    }

    #[test]
    fn test_panicking_callback_leaves_manager_usable() {
        let manager = ready();
        add(&manager, 1, "a");
        add(&manager, 2, "b");
        let before = manager.commit_count();

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            manager.create(|_: &mut User| panic!("callback failed"))
        }));
        assert!(result.is_err());
        assert!(manager.is_ready());

        // the first record is staged before the callback panics on the second
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            manager.update_all(None, |u: &mut User| {
                if u.user_id == 2 {
                    panic!("callback failed");
                }
                u.last_msg = "partial".into();
            })
        }));
        assert!(result.is_err());

        manager.initialize().unwrap();
        assert_eq!(manager.commit_count(), before);
        assert_eq!(
            manager
                .count::<User>(Some(&Predicate::eq("last_msg", "partial")))
                .unwrap(),
            0
        );

        add(&manager, 3, "c");
        assert_eq!(manager.count::<User>(None).unwrap(), 3);
    }

    #[test]
    fn test_shared_across_threads() {
        let manager = Arc::new(ready());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    manager.create(|u: &mut User| u.user_id = i).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.count::<User>(None).unwrap(), 4);
    }
}
