#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use patchwork_core::{
    error::RepositoryError,
    mapper::ResolvedProperties,
    tracking::{AggregateMember, ChangeTracked, Lifecycle, ModelState, PropertyDelta, Tracked, TrackedAggregate, TrackedRef},
    Aggregate, AliasRegistry, Entity, EntityHandle, EntityStore, ModelType, PatchRepository, PatchResolver, Ref, Repository, Schema, Uid,
    UnitOfWork,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { let _ = tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().try_init(); }

// ---- Stored entities ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Company {
    pub uid: Uid,
    pub name: String,
    pub city: String,
    pub employees: Aggregate<Person>,
    pub board: Vec<Uid>,
}

impl Entity for Company {
    fn collection() -> &'static str { "company" }
    fn uid(&self) -> &Uid { &self.uid }
    fn with_uid(uid: Uid) -> Self { Company { uid, name: String::new(), city: String::new(), employees: Aggregate::new(), board: Vec::new() } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    pub uid: Uid,
    pub first_name: String,
    pub last_name: String,
    pub employer: Option<Ref<Company>>,
}

impl Entity for Person {
    fn collection() -> &'static str { "person" }
    fn uid(&self) -> &Uid { &self.uid }
    fn with_uid(uid: Uid) -> Self { Person { uid, first_name: String::new(), last_name: String::new(), employer: None } }
}

pub fn company(uid: &str, employees: &[&str]) -> Company {
    Company { name: format!("Company {uid}"), employees: employees.iter().copied().collect(), ..Company::with_uid(uid.into()) }
}

pub fn person(uid: &str, first_name: &str) -> Person {
    Person { first_name: first_name.into(), last_name: "Smith".into(), ..Person::with_uid(uid.into()) }
}

// ---- Change-tracked client models ----

pub struct LiveCompany {
    pub uid: Uid,
    pub lifecycle: Lifecycle,
    pub name: Tracked<String>,
    pub city: Tracked<String>,
    pub employees: TrackedAggregate<LivePerson>,
}

impl LiveCompany {
    pub fn loaded(uid: &str, employees: Vec<LivePerson>) -> Self {
        LiveCompany {
            uid: uid.into(),
            lifecycle: Lifecycle::loaded(),
            name: Tracked::new(format!("Company {uid}")),
            city: Tracked::new(String::new()),
            employees: TrackedAggregate::new(employees),
        }
    }
}

impl ChangeTracked for LiveCompany {
    fn model_type(&self) -> ModelType { ModelType::of::<Self>() }

    fn uid(&self) -> &Uid { &self.uid }

    fn state(&self) -> ModelState { self.lifecycle.state(self.name.is_changed() || self.city.is_changed() || self.employees.is_changed()) }

    fn delta(&self) -> Vec<PropertyDelta<'_>> {
        let mut delta = Vec::new();
        self.name.push_delta("Name", &mut delta);
        self.city.push_delta("City", &mut delta);
        self.employees.push_delta("Employees", &mut delta);
        delta
    }
}

pub struct LivePerson {
    pub uid: Uid,
    pub lifecycle: Lifecycle,
    pub first_name: Tracked<String>,
    pub last_name: Tracked<String>,
    pub employer: TrackedRef,
}

impl LivePerson {
    pub fn loaded(uid: &str, first_name: &str) -> Self {
        LivePerson {
            uid: uid.into(),
            lifecycle: Lifecycle::loaded(),
            first_name: Tracked::new(first_name.into()),
            last_name: Tracked::new("Smith".into()),
            employer: TrackedRef::default(),
        }
    }

    /// A person that does not exist in storage yet. Every field counts as changed.
    pub fn new(uid: &str, first_name: &str) -> Self {
        let mut person = LivePerson {
            uid: uid.into(),
            lifecycle: Lifecycle::added(),
            first_name: Tracked::new(String::new()),
            last_name: Tracked::new(String::new()),
            employer: TrackedRef::default(),
        };
        person.first_name.set(first_name.into());
        person
    }
}

impl ChangeTracked for LivePerson {
    fn model_type(&self) -> ModelType { ModelType::of::<Self>() }

    fn uid(&self) -> &Uid { &self.uid }

    fn state(&self) -> ModelState {
        self.lifecycle.state(self.first_name.is_changed() || self.last_name.is_changed() || self.employer.is_changed())
    }

    fn delta(&self) -> Vec<PropertyDelta<'_>> {
        let mut delta = Vec::new();
        self.first_name.push_delta("FirstName", &mut delta);
        self.last_name.push_delta("LastName", &mut delta);
        self.employer.push_delta("Employer", &mut delta);
        delta
    }
}

impl AggregateMember for LivePerson {
    fn lifecycle_mut(&mut self) -> &mut Lifecycle { &mut self.lifecycle }

    fn accept_changes(&mut self) {
        self.lifecycle.accept_changes();
        self.first_name.accept_changes();
        self.last_name.accept_changes();
        self.employer.accept_changes();
    }
}

// ---- Registries ----

pub fn client_aliases() -> AliasRegistry {
    let mut aliases = AliasRegistry::new();
    aliases.register::<LiveCompany>("company").unwrap();
    aliases.register::<LivePerson>("person").unwrap();
    aliases
}

pub fn server_aliases() -> Arc<AliasRegistry> {
    let mut aliases = AliasRegistry::new();
    aliases.register::<Company>("company").unwrap();
    aliases.register::<Person>("person").unwrap();
    Arc::new(aliases)
}

pub fn schema() -> Arc<Schema> { Arc::new(Schema::new().aggregate("Employees", |company: &mut Company| &mut company.employees)) }

// ---- In-memory backend ----

type Key = (&'static str, Uid);

#[derive(Default)]
struct MemoryState {
    committed: BTreeMap<Key, Value>,
    /// `None` marks a staged delete
    staged: BTreeMap<Key, Option<Value>>,
    saves: usize,
    aborts: usize,
    fail_on: Option<(&'static str, Uid)>,
}

/// Stores entities as JSON, stages every write until `save`.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn seed<T: Entity>(&self, entity: T) {
        let mut state = self.state.lock().unwrap();
        state.committed.insert((T::collection(), entity.uid().clone()), serde_json::to_value(&entity).unwrap());
    }

    /// Make the next `op` ("create", "update", "delete") on `uid` fail.
    pub fn fail_on(&self, op: &'static str, uid: &str) { self.state.lock().unwrap().fail_on = Some((op, uid.into())); }

    pub fn committed<T: Entity>(&self, uid: &str) -> Option<T> {
        let state = self.state.lock().unwrap();
        state.committed.get(&(T::collection(), Uid::from(uid))).map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    pub fn saves(&self) -> usize { self.state.lock().unwrap().saves }

    pub fn aborts(&self) -> usize { self.state.lock().unwrap().aborts }

    pub fn staged(&self) -> usize { self.state.lock().unwrap().staged.len() }

    fn check_failure(state: &mut MemoryState, op: &'static str, uid: &Uid) -> Result<(), RepositoryError> {
        if state.fail_on.as_ref().is_some_and(|(o, u)| *o == op && u == uid) {
            state.fail_on = None;
            return Err(RepositoryError::backend(std::io::Error::other(format!("injected {op} failure for {uid}"))));
        }
        Ok(())
    }

    fn read(state: &MemoryState, key: &Key) -> Option<Value> {
        match state.staged.get(key) {
            Some(staged) => staged.clone(),
            None => state.committed.get(key).cloned(),
        }
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryBackend {
    async fn retrieve(&self, uid: &Uid) -> Result<Option<T>, RepositoryError> {
        let value = Self::read(&self.state.lock().unwrap(), &(T::collection(), uid.clone()));
        value.map(|value| serde_json::from_value(value).map_err(|e| RepositoryError::SerializationError(Box::new(e)))).transpose()
    }

    async fn create(&self, entity: &T) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state, "create", entity.uid())?;
        let key = (T::collection(), entity.uid().clone());
        if Self::read(&state, &key).is_some() {
            return Err(RepositoryError::AlreadyExists { model: T::collection().into(), uid: entity.uid().clone() });
        }
        let value = serde_json::to_value(entity).map_err(|e| RepositoryError::SerializationError(Box::new(e)))?;
        state.staged.insert(key, Some(value));
        Ok(())
    }

    async fn update(&self, entity: &T) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state, "update", entity.uid())?;
        let key = (T::collection(), entity.uid().clone());
        if Self::read(&state, &key).is_none() {
            return Err(RepositoryError::not_found(T::collection(), entity.uid()));
        }
        let value = serde_json::to_value(entity).map_err(|e| RepositoryError::SerializationError(Box::new(e)))?;
        state.staged.insert(key, Some(value));
        Ok(())
    }

    async fn delete(&self, uid: &Uid) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state, "delete", uid)?;
        let key = (T::collection(), uid.clone());
        if Self::read(&state, &key).is_none() {
            return Ok(false);
        }
        state.staged.insert(key, None);
        Ok(true)
    }
}

#[async_trait]
impl UnitOfWork for MemoryBackend {
    async fn save(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let staged = std::mem::take(&mut state.staged);
        for (key, value) in staged {
            match value {
                Some(value) => state.committed.insert(key, value),
                None => state.committed.remove(&key),
            };
        }
        state.saves += 1;
        Ok(())
    }

    async fn abort(&self) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.staged.clear();
        state.aborts += 1;
        Ok(())
    }
}

// ---- Call recording ----

/// Wraps a repository and records every type-erased call in order.
pub struct RecordingRepository<R> {
    inner: R,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl<R: PatchRepository> RecordingRepository<R> {
    pub fn new(inner: R) -> Self { Self { inner, calls: Mutex::new(Vec::new()), delay: None } }

    /// Sleep before every update, for deadline tests.
    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &R { &self.inner }

    pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }

    pub fn count(&self, prefix: &str) -> usize { self.calls.lock().unwrap().iter().filter(|call| call.starts_with(prefix)).count() }

    fn record(&self, call: String) { self.calls.lock().unwrap().push(call) }
}

#[async_trait]
impl<R: PatchRepository> PatchRepository for RecordingRepository<R> {
    async fn handle_retrieve(&self, model: ModelType, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError> {
        self.record(format!("retrieve {model} {uid}"));
        self.inner.handle_retrieve(model, uid).await
    }

    async fn handle_create(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        self.record(format!("create {model} {uid}"));
        self.inner.handle_create(model, uid, properties).await
    }

    async fn handle_update(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        self.record(format!("update {model} {uid}"));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.handle_update(model, uid, properties).await
    }

    async fn handle_delete(&self, model: ModelType, uid: &Uid) -> Result<(), RepositoryError> {
        self.record(format!("delete {model} {uid}"));
        self.inner.handle_delete(model, uid).await
    }

    async fn handle_replace(&self, entity: EntityHandle) -> Result<(), RepositoryError> {
        self.record(format!("replace {} {}", entity.model_type(), entity.uid()));
        self.inner.handle_replace(entity).await
    }

    async fn save(&self) -> Result<(), RepositoryError> {
        self.record("save".into());
        self.inner.save().await
    }

    async fn abort(&self) -> Result<(), RepositoryError> {
        self.record("abort".into());
        self.inner.abort().await
    }
}

pub type TestRepository = RecordingRepository<Repository<MemoryBackend>>;

/// A resolver over a memory backend holding company C1 with employees P1 and P2.
pub fn seeded_resolver() -> PatchResolver<TestRepository> {
    let backend = MemoryBackend::new();
    backend.seed(company("C1", &["P1", "P2"]));
    backend.seed(person("P1", "Jane"));
    backend.seed(person("P2", "Bob"));
    resolver(backend)
}

pub fn resolver(backend: MemoryBackend) -> PatchResolver<TestRepository> {
    let repository = Repository::new(backend).register::<Company>().register::<Person>();
    PatchResolver::new(RecordingRepository::new(repository), server_aliases(), schema())
}

pub fn backend(resolver: &PatchResolver<TestRepository>) -> &MemoryBackend { resolver.repository().inner().backend() }
