use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use patchwork_proto::Uid;
use tracing::debug;

use crate::{
    entity::{Entity, EntityHandle},
    error::{MappingError, RepositoryError},
    mapper::{JsonMapper, ObjectMapper, ResolvedProperties},
    registry::ModelType,
};

/// Backend-agnostic sink for resolved patches.
///
/// Every operation takes a runtime type token instead of a generic parameter, so one resolver can drive
/// entity types it never names. All calls made during one apply belong to the same unit of work, which
/// ends with [`PatchRepository::save`] or [`PatchRepository::abort`].
#[async_trait]
pub trait PatchRepository: Send + Sync {
    async fn handle_retrieve(&self, model: ModelType, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError>;

    async fn handle_create(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError>;

    /// Fails with `NotFound` if the entity does not exist.
    async fn handle_update(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError>;

    /// Fails with `NotFound` if the entity does not exist.
    async fn handle_delete(&self, model: ModelType, uid: &Uid) -> Result<(), RepositoryError>;

    /// Write back an entity that was retrieved and then changed in memory.
    async fn handle_replace(&self, entity: EntityHandle) -> Result<(), RepositoryError>;

    async fn save(&self) -> Result<(), RepositoryError>;

    async fn abort(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<R: PatchRepository + ?Sized> PatchRepository for Arc<R> {
    async fn handle_retrieve(&self, model: ModelType, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError> {
        (**self).handle_retrieve(model, uid).await
    }

    async fn handle_create(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        (**self).handle_create(model, uid, properties).await
    }

    async fn handle_update(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        (**self).handle_update(model, uid, properties).await
    }

    async fn handle_delete(&self, model: ModelType, uid: &Uid) -> Result<(), RepositoryError> { (**self).handle_delete(model, uid).await }

    async fn handle_replace(&self, entity: EntityHandle) -> Result<(), RepositoryError> { (**self).handle_replace(entity).await }

    async fn save(&self) -> Result<(), RepositoryError> { (**self).save().await }

    async fn abort(&self) -> Result<(), RepositoryError> { (**self).abort().await }
}

/// Strongly-typed storage primitives for one entity type. Backends implement this for the types they own.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn retrieve(&self, uid: &Uid) -> Result<Option<T>, RepositoryError>;

    /// Fails with `AlreadyExists` if an entity with the same uid is present.
    async fn create(&self, entity: &T) -> Result<(), RepositoryError>;

    /// Fails with `NotFound` if the entity is absent.
    async fn update(&self, entity: &T) -> Result<(), RepositoryError>;

    /// Returns whether an entity was removed.
    async fn delete(&self, uid: &Uid) -> Result<bool, RepositoryError>;
}

/// The commit/rollback boundary of a backend.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn save(&self) -> Result<(), RepositoryError>;

    async fn abort(&self) -> Result<(), RepositoryError>;
}

#[async_trait]
trait ModelHandler<B, M>: Send + Sync {
    async fn retrieve(&self, backend: &B, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError>;
    async fn create(&self, backend: &B, mapper: &M, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError>;
    async fn update(&self, backend: &B, mapper: &M, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError>;
    async fn delete(&self, backend: &B, uid: &Uid) -> Result<(), RepositoryError>;
    async fn replace(&self, backend: &B, entity: EntityHandle) -> Result<(), RepositoryError>;
}

struct TypedHandler<T>(PhantomData<fn() -> T>);

/// Properties may not move an entity to another uid; the patch addresses exactly one instance.
fn map_onto<T: Entity, M: ObjectMapper>(mapper: &M, properties: &ResolvedProperties, entity: &mut T, uid: &Uid) -> Result<(), MappingError> {
    mapper.map(properties, entity)?;
    if entity.uid() != uid {
        return Err(MappingError::IdentityChanged { model: std::any::type_name::<T>(), expected: uid.clone(), given: entity.uid().clone() });
    }
    Ok(())
}

#[async_trait]
impl<T, B, M> ModelHandler<B, M> for TypedHandler<T>
where
    T: Entity,
    B: EntityStore<T>,
    M: ObjectMapper,
{
    async fn retrieve(&self, backend: &B, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError> {
        Ok(backend.retrieve(uid).await?.map(EntityHandle::new))
    }

    async fn create(&self, backend: &B, mapper: &M, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        let mut entity = T::with_uid(uid.clone());
        map_onto(mapper, &properties, &mut entity, uid)?;
        backend.create(&entity).await?;
        Ok(EntityHandle::new(entity))
    }

    async fn update(&self, backend: &B, mapper: &M, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        let mut entity = backend.retrieve(uid).await?.ok_or_else(|| RepositoryError::not_found(T::collection(), uid))?;
        map_onto(mapper, &properties, &mut entity, uid)?;
        backend.update(&entity).await?;
        Ok(EntityHandle::new(entity))
    }

    async fn delete(&self, backend: &B, uid: &Uid) -> Result<(), RepositoryError> {
        if backend.delete(uid).await? {
            Ok(())
        } else {
            Err(RepositoryError::not_found(T::collection(), uid))
        }
    }

    async fn replace(&self, backend: &B, entity: EntityHandle) -> Result<(), RepositoryError> {
        let given = entity.model_type();
        let entity = entity.into_inner::<T>().map_err(|_| RepositoryError::HandleMismatch { expected: std::any::type_name::<T>(), given })?;
        backend.update(&entity).await
    }
}

/// Base [`PatchRepository`] that dispatches each type-erased call to the statically-typed
/// [`EntityStore`] implementation registered for its type token.
///
/// ```ignore
/// let repository = Repository::new(backend).register::<Company>().register::<Person>();
/// ```
pub struct Repository<B, M = JsonMapper> {
    backend: B,
    mapper: M,
    handlers: HashMap<ModelType, Box<dyn ModelHandler<B, M>>>,
}

impl<B: UnitOfWork + 'static> Repository<B, JsonMapper> {
    pub fn new(backend: B) -> Self { Self::with_mapper(backend, JsonMapper) }
}

impl<B: UnitOfWork + 'static, M: ObjectMapper> Repository<B, M> {
    pub fn with_mapper(backend: B, mapper: M) -> Self { Self { backend, mapper, handlers: HashMap::new() } }

    pub fn register<T: Entity>(mut self) -> Self
    where B: EntityStore<T> {
        self.handlers.insert(ModelType::of::<T>(), Box::new(TypedHandler::<T>(PhantomData)));
        self
    }

    pub fn backend(&self) -> &B { &self.backend }

    pub fn is_registered(&self, model: ModelType) -> bool { self.handlers.contains_key(&model) }

    fn handler(&self, model: ModelType) -> Result<&dyn ModelHandler<B, M>, RepositoryError> {
        self.handlers.get(&model).map(|handler| handler.as_ref()).ok_or(RepositoryError::Unregistered(model))
    }
}

#[async_trait]
impl<B: UnitOfWork + 'static, M: ObjectMapper> PatchRepository for Repository<B, M> {
    async fn handle_retrieve(&self, model: ModelType, uid: &Uid) -> Result<Option<EntityHandle>, RepositoryError> {
        self.handler(model)?.retrieve(&self.backend, uid).await
    }

    async fn handle_create(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        debug!("Repository.create {model} {uid:#} ({} properties)", properties.len());
        self.handler(model)?.create(&self.backend, &self.mapper, uid, properties).await
    }

    async fn handle_update(&self, model: ModelType, uid: &Uid, properties: ResolvedProperties) -> Result<EntityHandle, RepositoryError> {
        debug!("Repository.update {model} {uid:#} ({} properties)", properties.len());
        self.handler(model)?.update(&self.backend, &self.mapper, uid, properties).await
    }

    async fn handle_delete(&self, model: ModelType, uid: &Uid) -> Result<(), RepositoryError> {
        debug!("Repository.delete {model} {uid:#}");
        self.handler(model)?.delete(&self.backend, uid).await
    }

    async fn handle_replace(&self, entity: EntityHandle) -> Result<(), RepositoryError> {
        debug!("Repository.replace {} {:#}", entity.model_type(), entity.uid());
        self.handler(entity.model_type())?.replace(&self.backend, entity).await
    }

    async fn save(&self) -> Result<(), RepositoryError> { self.backend.save().await }

    async fn abort(&self) -> Result<(), RepositoryError> { self.backend.abort().await }
}
