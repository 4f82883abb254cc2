use std::{any::Any, fmt, marker::PhantomData};

use patchwork_proto::Uid;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::AggregateError, registry::ModelType, schema::AggregateCollection};

/// A persisted domain type a repository knows how to store.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage collection name, stable across builds.
    fn collection() -> &'static str;

    fn uid(&self) -> &Uid;

    /// A blank instance, used as the target of a `Create` patch before its properties are mapped.
    fn with_uid(uid: Uid) -> Self;
}

/// An entity whose concrete type is only known at runtime.
pub struct EntityHandle {
    model: ModelType,
    uid: Uid,
    value: Box<dyn Any + Send + Sync>,
}

impl EntityHandle {
    pub fn new<T: Entity>(entity: T) -> Self { Self { model: ModelType::of::<T>(), uid: entity.uid().clone(), value: Box::new(entity) } }

    pub fn model_type(&self) -> ModelType { self.model }

    pub fn uid(&self) -> &Uid { &self.uid }

    pub fn is<T: Entity>(&self) -> bool { self.model.is::<T>() }

    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> { self.value.downcast_ref::<T>() }

    /// Mutable access to the entity. Changing its uid through this reference is not reflected in [`EntityHandle::uid`].
    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> { self.value.downcast_mut::<T>() }

    pub fn into_inner<T: Entity>(self) -> Result<T, Self> {
        let EntityHandle { model, uid, value } = self;
        match value.downcast::<T>() {
            Ok(entity) => Ok(*entity),
            Err(value) => Err(EntityHandle { model, uid, value }),
        }
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "EntityHandle({} {})", self.model, self.uid) }
}

/// Typed reference to another entity, stored as the target's uid.
pub struct Ref<T> {
    uid: Uid,
    _model: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub fn new(uid: impl Into<Uid>) -> Self { Self { uid: uid.into(), _model: PhantomData } }

    pub fn uid(&self) -> &Uid { &self.uid }
}

impl<T: Entity> From<&T> for Ref<T> {
    fn from(entity: &T) -> Self { Ref::new(entity.uid().clone()) }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self { Ref::new(self.uid.clone()) }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool { self.uid == other.uid }
}

impl<T> Eq for Ref<T> {}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Ref({})", self.uid) }
}

impl<T> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { self.uid.serialize(serializer) }
}

impl<'de, T> Deserialize<'de> for Ref<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> { Uid::deserialize(deserializer).map(Ref::new) }
}

/// Parent-owned collection of member entities, stored as an ordered list of member uids.
pub struct Aggregate<T> {
    members: Vec<Uid>,
    _model: PhantomData<fn() -> T>,
}

impl<T> Aggregate<T> {
    pub fn new() -> Self { Self { members: Vec::new(), _model: PhantomData } }

    pub fn members(&self) -> &[Uid] { &self.members }

    pub fn contains(&self, uid: &Uid) -> bool { self.members.contains(uid) }

    pub fn len(&self) -> usize { self.members.len() }

    pub fn is_empty(&self) -> bool { self.members.is_empty() }
}

impl<T> Default for Aggregate<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for Aggregate<T> {
    fn clone(&self) -> Self { Self { members: self.members.clone(), _model: PhantomData } }
}

impl<T> PartialEq for Aggregate<T> {
    fn eq(&self, other: &Self) -> bool { self.members == other.members }
}

impl<T> fmt::Debug for Aggregate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_list().entries(&self.members).finish() }
}

impl<T, U: Into<Uid>> FromIterator<U> for Aggregate<T> {
    fn from_iter<I: IntoIterator<Item = U>>(iter: I) -> Self { Self { members: iter.into_iter().map(Into::into).collect(), _model: PhantomData } }
}

impl<T> Serialize for Aggregate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { self.members.serialize(serializer) }
}

impl<'de, T> Deserialize<'de> for Aggregate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Uid>::deserialize(deserializer).map(|members| Self { members, _model: PhantomData })
    }
}

impl<T: Entity> Aggregate<T> {
    fn check(member: &EntityHandle) -> Result<(), AggregateError> {
        if member.is::<T>() {
            Ok(())
        } else {
            Err(AggregateError::MemberType { expected: std::any::type_name::<T>(), given: member.model_type() })
        }
    }
}

impl<T: Entity> AggregateCollection for Aggregate<T> {
    fn add_member(&mut self, member: &EntityHandle) -> Result<bool, AggregateError> {
        Self::check(member)?;
        if self.members.contains(member.uid()) {
            return Ok(false);
        }
        self.members.push(member.uid().clone());
        Ok(true)
    }

    fn remove_member(&mut self, member: &EntityHandle) -> Result<bool, AggregateError> {
        Self::check(member)?;
        let before = self.members.len();
        self.members.retain(|uid| uid != member.uid());
        Ok(self.members.len() != before)
    }
}
