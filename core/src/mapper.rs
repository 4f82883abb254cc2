use std::collections::{btree_map, BTreeMap};

use serde_json::Value;

use crate::{
    entity::{Entity, EntityHandle},
    error::MappingError,
};

/// A property value after reference resolution.
#[derive(Debug)]
pub enum ResolvedValue {
    Scalar(Value),
    /// The referenced entity, or `None` to clear the reference.
    Reference(Option<EntityHandle>),
}

impl ResolvedValue {
    /// JSON form used by [`JsonMapper`]: references become the target uid, or null.
    pub fn to_json(&self) -> Value {
        match self {
            ResolvedValue::Scalar(value) => value.clone(),
            ResolvedValue::Reference(Some(target)) => Value::String(target.uid().as_str().to_owned()),
            ResolvedValue::Reference(None) => Value::Null,
        }
    }
}

/// A flat property bag whose references have been fetched from the repository.
#[derive(Debug, Default)]
pub struct ResolvedProperties(BTreeMap<String, ResolvedValue>);

impl ResolvedProperties {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, value: ResolvedValue) { self.0.insert(name.into(), value); }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> { self.0.get(name) }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ResolvedValue> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<'a> IntoIterator for &'a ResolvedProperties {
    type Item = (&'a String, &'a ResolvedValue);
    type IntoIter = btree_map::Iter<'a, String, ResolvedValue>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl<K: Into<String>> FromIterator<(K, ResolvedValue)> for ResolvedProperties {
    fn from_iter<T: IntoIterator<Item = (K, ResolvedValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(name, value)| (name.into(), value)).collect())
    }
}

/// Assigns a resolved property bag onto an entity.
pub trait ObjectMapper: Send + Sync + 'static {
    fn map<T: Entity>(&self, properties: &ResolvedProperties, target: &mut T) -> Result<(), MappingError>;
}

/// Maps through the entity's serde JSON form: every property overwrites the field of the same
/// serialized name. Property names the entity does not serialize are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapper;

impl ObjectMapper for JsonMapper {
    fn map<T: Entity>(&self, properties: &ResolvedProperties, target: &mut T) -> Result<(), MappingError> {
        let model = std::any::type_name::<T>();
        if properties.is_empty() {
            return Ok(());
        }

        let mut value = serde_json::to_value(&*target).map_err(|source| MappingError::Json { model, source })?;
        let Some(object) = value.as_object_mut() else {
            return Err(MappingError::NotAnObject { model });
        };
        for (name, property) in properties {
            match object.get_mut(name) {
                Some(field) => *field = property.to_json(),
                None => return Err(MappingError::UnknownProperty { model, property: name.clone() }),
            }
        }

        *target = serde_json::from_value(value).map_err(|source| MappingError::Json { model, source })?;
        Ok(())
    }
}
