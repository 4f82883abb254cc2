use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
};

use patchwork_proto::REFERENCE_SEPARATOR;

use crate::error::RegistryError;

/// Runtime type token for a model or entity type.
#[derive(Clone, Copy)]
pub struct ModelType {
    id: TypeId,
    name: &'static str,
}

impl ModelType {
    pub fn of<T: 'static>() -> Self { ModelType { id: TypeId::of::<T>(), name: type_name::<T>() } }

    pub fn name(&self) -> &'static str { self.name }

    pub fn is<T: 'static>(&self) -> bool { self.id == TypeId::of::<T>() }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for ModelType {}

impl Hash for ModelType {
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // drop the module path
        write!(f, "{}", self.name.rsplit("::").next().unwrap_or(self.name))
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ModelType({})", self.name) }
}

/// Two-way mapping between short aliases and model types.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    by_alias: HashMap<String, ModelType>,
    by_type: HashMap<ModelType, String>,
}

impl AliasRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register<T: 'static>(&mut self, alias: impl Into<String>) -> Result<&mut Self, RegistryError> {
        self.register_type(ModelType::of::<T>(), alias)
    }

    /// Builder form of [`AliasRegistry::register`].
    pub fn with<T: 'static>(mut self, alias: impl Into<String>) -> Result<Self, RegistryError> {
        self.register::<T>(alias)?;
        Ok(self)
    }

    pub fn register_type(&mut self, model: ModelType, alias: impl Into<String>) -> Result<&mut Self, RegistryError> {
        let alias = alias.into();
        if alias.is_empty() || alias.contains(REFERENCE_SEPARATOR) {
            return Err(RegistryError::InvalidAlias(alias));
        }
        if self.by_alias.contains_key(&alias) {
            return Err(RegistryError::DuplicateAlias(alias));
        }
        if self.by_type.contains_key(&model) {
            return Err(RegistryError::DuplicateType(model));
        }
        self.by_alias.insert(alias.clone(), model);
        self.by_type.insert(model, alias);
        Ok(self)
    }

    pub fn alias_of(&self, model: &ModelType) -> Option<&str> { self.by_type.get(model).map(String::as_str) }

    pub fn resolve(&self, alias: &str) -> Option<ModelType> { self.by_alias.get(alias).copied() }

    pub fn len(&self) -> usize { self.by_alias.len() }

    pub fn is_empty(&self) -> bool { self.by_alias.is_empty() }
}
