use std::{collections::HashMap, fmt};

use crate::{
    entity::{Entity, EntityHandle},
    error::AggregateError,
    registry::ModelType,
};

/// A collection on a parent entity whose membership is changed by explicit add/remove operations.
pub trait AggregateCollection: Send + Sync {
    /// Returns false if the member was already present.
    fn add_member(&mut self, member: &EntityHandle) -> Result<bool, AggregateError>;

    /// Returns false if the member was not present.
    fn remove_member(&mut self, member: &EntityHandle) -> Result<bool, AggregateError>;
}

/// Reaches into a type-erased parent entity and hands back one of its aggregate collections.
pub trait AggregateAccessor: Send + Sync {
    fn collection<'a>(&self, parent: &'a mut EntityHandle) -> Option<&'a mut dyn AggregateCollection>;
}

struct FieldAccessor<P, C> {
    field: fn(&mut P) -> &mut C,
}

impl<P: Entity, C: AggregateCollection + 'static> AggregateAccessor for FieldAccessor<P, C> {
    fn collection<'a>(&self, parent: &'a mut EntityHandle) -> Option<&'a mut dyn AggregateCollection> {
        let parent = parent.downcast_mut::<P>()?;
        let collection: &'a mut dyn AggregateCollection = (self.field)(parent);
        Some(collection)
    }
}

/// Static table of aggregate collections, keyed by parent type and property name.
///
/// Built once at startup; the resolver only ever reads it.
#[derive(Default)]
pub struct Schema {
    aggregates: HashMap<ModelType, HashMap<String, Box<dyn AggregateAccessor>>>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    /// Builder form of [`Schema::register_aggregate`].
    pub fn aggregate<P, C>(mut self, property: impl Into<String>, field: fn(&mut P) -> &mut C) -> Self
    where
        P: Entity,
        C: AggregateCollection + 'static,
    {
        self.register_aggregate(property, field);
        self
    }

    pub fn register_aggregate<P, C>(&mut self, property: impl Into<String>, field: fn(&mut P) -> &mut C) -> &mut Self
    where
        P: Entity,
        C: AggregateCollection + 'static,
    {
        self.register_accessor(ModelType::of::<P>(), property, Box::new(FieldAccessor { field }))
    }

    pub fn register_accessor(&mut self, parent: ModelType, property: impl Into<String>, accessor: Box<dyn AggregateAccessor>) -> &mut Self {
        self.aggregates.entry(parent).or_default().insert(property.into(), accessor);
        self
    }

    pub fn accessor(&self, parent: ModelType, property: &str) -> Option<&dyn AggregateAccessor> {
        self.aggregates.get(&parent)?.get(property).map(|accessor| accessor.as_ref())
    }

    pub fn is_aggregate(&self, parent: ModelType, property: &str) -> bool { self.accessor(parent, property).is_some() }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (model, properties) in &self.aggregates {
            for property in properties.keys() {
                list.entry(&format_args!("{model}.{property}"));
            }
        }
        list.finish()
    }
}
