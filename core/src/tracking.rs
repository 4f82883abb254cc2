//! The change-tracking capability consumed by [`crate::patchset::PatchSet`], plus a small toolkit for
//! implementing it on plain structs.
//!
//! A tracked model reports three things: its lifecycle state (added / modified / removed), its uid, and
//! a delta listing every property whose current value differs from the originally loaded one.

use patchwork_proto::{Uid, Verb};
use serde_json::Value;

use crate::registry::ModelType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelState {
    pub added: bool,
    pub modified: bool,
    pub removed: bool,
}

impl ModelState {
    pub fn verb(&self) -> Verb {
        if self.added {
            Verb::Create
        } else if self.removed {
            Verb::Delete
        } else if self.modified {
            Verb::Update
        } else {
            Verb::Unmodified
        }
    }

    /// Modified without being added or removed, i.e. the change is not about aggregate membership.
    pub fn is_independently_modified(&self) -> bool { self.modified && !self.added && !self.removed }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedReference {
    pub model: ModelType,
    pub uid: Uid,
}

impl TrackedReference {
    pub fn new(model: ModelType, uid: impl Into<Uid>) -> Self { Self { model, uid: uid.into() } }

    pub fn to<T: 'static>(uid: impl Into<Uid>) -> Self { Self::new(ModelType::of::<T>(), uid) }
}

/// One changed property of a tracked model.
pub enum PropertyDelta<'a> {
    Value { name: &'a str, current: Value },
    Reference { name: &'a str, original: Option<TrackedReference>, current: Option<TrackedReference> },
    /// An aggregate collection, carrying only the members that changed.
    Aggregate { name: &'a str, members: Vec<&'a dyn ChangeTracked> },
}

impl PropertyDelta<'_> {
    pub fn name(&self) -> &str {
        match self {
            PropertyDelta::Value { name, .. } | PropertyDelta::Reference { name, .. } | PropertyDelta::Aggregate { name, .. } => name,
        }
    }
}

pub trait ChangeTracked: Send + Sync {
    fn model_type(&self) -> ModelType;

    fn uid(&self) -> &Uid;

    fn state(&self) -> ModelState;

    fn delta(&self) -> Vec<PropertyDelta<'_>>;
}

/// A tracked model that can live inside a [`TrackedAggregate`].
pub trait AggregateMember: ChangeTracked {
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// Make the current values the new baseline.
    fn accept_changes(&mut self);
}

/// Added / removed flags of a tracked model. "Modified" is derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    added: bool,
    removed: bool,
}

impl Lifecycle {
    /// State of a model loaded from storage.
    pub fn loaded() -> Self { Self::default() }

    /// State of a model that does not exist in storage yet.
    pub fn added() -> Self { Self { added: true, removed: false } }

    pub fn mark_added(&mut self) { self.added = true }

    pub fn mark_removed(&mut self) { self.removed = true }

    pub fn is_added(&self) -> bool { self.added }

    pub fn is_removed(&self) -> bool { self.removed }

    pub fn state(&self, modified: bool) -> ModelState { ModelState { added: self.added, modified, removed: self.removed } }

    pub fn accept_changes(&mut self) { self.added = false }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<V> {
    original: V,
    current: V,
}

impl<V: Clone + PartialEq> Tracked<V> {
    pub fn new(value: V) -> Self { Self { original: value.clone(), current: value } }

    pub fn get(&self) -> &V { &self.current }

    pub fn original(&self) -> &V { &self.original }

    pub fn set(&mut self, value: V) { self.current = value }

    pub fn is_changed(&self) -> bool { self.original != self.current }

    pub fn accept_changes(&mut self) { self.original = self.current.clone() }

    pub fn revert(&mut self) { self.current = self.original.clone() }
}

impl<V: Clone + PartialEq + Into<Value>> Tracked<V> {
    pub fn push_delta<'a>(&self, name: &'a str, delta: &mut Vec<PropertyDelta<'a>>) {
        if self.is_changed() {
            delta.push(PropertyDelta::Value { name, current: self.current.clone().into() });
        }
    }
}

impl<V: Default + Clone + PartialEq> Default for Tracked<V> {
    fn default() -> Self { Self::new(V::default()) }
}

/// A tracked single-valued reference to another model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackedRef {
    original: Option<TrackedReference>,
    current: Option<TrackedReference>,
}

impl TrackedRef {
    pub fn new(value: Option<TrackedReference>) -> Self { Self { original: value.clone(), current: value } }

    pub fn get(&self) -> Option<&TrackedReference> { self.current.as_ref() }

    pub fn set(&mut self, value: Option<TrackedReference>) { self.current = value }

    pub fn point_to<T: 'static>(&mut self, uid: impl Into<Uid>) { self.current = Some(TrackedReference::to::<T>(uid)) }

    pub fn clear(&mut self) { self.current = None }

    pub fn is_changed(&self) -> bool { self.original != self.current }

    pub fn accept_changes(&mut self) { self.original = self.current.clone() }

    pub fn push_delta<'a>(&self, name: &'a str, delta: &mut Vec<PropertyDelta<'a>>) {
        if self.is_changed() {
            delta.push(PropertyDelta::Reference { name, original: self.original.clone(), current: self.current.clone() });
        }
    }
}

/// A tracked aggregate collection. Removed members are kept until changes are accepted so that their
/// deletion can still be reported.
#[derive(Debug, Clone)]
pub struct TrackedAggregate<M> {
    members: Vec<M>,
    removed: Vec<M>,
}

impl<M> Default for TrackedAggregate<M> {
    fn default() -> Self { Self { members: Vec::new(), removed: Vec::new() } }
}

impl<M: AggregateMember> TrackedAggregate<M> {
    pub fn new(members: Vec<M>) -> Self { Self { members, removed: Vec::new() } }

    pub fn members(&self) -> &[M] { &self.members }

    pub fn iter(&self) -> std::slice::Iter<'_, M> { self.members.iter() }

    pub fn len(&self) -> usize { self.members.len() }

    pub fn is_empty(&self) -> bool { self.members.is_empty() }

    pub fn get_mut(&mut self, uid: &Uid) -> Option<&mut M> { self.members.iter_mut().find(|member| member.uid() == uid) }

    pub fn push(&mut self, mut member: M) {
        member.lifecycle_mut().mark_added();
        self.members.push(member);
    }

    /// Remove a member. A member that was added and never persisted simply disappears.
    pub fn remove(&mut self, uid: &Uid) -> Option<&M> {
        let index = self.members.iter().position(|member| member.uid() == uid)?;
        let mut member = self.members.remove(index);
        if member.state().added {
            return None;
        }
        member.lifecycle_mut().mark_removed();
        self.removed.push(member);
        self.removed.last()
    }

    /// Members that were added, removed or modified since the last accepted state.
    pub fn delta_members(&self) -> Vec<&dyn ChangeTracked> {
        let changed = self.members.iter().filter(|member| {
            let state = member.state();
            state.added || state.modified
        });
        changed.chain(self.removed.iter()).map(|member| member as &dyn ChangeTracked).collect()
    }

    pub fn is_changed(&self) -> bool {
        !self.removed.is_empty() || self.members.iter().any(|member| member.state() != ModelState::default())
    }

    pub fn push_delta<'a>(&'a self, name: &'a str, delta: &mut Vec<PropertyDelta<'a>>) {
        if self.is_changed() {
            delta.push(PropertyDelta::Aggregate { name, members: self.delta_members() });
        }
    }

    pub fn accept_changes(&mut self) {
        self.removed.clear();
        for member in &mut self.members {
            member.accept_changes();
        }
    }
}
