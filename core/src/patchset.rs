use patchwork_proto::{Membership, ModelPatch, Properties, PropertyValue, Uid, Verb};
use tracing::{debug, trace};

use crate::{
    error::PatchError,
    registry::{AliasRegistry, ModelType},
    tracking::{ChangeTracked, PropertyDelta},
};

/// An ordered, append-only list of patches describing one unit of work.
///
/// Patches appear in walk order: a model's own patch always precedes the patches of its aggregate members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchSet {
    patches: Vec<ModelPatch>,
}

impl PatchSet {
    pub fn new() -> Self { Self::default() }

    /// Walk a tracked model graph and append the patches it produces.
    ///
    /// Nothing is appended if the walk fails.
    pub fn add(&mut self, aliases: &AliasRegistry, model: &dyn ChangeTracked) -> Result<&mut Self, PatchError> {
        let mut walker = Walker { aliases, path: Vec::new(), patches: Vec::new() };
        walker.handle_object(None, model)?;

        let walked = walker.patches.len();
        let before = self.patches.len();
        self.patches.extend(walker.patches.into_iter().filter(|patch| !patch.is_noop()));
        debug!("PatchSet.add {} {:#}: kept {} of {} patches", model.model_type(), model.uid(), self.patches.len() - before, walked);
        Ok(self)
    }

    pub fn add_many<'a, M, I>(&mut self, aliases: &AliasRegistry, models: I) -> Result<&mut Self, PatchError>
    where
        M: ChangeTracked + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        for model in models {
            self.add(aliases, model)?;
        }
        Ok(self)
    }

    /// Append already-built patches, e.g. ones received over the wire.
    pub fn extend(&mut self, patches: impl IntoIterator<Item = ModelPatch>) { self.patches.extend(patches) }

    /// The patches to apply: everything except no-ops.
    pub fn get_patches(&self) -> impl Iterator<Item = &ModelPatch> + '_ { self.patches.iter().filter(|patch| !patch.is_noop()) }

    /// Every stored patch, unfiltered.
    pub fn iter(&self) -> std::slice::Iter<'_, ModelPatch> { self.patches.iter() }

    pub fn len(&self) -> usize { self.patches.len() }

    pub fn is_empty(&self) -> bool { self.patches.is_empty() }

    pub fn into_patches(self) -> Vec<ModelPatch> { self.patches }

    pub fn to_json(&self) -> Result<String, PatchError> { Ok(ModelPatch::to_json(&self.patches)?) }

    pub fn to_json_pretty(&self) -> Result<String, PatchError> {
        serde_json::to_string_pretty(&self.patches).map_err(|e| PatchError::Decode(e.into()))
    }

    pub fn from_json_many(json: &str) -> Result<Self, PatchError> { Ok(Self { patches: ModelPatch::from_json_many(json)? }) }
}

impl From<Vec<ModelPatch>> for PatchSet {
    fn from(patches: Vec<ModelPatch>) -> Self { Self { patches } }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a ModelPatch;
    type IntoIter = std::slice::Iter<'a, ModelPatch>;
    fn into_iter(self) -> Self::IntoIter { self.patches.iter() }
}

struct Walker<'r> {
    aliases: &'r AliasRegistry,
    /// Models on the current aggregate path, for cycle detection.
    path: Vec<(ModelType, Uid)>,
    patches: Vec<ModelPatch>,
}

impl Walker<'_> {
    fn alias(&self, model: ModelType) -> Result<String, PatchError> {
        self.aliases.alias_of(&model).map(str::to_owned).ok_or(PatchError::UnregisteredType(model))
    }

    fn handle_object(&mut self, membership: Option<&Membership>, model: &dyn ChangeTracked) -> Result<(), PatchError> {
        let model_type = model.model_type();
        let uid = model.uid().clone();
        if self.path.iter().any(|(t, u)| *t == model_type && *u == uid) {
            return Err(PatchError::Cycle { model: model_type, uid });
        }

        let alias = self.alias(model_type)?;
        let verb = model.state().verb();
        let mut patch = ModelPatch::new(verb, alias.clone(), uid.clone());
        if let Some(membership) = membership {
            patch = patch.with_membership(membership.clone());
        }

        // a delete removes the whole entity, its properties don't matter
        if verb == Verb::Delete {
            trace!("walk {patch}");
            self.patches.push(patch);
            return Ok(());
        }

        let mut properties = Properties::new();
        let mut aggregates = Vec::new();
        for delta in model.delta() {
            match delta {
                PropertyDelta::Value { name, current } => {
                    properties.insert(name, PropertyValue::Scalar(current));
                }
                PropertyDelta::Reference { name, current: Some(target), .. } => {
                    properties.insert(name, PropertyValue::reference(self.alias(target.model)?, target.uid));
                }
                PropertyDelta::Reference { name, original: Some(previous), current: None } => {
                    properties.insert(name, PropertyValue::cleared(self.alias(previous.model)?));
                }
                PropertyDelta::Reference { original: None, current: None, .. } => {}
                PropertyDelta::Aggregate { name, members } => aggregates.push((name, members)),
            }
        }

        let patch = patch.with_properties(properties);
        trace!("walk {patch}");
        self.patches.push(patch);

        self.path.push((model_type, uid.clone()));
        for (name, members) in aggregates {
            self.handle_collection(&Membership::new(alias.clone(), uid.clone(), name), members)?;
        }
        self.path.pop();
        Ok(())
    }

    fn handle_collection(&mut self, membership: &Membership, members: Vec<&dyn ChangeTracked>) -> Result<(), PatchError> {
        for member in members {
            if member.state().is_independently_modified() {
                // the member changed on its own, the edge to this parent did not
                self.handle_object(None, member)?;
            } else {
                self.handle_object(Some(membership), member)?;
            }
        }
        Ok(())
    }
}
