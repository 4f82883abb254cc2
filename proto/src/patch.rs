use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::DecodeError,
    property::{Properties, PropertyValue},
    uid::Uid,
};

/// What a patch does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Verb {
    Unmodified,
    Create,
    #[default]
    Update,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Unmodified => write!(f, "Unmodified"),
            Verb::Create => write!(f, "Create"),
            Verb::Update => write!(f, "Update"),
            Verb::Delete => write!(f, "Delete"),
        }
    }
}

/// The aggregate edge a patch target belongs to: parent alias, parent uid and the collection property on the parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub model: String,
    pub uid: Uid,
    pub property: String,
}

impl Membership {
    pub fn new(model: impl Into<String>, uid: impl Into<Uid>, property: impl Into<String>) -> Self {
        Self { model: model.into(), uid: uid.into(), property: property.into() }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}/{:#}.{}", self.model, self.uid, self.property) }
}

/// One atomic change to a single model instance.
///
/// A patch carries no link back to the object it was built from, so it can be serialized and applied in
/// another process. Properties are only kept for `Create` and `Update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPatch {
    #[serde(default)]
    verb: Verb,
    model: String,
    uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    membership: Option<Membership>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    properties: Properties,
}

impl ModelPatch {
    pub fn new(verb: Verb, model: impl Into<String>, uid: impl Into<Uid>) -> Self {
        Self { verb, model: model.into(), uid: uid.into(), membership: None, properties: Properties::new() }
    }

    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Add a property. Ignored unless the verb is `Create` or `Update`.
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        if self.carries_properties() {
            self.properties.insert(name, value);
        }
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        if self.carries_properties() {
            self.properties = properties;
        }
        self
    }

    pub fn verb(&self) -> Verb { self.verb }

    pub fn model(&self) -> &str { &self.model }

    pub fn uid(&self) -> &Uid { &self.uid }

    pub fn membership(&self) -> Option<&Membership> { self.membership.as_ref() }

    pub fn properties(&self) -> &Properties { &self.properties }

    pub fn is_member(&self) -> bool { self.membership.is_some() }

    /// A patch that would change nothing if applied.
    pub fn is_noop(&self) -> bool {
        match self.verb {
            Verb::Unmodified => true,
            Verb::Create | Verb::Update => self.properties.is_empty(),
            Verb::Delete => false,
        }
    }

    fn carries_properties(&self) -> bool { matches!(self.verb, Verb::Create | Verb::Update) }

    pub fn to_json(patches: &[ModelPatch]) -> Result<String, DecodeError> { Ok(serde_json::to_string(patches)?) }

    pub fn from_json_many(json: &str) -> Result<Vec<ModelPatch>, DecodeError> { Ok(serde_json::from_str(json)?) }
}

impl fmt::Display for ModelPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{:#}", self.verb, self.model, self.uid)?;
        if let Some(membership) = &self.membership {
            write!(f, " in {membership}")?;
        }
        if !self.properties.is_empty() {
            write!(f, " [{}]", self.properties.names().collect::<Vec<_>>().join(", "))?;
        }
        Ok(())
    }
}
