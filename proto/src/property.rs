use std::collections::{btree_map, BTreeMap};

use serde::{
    de,
    ser::{self, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;

use crate::{error::DecodeError, uid::Uid};

/// Separates the target alias from the property name in a reference key (`"person:Employer"`).
pub const REFERENCE_SEPARATOR: char = ':';

/// A single value in a patch's property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Value),
    /// Points at another model instance by alias and uid. `uid: None` clears the reference.
    Reference { model: String, uid: Option<Uid> },
}

impl PropertyValue {
    pub fn scalar(value: impl Into<Value>) -> Self { PropertyValue::Scalar(value.into()) }

    pub fn reference(model: impl Into<String>, uid: impl Into<Uid>) -> Self {
        let uid = uid.into();
        PropertyValue::Reference { model: model.into(), uid: (!uid.is_empty()).then_some(uid) }
    }

    pub fn cleared(model: impl Into<String>) -> Self { PropertyValue::Reference { model: model.into(), uid: None } }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            PropertyValue::Scalar(value) => Some(value),
            PropertyValue::Reference { .. } => None,
        }
    }

    pub fn is_reference(&self) -> bool { matches!(self, PropertyValue::Reference { .. }) }
}

pub fn reference_key(model: &str, property: &str) -> String { format!("{model}{REFERENCE_SEPARATOR}{property}") }

/// Splits `"alias:property"` into its parts. Plain property names yield `None`.
pub fn parse_reference_key(key: &str) -> Option<(&str, &str)> { key.split_once(REFERENCE_SEPARATOR) }

/// The property bag of a patch, keyed by plain property name.
///
/// On the wire references are folded into the key (`"person:Employer": "<uid>"`, with `""` meaning
/// "clear"); in memory they are a distinct [`PropertyValue::Reference`] variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self { Self(BTreeMap::new()) }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> { self.0.insert(name.into(), value) }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> { self.0.get(name) }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> { self.0.remove(name) }

    pub fn contains(&self, name: &str) -> bool { self.0.contains_key(name) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PropertyValue> { self.0.iter() }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    /// Rebuild a property bag from its wire form.
    pub fn from_wire<I>(entries: I) -> Result<Self, DecodeError>
    where I: IntoIterator<Item = (String, Value)> {
        let mut properties = Properties::new();
        for (key, value) in entries {
            match parse_reference_key(&key) {
                Some((model, name)) => {
                    if model.is_empty() || name.is_empty() {
                        return Err(DecodeError::InvalidReferenceKey(key));
                    }
                    let Value::String(uid) = value else {
                        return Err(DecodeError::NotStringValue { key });
                    };
                    if properties.insert(name, PropertyValue::reference(model, uid)).is_some() {
                        return Err(DecodeError::DuplicateProperty(name.to_owned()));
                    }
                }
                None => {
                    if properties.contains(&key) {
                        return Err(DecodeError::DuplicateProperty(key));
                    }
                    properties.insert(key, PropertyValue::Scalar(value));
                }
            }
        }
        Ok(properties)
    }

    /// The wire form: scalars under their own name, references under `"alias:name"`.
    pub fn to_wire(&self) -> Result<BTreeMap<String, Value>, DecodeError> {
        let mut wire = BTreeMap::new();
        for (name, value) in &self.0 {
            match value {
                PropertyValue::Scalar(value) => {
                    if name.contains(REFERENCE_SEPARATOR) {
                        return Err(DecodeError::InvalidReferenceKey(name.clone()));
                    }
                    wire.insert(name.clone(), value.clone());
                }
                PropertyValue::Reference { model, uid } => {
                    if model.contains(REFERENCE_SEPARATOR) || name.contains(REFERENCE_SEPARATOR) {
                        return Err(DecodeError::InvalidReferenceKey(reference_key(model, name)));
                    }
                    let uid = uid.as_ref().map(|uid| uid.as_str().to_owned()).unwrap_or_default();
                    wire.insert(reference_key(model, name), Value::String(uid));
                }
            }
        }
        Ok(wire)
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = self.to_wire().map_err(ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(wire.len()))?;
        for (key, value) in &wire {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Properties::from_wire(wire).map_err(de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a PropertyValue);
    type IntoIter = btree_map::Iter<'a, String, PropertyValue>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl IntoIterator for Properties {
    type Item = (String, PropertyValue);
    type IntoIter = btree_map::IntoIter<String, PropertyValue>;
    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, PropertyValue)>>(iter: T) -> Self {
        Properties(iter.into_iter().map(|(name, value)| (name.into(), value)).collect())
    }
}
