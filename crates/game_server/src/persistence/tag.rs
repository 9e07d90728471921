//! Tag compounds used by per-entity persistence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed value inside a [`Compound`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(Vec<Tag>),
    Compound(Compound),
}

/// Named, typed values. Keys are kept sorted so saved output is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compound(BTreeMap<String, Tag>);

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn put(&mut self, key: impl Into<String>, tag: Tag) {
        self.0.insert(key.into(), tag);
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i32) {
        self.put(key, Tag::Int(value));
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, Tag::String(value.into()));
    }

    pub fn is_int(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Tag::Int(_)))
    }

    pub fn is_string(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Tag::String(_)))
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.0.get(key) {
            Some(Tag::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Tag::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
