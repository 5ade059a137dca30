//! In-process property table implementing `TelemetryBuilder`.
//!
//! Components register named getters (and optional setters); a caller can then
//! snapshot every value or write back to the writable ones by key.

use std::collections::BTreeMap;

use rangeloop_traits::{Getter, Setter, TelemetryBuilder};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    F64(f64),
}

enum Property {
    Bool(Getter<bool>, Option<Setter<bool>>),
    F64(Getter<f64>, Option<Setter<f64>>),
}

#[derive(Default)]
pub struct PropertyTable {
    kind: Option<String>,
    props: BTreeMap<String, Property>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.props.get(key).map(|p| match p {
            Property::Bool(g, _) => PropertyValue::Bool(g()),
            Property::F64(g, _) => PropertyValue::F64(g()),
        })
    }

    pub fn is_writable(&self, key: &str) -> bool {
        matches!(
            self.props.get(key),
            Some(Property::Bool(_, Some(_)) | Property::F64(_, Some(_)))
        )
    }

    /// Write a value; returns false if the key is unknown, read-only, or of another type.
    pub fn set(&self, key: &str, value: PropertyValue) -> bool {
        match (self.props.get(key), value) {
            (Some(Property::Bool(_, Some(s))), PropertyValue::Bool(v)) => {
                s(v);
                true
            }
            (Some(Property::F64(_, Some(s))), PropertyValue::F64(v)) => {
                s(v);
                true
            }
            _ => false,
        }
    }

    /// Current value of every property, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        self.props
            .keys()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }
}

impl TelemetryBuilder for PropertyTable {
    fn set_kind(&mut self, kind: &str) {
        self.kind = Some(kind.to_owned());
    }

    fn add_bool_property(&mut self, key: &str, getter: Getter<bool>, setter: Option<Setter<bool>>) {
        self.props
            .insert(key.to_owned(), Property::Bool(getter, setter));
    }

    fn add_f64_property(&mut self, key: &str, getter: Getter<f64>, setter: Option<Setter<f64>>) {
        self.props.insert(key.to_owned(), Property::F64(getter, setter));
    }
}
