//! Accessor traits implemented by the derive macros

use crate::value::{Value, ValueError};

use super::spec::{DtoDescriptor, EntityInfo};

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("{type_name} has no property `{name}`")]
    Unknown { type_name: &'static str, name: String },

    #[error("Cannot convert value for `{name}`: {source}")]
    Conversion {
        name: String,
        #[source]
        source: ValueError,
    },
}

impl PropertyError {
    pub fn unknown(type_name: &'static str, name: &str) -> Self {
        PropertyError::Unknown {
            type_name,
            name: name.to_string(),
        }
    }

    pub fn conversion(name: &str, source: ValueError) -> Self {
        PropertyError::Conversion {
            name: name.to_string(),
            source,
        }
    }
}

/// Generic property access by field name.
///
/// Implemented by `#[derive(Properties)]`.
pub trait Properties {
    fn get_property(&self, name: &str) -> Result<Value, PropertyError>;

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError>;

    fn property_names() -> &'static [&'static str]
    where
        Self: Sized;
}

/// Read a property, logging and swallowing failures.
pub fn read_property<P: Properties + ?Sized>(target: &P, name: &str) -> Option<Value> {
    match target.get_property(name) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(property = %name, error = %e, "Property read failed");
            None
        }
    }
}

/// Write a property, logging and swallowing failures. Returns whether the write happened.
pub fn write_property<P: Properties + ?Sized>(target: &mut P, name: &str, value: Value) -> bool {
    match target.set_property(name, value) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(property = %name, error = %e, "Property write failed");
            false
        }
    }
}

/// A persistent entity type. Implemented by `#[derive(Entity)]`.
pub trait Entity {
    fn entity_info() -> EntityInfo;
}

/// A transfer object whose fields compile into query conditions.
///
/// Implemented by `#[derive(QueryDto)]`.
pub trait QueryDto: 'static {
    fn describe() -> DtoDescriptor;

    /// Field accessor table. Falls back to the declared getter when the
    /// stored value is empty.
    fn read_field(&self, name: &str) -> Result<Value, PropertyError>;
}
