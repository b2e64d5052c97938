//! Entity kinds and their snapshot converters.
//!
//! Each entity kind is rendered into snapshot JSON by a converter looked
//! up by its kind tag. New kinds are supported by registering another
//! converter; nothing in the step loop needs to know the concrete types.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A world entity exposed by the engine.
pub trait Entity {
    /// Kind tag used to select a converter (e.g. `"foot-bot"`).
    fn kind(&self) -> &str;

    /// Identifier unique within the arena.
    fn id(&self) -> &str;

    /// Access to the concrete type for converters.
    fn as_any(&self) -> &dyn Any;
}

/// Failure to render one entity into snapshot JSON.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// No converter is registered for the entity's kind.
    #[error("no converter registered for entity kind '{kind}' (entity '{id}')")]
    Unregistered {
        /// The unknown kind tag.
        kind: String,
        /// The entity that could not be converted.
        id: String,
    },

    /// The converter for this kind expected a different concrete type.
    #[error("entity '{id}' is not a {expected}")]
    TypeMismatch {
        /// The entity that could not be converted.
        id: String,
        /// Type name the converter expected.
        expected: &'static str,
    },

    /// Serializing the entity failed.
    #[error("failed to serialize entity '{id}': {source}")]
    Serialize {
        /// The entity that could not be converted.
        id: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// A boxed entity-to-JSON conversion function.
pub type Converter = Box<dyn Fn(&dyn Entity) -> Result<Value, ConversionError> + Send + Sync>;

/// Lookup table from entity kind to converter.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `converter` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, converter: F) -> &mut Self
    where
        F: Fn(&dyn Entity) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.converters.insert(kind.into(), Box::new(converter));
        self
    }

    /// Register a serde-based converter for entities of concrete type `T`.
    ///
    /// The rendered object gains `type` and `id` keys when it does not
    /// already carry them.
    pub fn register_serialize<T>(&mut self, kind: impl Into<String>) -> &mut Self
    where
        T: Serialize + 'static,
    {
        self.register(kind, |entity: &dyn Entity| {
            let typed = entity.as_any().downcast_ref::<T>().ok_or_else(|| {
                ConversionError::TypeMismatch {
                    id: entity.id().to_owned(),
                    expected: std::any::type_name::<T>(),
                }
            })?;
            let mut value =
                serde_json::to_value(typed).map_err(|source| ConversionError::Serialize {
                    id: entity.id().to_owned(),
                    source,
                })?;
            if let Value::Object(map) = &mut value {
                map.entry("type")
                    .or_insert_with(|| Value::String(entity.kind().to_owned()));
                map.entry("id")
                    .or_insert_with(|| Value::String(entity.id().to_owned()));
            }
            Ok(value)
        })
    }

    /// Convert one entity using the converter registered for its kind.
    pub fn convert(&self, entity: &dyn Entity) -> Result<Value, ConversionError> {
        let converter =
            self.converters
                .get(entity.kind())
                .ok_or_else(|| ConversionError::Unregistered {
                    kind: entity.kind().to_owned(),
                    id: entity.id().to_owned(),
                })?;
        converter(entity)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Whether no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ConverterRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Box3 {
        #[serde(skip)]
        id: String,
        mass: f64,
    }

    impl Entity for Box3 {
        fn kind(&self) -> &str {
            "box"
        }
        fn id(&self) -> &str {
            &self.id
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Light {
        id: String,
    }

    impl Entity for Light {
        fn kind(&self) -> &str {
            "light"
        }
        fn id(&self) -> &str {
            &self.id
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn serialize_converter_adds_type_and_id() {
        let mut registry = ConverterRegistry::new();
        registry.register_serialize::<Box3>("box");
        let entity = Box3 {
            id: String::from("box_0"),
            mass: 2.5,
        };
        let json = registry.convert(&entity).unwrap();
        assert_eq!(json["type"], "box");
        assert_eq!(json["id"], "box_0");
        assert_eq!(json["mass"], 2.5);
    }

    #[test]
    fn unknown_kind_is_unregistered() {
        let registry = ConverterRegistry::new();
        let light = Light {
            id: String::from("l1"),
        };
        let err = registry.convert(&light).unwrap_err();
        assert!(matches!(err, ConversionError::Unregistered { ref kind, .. } if kind == "light"));
    }

    #[test]
    fn wrong_concrete_type_is_a_mismatch() {
        let mut registry = ConverterRegistry::new();
        registry.register_serialize::<Box3>("light");
        let light = Light {
            id: String::from("l1"),
        };
        let err = registry.convert(&light).unwrap_err();
        assert!(matches!(err, ConversionError::TypeMismatch { .. }));
    }

    #[test]
    fn custom_converter_replaces_previous() {
        let mut registry = ConverterRegistry::new();
        registry
            .register_serialize::<Box3>("box")
            .register("box", |e: &dyn Entity| {
                Ok(serde_json::json!({ "custom": e.id() }))
            });
        assert_eq!(registry.len(), 1);
        let entity = Box3 {
            id: String::from("b"),
            mass: 1.0,
        };
        assert_eq!(registry.convert(&entity).unwrap()["custom"], "b");
    }
}
