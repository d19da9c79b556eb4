//! Host-provided value types.
//!
//! An extension registers one prototype instance per type. The prototype is
//! exported from a module named after [`CustomType::module`], so scripts
//! write `import complex; c = new complex.Complex(1, 2)` or, after an
//! inline import, `new Complex(1, 2)`.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use thiserror::Error;

use crate::value::Value;

/// Failures reported by extensions and by their registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("{tag} cannot be constructed from these arguments: {reason}")]
    InvalidArguments { tag: String, reason: String },
    #[error("{tag} has no method {method}")]
    UnknownMethod { tag: String, method: String },
    #[error("a custom type with tag {0} is already registered")]
    DuplicateTag(String),
    #[error("{0}")]
    Failed(String),
}

/// A value type implemented by the host.
///
/// Only `tag`, `construct`, `display` and `as_any` are required; the other
/// hooks default to the behaviour of an opaque value. Instances are shared,
/// so implementations that mutate state use interior mutability.
pub trait CustomType {
    /// Type name, shown as the value's type and used as the export name.
    fn tag(&self) -> &str;

    /// Module the type is exported from. Defaults to the lowercase tag.
    fn module(&self) -> String {
        self.tag().to_lowercase()
    }

    fn construct(&self, args: &[Value]) -> Result<Rc<dyn CustomType>, ExtensionError>;

    fn methods(&self) -> Vec<String> {
        Vec::new()
    }

    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, ExtensionError> {
        Err(ExtensionError::UnknownMethod {
            tag: self.tag().to_string(),
            method: method.to_string(),
        })
    }

    fn numeric(&self) -> Option<BigDecimal> {
        None
    }

    fn truthy(&self) -> bool {
        true
    }

    fn size(&self) -> usize {
        1
    }

    fn get(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Store `value` under `key`; returns whether the type accepts members.
    fn set(&self, _key: &Value, _value: Value) -> bool {
        false
    }

    fn display(&self) -> String;

    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }

    fn compare(&self, _other: &dyn CustomType) -> Option<Ordering> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tag(), self.display())
    }
}

/// Registered custom types, keyed by tag.
#[derive(Default)]
pub struct TypeRegistry {
    types: IndexMap<String, Rc<dyn CustomType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prototype: Rc<dyn CustomType>) -> Result<(), ExtensionError> {
        let tag = prototype.tag().to_string();
        if self.types.contains_key(&tag) {
            return Err(ExtensionError::DuplicateTag(tag));
        }
        self.types.insert(tag, prototype);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<Rc<dyn CustomType>> {
        self.types.get(tag).cloned()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    impl CustomType for Marker {
        fn tag(&self) -> &str {
            "Marker"
        }

        fn construct(&self, _args: &[Value]) -> Result<Rc<dyn CustomType>, ExtensionError> {
            Ok(Rc::new(Marker))
        }

        fn display(&self) -> String {
            "marker".to_string()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_register_rejects_duplicate_tags() {
        let mut registry = TypeRegistry::new();
        registry.register(Rc::new(Marker)).unwrap();
        assert_eq!(
            registry.register(Rc::new(Marker)),
            Err(ExtensionError::DuplicateTag("Marker".to_string()))
        );
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["Marker"]);
    }

    #[test]
    fn test_defaults() {
        let marker = Marker;
        assert_eq!(marker.module(), "marker");
        assert!(marker.truthy());
        assert_eq!(marker.size(), 1);
        assert!(marker.call("nope", &[]).is_err());
    }
}
