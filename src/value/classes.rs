use crate::heap::{ClassId, ClosureId, Heap, StringId};

use rustc_hash::FxHashMap as HashMap;

use super::Value;

/// A user defined class.
///
/// Stores its name and the methods defined on it. Inheritance copies the
/// superclass methods into the subclass table before the subclass defines
/// its own, so overrides simply overwrite the inherited entry.
#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) name: StringId,
    pub(crate) methods: HashMap<StringId, ClosureId>,
}

impl Class {
    #[must_use]
    pub(crate) fn new(name: StringId) -> Self {
        Self {
            name,
            methods: HashMap::default(),
        }
    }

    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        self.name.to_value(heap).clone()
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<class Value>")
    }
}

impl PartialEq for Class {
    fn eq(&self, _other: &Self) -> bool {
        // Two different classes are always considered different
        false
    }
}

/// An instance of a class with its own set of fields.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) class: ClassId,
    pub(crate) fields: HashMap<StringId, Value>,
}

impl Instance {
    #[must_use]
    pub(crate) fn new(class: ClassId) -> Self {
        Self {
            class,
            fields: HashMap::default(),
        }
    }

    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        format!("{} instance", self.class.to_value(heap).name.to_value(heap))
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<instance Value>")
    }
}

impl PartialEq for Instance {
    fn eq(&self, _other: &Self) -> bool {
        // Two different instances are always considered different
        false
    }
}

/// A method bound to the instance it was read from.
///
/// Created transiently whenever a method is accessed as a property so
/// that it can be called (or stored) later with `this` already attached.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) method: ClosureId,
}

impl BoundMethod {
    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        self.method
            .to_value(heap)
            .function
            .to_value(heap)
            .to_string(heap)
    }
}

impl PartialEq for BoundMethod {
    fn eq(&self, _other: &Self) -> bool {
        // Two different bound methods are always considered different
        false
    }
}

impl std::fmt::Display for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<bound method Value>")
    }
}
