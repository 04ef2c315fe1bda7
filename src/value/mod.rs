//! Runtime representation of Lox values.

mod classes;
mod functions;
mod natives;

use crate::heap::{
    BoundMethodId, ClassId, ClosureId, FunctionId, Heap, InstanceId, NativeFunctionId, StringId,
    UpvalueId,
};
pub use classes::{BoundMethod, Class, Instance};
pub use functions::{Closure, Function, Upvalue};
pub use natives::{NativeFunction, NativeFunctionImpl};

/// Central enum for the types of runtime values that exist in Lox.
///
/// Simple values live directly in the enum, everything else is a typed
/// key into one of the heap's arenas.
///
/// Equality falls out of the derive: numbers compare as doubles (so
/// `NaN != NaN`), strings compare by their interned id, and every other
/// heap variant compares by identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Nil,

    Number(f64),

    String(StringId),

    Function(FunctionId),
    Closure(ClosureId),
    Upvalue(UpvalueId),

    NativeFunction(NativeFunctionId),

    Class(ClassId),
    Instance(InstanceId),
    BoundMethod(BoundMethodId),
}

impl Value {
    /// Only `nil` and `false` are falsey, everything else is truthy.
    pub(crate) const fn is_falsey(&self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    pub fn to_string(&self, heap: &Heap) -> String {
        match self {
            Self::Bool(bool) => format!("{bool}"),
            Self::Number(num) => format!("{num}"),
            Self::Nil => "nil".to_string(),
            Self::String(id) => id.to_value(heap).clone(),
            Self::Function(id) => id.to_value(heap).to_string(heap),
            Self::Closure(id) => id.to_value(heap).to_string(heap),
            Self::NativeFunction(id) => id.to_value(heap).to_string(heap),
            Self::Class(id) => id.to_value(heap).to_string(heap),
            Self::Instance(id) => id.to_value(heap).to_string(heap),
            Self::BoundMethod(id) => id.to_value(heap).to_string(heap),
            Self::Upvalue(id) => format!("{}", id.to_value(heap)),
        }
    }
}

impl Value {
    pub(crate) fn bound_method(receiver: Self, method: ClosureId, heap: &mut Heap) -> Self {
        heap.add_bound_method(BoundMethod { receiver, method })
    }
}

// Conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Number(f)
    }
}

impl From<StringId> for Value {
    fn from(s: StringId) -> Self {
        Self::String(s)
    }
}

impl From<FunctionId> for Value {
    fn from(f: FunctionId) -> Self {
        Self::Function(f)
    }
}

impl From<ClosureId> for Value {
    fn from(c: ClosureId) -> Self {
        Self::Closure(c)
    }
}

impl From<NativeFunctionId> for Value {
    fn from(n: NativeFunctionId) -> Self {
        Self::NativeFunction(n)
    }
}

impl From<UpvalueId> for Value {
    fn from(u: UpvalueId) -> Self {
        Self::Upvalue(u)
    }
}

impl From<ClassId> for Value {
    fn from(c: ClassId) -> Self {
        Self::Class(c)
    }
}

impl From<InstanceId> for Value {
    fn from(i: InstanceId) -> Self {
        Self::Instance(i)
    }
}

impl From<BoundMethodId> for Value {
    fn from(b: BoundMethodId) -> Self {
        Self::BoundMethod(b)
    }
}

// Retrieve the inner id
impl Value {
    pub(crate) fn as_string(&self) -> &StringId {
        match self {
            Self::String(id) => id,
            _ => unreachable!("Expected String, found `{:?}`", self),
        }
    }

    pub(crate) fn as_function(&self) -> &FunctionId {
        match self {
            Self::Function(id) => id,
            _ => unreachable!("Expected Function, found `{:?}`", self),
        }
    }

    pub(crate) fn as_closure(&self) -> &ClosureId {
        match self {
            Self::Closure(id) => id,
            _ => unreachable!("Expected Closure, found `{:?}`", self),
        }
    }

    pub(crate) fn as_class(&self) -> &ClassId {
        match self {
            Self::Class(id) => id,
            _ => unreachable!("Expected Class, found `{:?}`", self),
        }
    }

    pub(crate) fn upvalue_location(&self) -> &UpvalueId {
        match self {
            Self::Upvalue(id) => id,
            _ => unreachable!("Expected Upvalue, found `{:?}`", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn falsiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());

        let mut heap = Heap::new();
        let empty = heap.string_id(&"");
        assert!(!Value::String(empty).is_falsey());
    }

    #[test]
    fn number_equality_follows_ieee() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(0.0), Value::Nil);
    }

    #[test]
    fn number_formatting() {
        let heap = Heap::new();
        assert_eq!(Value::Number(7.0).to_string(&heap), "7");
        assert_eq!(Value::Number(2.5).to_string(&heap), "2.5");
        assert_eq!(Value::Nil.to_string(&heap), "nil");
        assert_eq!(Value::Bool(true).to_string(&heap), "true");
    }

    #[test]
    fn function_formatting() {
        let mut heap = Heap::new();
        let name = heap.string_id(&"wrapped");
        let function = heap.add_function(Function::new(0, name));
        assert_eq!(function.to_string(&heap), "<fn wrapped>");

        let script_name = heap.string_id(&crate::config::SCRIPT_NAME);
        let script = heap.add_function(Function::new(0, script_name));
        assert_eq!(script.to_string(&heap), "<script>");
    }
}
