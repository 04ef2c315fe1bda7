use crate::{
    heap::{Heap, StringId},
    vm::VM,
};

use derivative::Derivative;

use super::Value;

/// A function implemented directly in Rust and exposed to Lox code.
#[derive(Derivative)]
#[derivative(Debug, PartialEq, Clone)]
pub struct NativeFunction {
    pub(crate) name: StringId,
    pub(crate) arity: &'static [u8],

    #[derivative(
            Debug = "ignore",
            // Treat the implementation as always equal; we discriminate built-in functions by name
            PartialEq(compare_with = "always_equals"),
        )]
    pub(crate) fun: NativeFunctionImpl,
}

const fn always_equals<T>(_: &T, _: &T) -> bool {
    true
}

impl NativeFunction {
    pub(crate) fn to_string(&self, _heap: &Heap) -> String {
        "<native fn>".to_string()
    }
}

impl std::fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<native fn Value>")
    }
}

pub type NativeFunctionImpl = fn(&mut VM, &mut [&mut Value]) -> Result<Value, String>;
