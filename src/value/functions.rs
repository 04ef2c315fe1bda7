use crate::{
    chunk::Chunk,
    config::SCRIPT_NAME,
    heap::{FunctionId, Heap, StringId, UpvalueId},
};

use super::Value;

/// Closures are wrappers around runnable code.
///
/// They contain a reference to the actual function they wrap
/// as well as the captured upvalues and their count.
#[derive(Debug, Clone)]
pub struct Closure {
    pub(crate) function: FunctionId,
    pub(crate) upvalues: Vec<UpvalueId>,
    pub(crate) upvalue_count: usize,
}

impl Closure {
    pub(crate) fn new(function: FunctionId, heap: &Heap) -> Self {
        let upvalue_count = function.to_value(heap).upvalue_count;
        Self {
            function,
            upvalues: Vec::with_capacity(upvalue_count),
            upvalue_count,
        }
    }

    pub(super) fn to_string(&self, heap: &Heap) -> String {
        self.function.to_value(heap).to_string(heap)
    }
}

impl PartialEq for Closure {
    fn eq(&self, _other: &Self) -> bool {
        // Two different closures are always considered different, even if they close over exactly the same things
        false
    }
}

impl std::fmt::Display for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<Closure Value>")
    }
}

/// Object for actual function implementations.
///
/// Contains the name, number of expected arguments and number of
/// captured upvalues.
///
/// Additionally holds the chunk of compiled bytecode.
#[derive(Debug, Eq, Clone)]
pub struct Function {
    pub(crate) arity: usize,
    pub(crate) chunk: Chunk,
    pub(crate) name: StringId,
    pub(crate) upvalue_count: usize,
}

impl Function {
    #[must_use]
    pub(crate) fn new(arity: usize, name: StringId) -> Self {
        Self {
            arity,
            name,
            chunk: Chunk::new(name),
            upvalue_count: 0,
        }
    }

    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        let name = self.name.to_value(heap);
        if name == SCRIPT_NAME {
            SCRIPT_NAME.to_string()
        } else {
            format!("<fn {name}>")
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("<fn Value>")
    }
}

impl PartialEq for Function {
    fn eq(&self, _other: &Self) -> bool {
        // Two different functions are always considered different
        false
    }
}

/// Uncaptured (open) upvalues point to the stack index of the value,
/// while captured upvalues hold the value itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

impl Upvalue {
    pub(crate) fn as_open(&self) -> usize {
        match self {
            Self::Open(n) => *n,
            Self::Closed(_) => unreachable!("Only call as_open on a known open upvalue!"),
        }
    }
}

impl std::fmt::Display for Upvalue {
    /// Upvalues are implementation details and should never be seen by the user.
    /// So this is only used for debugging.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("upvalue")
    }
}
