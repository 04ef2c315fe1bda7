//! The vm module contains the main struct for the virtual machine and heart of the interpreter.
//!
//! The VM orchestrates the scanning to tokens, parsing of the tokens and creation of bytecode,
//! as well as the actual execution of the bytecode.

#[macro_use]
mod runtime_error;
#[macro_use]
mod arithmetics;
#[macro_use]
mod run_instruction;
mod bytecode;
mod callstack;
mod functions;
mod garbage_collection;
mod stack;
mod variables;

#[cfg(test)]
mod tests;

use callstack::CallStack;

use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;

#[cfg(feature = "trace_execution")]
use crate::chunk::InstructionDisassembler;
use crate::natives;
use crate::{
    chunk::{CodeOffset, OpCode},
    compiler::Compiler,
    config,
    heap::{Heap, StringId, UpvalueId},
    scanner::Scanner,
    value::{Class, Closure, Function, Upvalue, Value},
};

#[derive(Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Marker for a runtime error that has already been reported.
///
/// The error message and stack trace are printed at the site that
/// detects the problem; this type only propagates the failure
/// up to the dispatch loop.
#[derive(Debug)]
pub(super) struct RuntimeError;

/// The main struct for the virtual machine and heart of the interpreter.
///
/// Contains the heap, stack, callstack, globals and open upvalues.
pub struct VM {
    pub(super) heap: Heap,
    pub(super) stack: Vec<Value>,
    callstack: CallStack,
    globals: HashMap<StringId, Value>,
    /// All upvalues that still point into the stack,
    /// sorted by decreasing stack index.
    open_upvalues: VecDeque<UpvalueId>,
}

// Core functionality for running a script.
impl VM {
    #[must_use]
    pub(super) fn new() -> Self {
        let mut vm = Self {
            heap: Heap::new(),
            stack: Vec::with_capacity(config::STACK_MAX),
            callstack: CallStack::new(),
            globals: HashMap::default(),
            open_upvalues: VecDeque::new(),
        };
        natives::define(&mut vm);
        vm
    }

    /// Main interpret step for an input of bytes.
    ///
    /// Works by compiling the source to bytecode and then running it.
    /// Even the main script is compiled as a function.
    pub(super) fn interpret(&mut self, source: &[u8]) -> InterpretResult {
        let result = if let Some(function) = self.compile(source) {
            let function_value = self.heap.add_function(function);
            let closure = Closure::new(*function_value.as_function(), &self.heap);
            let closure_value = self.heap.add_closure(closure);

            self.stack_push(closure_value);
            self.execute_call(closure_value, 0)
                .expect("Script call can never fail.");

            self.run()
        } else {
            InterpretResult::CompileError
        };

        match result {
            InterpretResult::Ok => {
                debug_assert_eq!(self.stack.len(), 0);
            }
            InterpretResult::RuntimeError => self.reset_stack(),
            InterpretResult::CompileError => {}
        }
        result
    }

    fn compile(&mut self, source: &[u8]) -> Option<Function> {
        let scanner = Scanner::new(source);
        let compiler = Compiler::new(scanner, &mut self.heap, config::SCRIPT_NAME);
        compiler.compile()
    }

    /// Infinite loop over the bytecode.
    ///
    /// Returns when a return instruction is hit at the top level
    /// or a runtime error aborts the interpretation.
    #[allow(clippy::too_many_lines, clippy::cognitive_complexity)]
    fn run(&mut self) -> InterpretResult {
        loop {
            run_instruction!(self);
        }
    }

    /// Drop everything that belonged to the aborted interpretation so that
    /// the VM can be reused, e.g. by the next REPL line.
    fn reset_stack(&mut self) {
        self.stack.clear();
        self.callstack.clear();
        self.open_upvalues.clear();
    }

    /// Register a native function under the given name.
    pub(crate) fn define_native_function<T: ToString>(
        &mut self,
        name: &T,
        arity: &'static [u8],
        fun: crate::value::NativeFunctionImpl,
    ) {
        let name_id = self.heap.string_id(name);
        let value = self.heap.add_native_function(crate::value::NativeFunction {
            name: name_id,
            arity,
            fun,
        });
        self.globals.insert(name_id, value);
    }
}

// Jumps and simple stack manipulation.
impl VM {
    fn jump_if_false(&mut self) {
        let offset = self.read_16bit_number();
        if self
            .peek(0)
            .expect("Stack underflow in JUMP_IF_FALSE")
            .is_falsey()
        {
            self.callstack.current_mut().ip += offset;
        }
    }

    /// Logical not of the top value on the stack.
    ///
    /// Treats `nil` and `false` as falsey and everything else as truthy.
    ///
    /// # Panics
    ///
    /// If the stack is empty. This is an internal error and should never happen.
    pub(super) fn not_(&mut self) {
        let value = self.stack.pop().expect("Stack underflow in OP_NOT");
        let result = value.is_falsey();
        self.stack_push(result.into());
    }

    /// Check if the top two values on the stack are equal.
    ///
    /// # Panics
    ///
    /// If the stack does not have two values. This is an internal error and should never happen.
    fn equal(&mut self) {
        let right = self
            .stack
            .pop()
            .expect("Stack underflow in OP_EQUAL (right)");
        let left = self.stack.pop().expect("Stack underflow in OP_EQUAL (left)");
        self.stack_push(Value::Bool(left == right));
    }
}
