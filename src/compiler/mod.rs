//! The compiler module contains the single-pass compiler for Lox.
//!
//! It compiles tokens from the scanner directly into bytecode for the VM
//! to execute. No intermediate syntax tree is built.

mod back;
mod error;
mod front;
mod rules;
mod variables;

use rustc_hash::FxHashMap as HashMap;

use shrinkwraprs::Shrinkwrap;

use crate::{
    chunk::{Chunk, ConstantIndex},
    compiler::rules::{Rules, make_rules},
    heap::{Heap, StringId},
    scanner::{Scanner, Token, TokenKind},
    types::Line,
    value::Function,
};

#[derive(Shrinkwrap, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Default, Debug)]
#[shrinkwrap(mutable)]
struct ScopeDepth(i32);

/// Represents a local variable in the current scope.
///
/// Stores its depth in order to properly release it when a scope ends,
/// and whether it is captured by a closure. A depth of `-1` marks a local
/// that has been declared but whose initializer has not finished yet.
/// Also contains the token it was created from. This is usually an
/// identifier; synthetic tokens exist for `super` and `this`.
#[derive(Debug)]
struct Local<'scanner> {
    name: Token<'scanner>,
    depth: ScopeDepth,
    is_captured: bool,
}

/// Characterizes the types of functions.
///
/// - Function is a normal function.
/// - Initializer is a constructor and is special because it returns `this` on exit without
///   a return statement or on a bare `return`. Returns with values are not allowed.
/// - Method is a method on a class. It is special because the local slot 0 is always `this`.
/// - Script is the top-level code of a file. Does not allow `return` statements.
#[derive(Copy, Clone, PartialEq, Eq)]
enum FunctionType {
    Function,
    Initializer,
    Method,
    Script,
}

/// Struct to handle the state of an upvalue.
///
/// Tracks the position of the upvalue and whether it is captured directly from
/// a local variable or from the upvalue of an enclosing closure.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Upvalue {
    index: u8,
    is_local: bool,
}

/// Nestable part of the compiler state.
///
/// This struct is used to keep track of the state of the compiler that can be nested
/// when compiling nested functions.
struct NestableState<'scanner> {
    current_function: Function,
    function_type: FunctionType,

    locals: Vec<Local<'scanner>>,
    globals_by_name: HashMap<StringId, ConstantIndex>,
    upvalues: Vec<Upvalue>,
    scope_depth: ScopeDepth,
}

impl NestableState<'_> {
    #[must_use]
    fn new(function_name: StringId, function_type: FunctionType) -> Self {
        NestableState {
            current_function: Function::new(0, function_name),
            function_type,
            // Slot zero belongs to the callee. For methods and initializers
            // it is named `this` so that `this` resolves as a local.
            locals: vec![Local {
                name: Token {
                    kind: TokenKind::Identifier,
                    lexeme: if function_type == FunctionType::Method
                        || function_type == FunctionType::Initializer
                    {
                        b"this"
                    } else {
                        &[]
                    },
                    line: Line(0),
                },
                depth: ScopeDepth::default(),
                is_captured: false,
            }],
            upvalues: Vec::new(),
            globals_by_name: HashMap::default(),
            scope_depth: ScopeDepth::default(),
        }
    }
}

/// Keep track of the state of a class declaration.
///
/// Needed as a stack for nested class declarations.
/// Tracks whether the class has a superclass so that `super`
/// can be rejected statically where it is invalid.
struct ClassState {
    has_superclass: bool,
}

impl ClassState {
    #[must_use]
    const fn new() -> Self {
        Self {
            has_superclass: false,
        }
    }
}

/// Main compiler struct that turns tokens into bytecode.
pub struct Compiler<'scanner, 'heap> {
    /// The VM heap. Already present here to store compiled functions
    /// and intern strings.
    heap: &'heap mut Heap,

    /// Rules used for parsing expressions by precedence climbing.
    rules: Rules<'scanner, 'heap>,

    /// The scanner that provides tokens to the compiler.
    scanner: Scanner<'scanner>,
    previous: Option<Token<'scanner>>,
    current: Option<Token<'scanner>>,

    had_error: bool,
    panic_mode: bool,

    nestable_state: Vec<NestableState<'scanner>>,
    class_state: Vec<ClassState>,
}

impl<'scanner, 'heap> Compiler<'scanner, 'heap> {
    #[must_use]
    pub(super) fn new(scanner: Scanner<'scanner>, heap: &'heap mut Heap, name: &str) -> Self {
        let function_name = heap.string_id(&name);

        Compiler {
            heap,
            scanner,
            previous: None,
            current: None,
            had_error: false,
            panic_mode: false,
            rules: make_rules(),
            nestable_state: vec![NestableState::new(function_name, FunctionType::Script)],
            class_state: vec![],
        }
    }

    /// Compile the tokens provided by the scanner into a function.
    ///
    /// This is the main compilation loop.
    pub(super) fn compile(mut self) -> Option<Function> {
        self.advance();

        while !self.match_(TokenKind::Eof) {
            self.declaration();
        }

        self.end();
        if self.had_error {
            None
        } else {
            Some(self.nestable_state.pop().unwrap().current_function)
        }
    }

    // Nesting related functions are here to not have to export the `NestableState` struct.
    fn start_nesting<S>(&mut self, function_name: &S, function_type: FunctionType)
    where
        S: ToString,
    {
        let function_name = self.heap.string_id(function_name);
        self.nestable_state
            .push(NestableState::new(function_name, function_type));
    }

    fn end_nesting(&mut self) -> NestableState<'scanner> {
        self.nestable_state.pop().unwrap()
    }

    fn nested<F, S>(
        &mut self,
        function_name: &S,
        function_type: FunctionType,
        f: F,
    ) -> NestableState<'scanner>
    where
        S: ToString,
        F: Fn(&mut Self),
    {
        self.start_nesting(function_name, function_type);
        f(self);
        self.end_nesting()
    }

    fn has_enclosing(&self) -> bool {
        self.nestable_state.len() > 1
    }

    /// Call a function from within the enclosing scope.
    ///
    /// Mainly used for recursively resolving upvalues.
    fn in_enclosing<F, R>(&mut self, f: F) -> R
    where
        F: Fn(&mut Self) -> R,
    {
        assert!(self.has_enclosing());
        let state = self.nestable_state.pop().unwrap();
        let result = f(self);
        self.nestable_state.push(state);
        result
    }

    fn current_function(&self) -> &Function {
        &self.nestable_state.last().unwrap().current_function
    }

    fn current_function_mut(&mut self) -> &mut Function {
        &mut self.nestable_state.last_mut().unwrap().current_function
    }

    fn locals(&self) -> &Vec<Local<'scanner>> {
        &self.nestable_state.last().unwrap().locals
    }

    fn locals_mut(&mut self) -> &mut Vec<Local<'scanner>> {
        &mut self.nestable_state.last_mut().unwrap().locals
    }

    fn function_type(&self) -> FunctionType {
        self.nestable_state.last().unwrap().function_type
    }

    fn scope_depth(&self) -> ScopeDepth {
        self.nestable_state.last().unwrap().scope_depth
    }

    fn scope_depth_mut(&mut self) -> &mut ScopeDepth {
        &mut self.nestable_state.last_mut().unwrap().scope_depth
    }

    fn globals_by_name(&self) -> &HashMap<StringId, ConstantIndex> {
        &self.nestable_state.last().unwrap().globals_by_name
    }

    fn globals_by_name_mut(&mut self) -> &mut HashMap<StringId, ConstantIndex> {
        &mut self.nestable_state.last_mut().unwrap().globals_by_name
    }

    fn upvalues(&self) -> &Vec<Upvalue> {
        &self.nestable_state.last().unwrap().upvalues
    }

    fn upvalues_mut(&mut self) -> &mut Vec<Upvalue> {
        &mut self.nestable_state.last_mut().unwrap().upvalues
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.current_function_mut().chunk
    }

    fn current_chunk_len(&mut self) -> usize {
        self.current_chunk().code().len()
    }

    fn current_class(&self) -> Option<&ClassState> {
        self.class_state.last()
    }

    fn current_class_mut(&mut self) -> Option<&mut ClassState> {
        self.class_state.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_source(source: &str) -> (Heap, Option<Function>) {
        let mut heap = Heap::new();
        let scanner = Scanner::new(source.as_bytes());
        let compiler = Compiler::new(scanner, &mut heap, crate::config::SCRIPT_NAME);
        let function = compiler.compile();
        (heap, function)
    }

    #[test]
    fn compiles_valid_source() {
        let (_heap, function) = compile_source("print 1 + 2 * 3;");
        let function = function.unwrap();
        assert_eq!(function.arity, 0);
        assert_eq!(function.upvalue_count, 0);
        assert!(!function.chunk.code().is_empty());
    }

    #[test]
    fn reports_syntax_errors() {
        assert!(compile_source("print 1 +;").1.is_none());
        assert!(compile_source("var;").1.is_none());
        assert!(compile_source("1 + 2").1.is_none());
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(compile_source("var a = 1; var b = 2; a + b = 3;").1.is_none());
    }

    #[test]
    fn rejects_self_initializing_local() {
        assert!(compile_source("var a = 1; { var a = a; }").1.is_none());
    }

    #[test]
    fn rejects_duplicate_local() {
        assert!(compile_source("{ var a = 1; var a = 2; }").1.is_none());
    }

    #[test]
    fn rejects_top_level_return() {
        assert!(compile_source("return 1;").1.is_none());
    }

    #[test]
    fn rejects_this_and_super_outside_class() {
        assert!(compile_source("print this;").1.is_none());
        assert!(compile_source("print super.x;").1.is_none());
        assert!(compile_source("class A { f() { return super.f(); } }").1.is_none());
    }

    #[test]
    fn rejects_self_inheritance() {
        assert!(compile_source("class A < A {}").1.is_none());
    }

    #[test]
    fn rejects_initializer_returning_value() {
        assert!(compile_source("class A { init() { return 1; } }").1.is_none());
        assert!(compile_source("class A { init() { return; } }").1.is_some());
    }

    #[test]
    fn counts_upvalues() {
        let (heap, function) = compile_source(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; }",
        );
        let function = function.unwrap();
        // The nested functions live in the constant pool of their parent.
        let outer = function
            .chunk
            .constants()
            .iter()
            .find_map(|constant| match constant {
                crate::value::Value::Function(id) => Some(id.to_value(&heap)),
                _ => None,
            })
            .unwrap();
        let inner = outer
            .chunk
            .constants()
            .iter()
            .find_map(|constant| match constant {
                crate::value::Value::Function(id) => Some(id.to_value(&heap)),
                _ => None,
            })
            .unwrap();
        assert_eq!(outer.upvalue_count, 0);
        assert_eq!(inner.upvalue_count, 1);
    }

    #[test]
    fn errors_do_not_cascade_past_synchronization() {
        // Two distinct statements with errors still finish compilation
        // (returning `None`) without panicking.
        assert!(compile_source("var 1 = 2; print 3;").1.is_none());
    }
}
