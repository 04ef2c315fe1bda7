//! End-to-end tests running whole programs through the interpreter.
//!
//! Results are observed through the globals table instead of stdout,
//! so programs store whatever should be checked in a global variable.

use super::{InterpretResult, VM};
use crate::value::Value;

fn run(vm: &mut VM, source: &str) -> InterpretResult {
    vm.interpret(source.as_bytes())
}

fn run_ok(source: &str) -> VM {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, source), InterpretResult::Ok);
    vm
}

fn global(vm: &mut VM, name: &str) -> Value {
    let id = vm.heap.string_id(&name);
    *vm.globals
        .get(&id)
        .unwrap_or_else(|| panic!("Global '{name}' is not defined."))
}

fn global_number(vm: &mut VM, name: &str) -> f64 {
    match global(vm, name) {
        Value::Number(n) => n,
        x => panic!("Global '{name}' is not a number: {x:?}"),
    }
}

fn global_bool(vm: &mut VM, name: &str) -> bool {
    match global(vm, name) {
        Value::Bool(b) => b,
        x => panic!("Global '{name}' is not a bool: {x:?}"),
    }
}

fn global_string(vm: &mut VM, name: &str) -> String {
    match global(vm, name) {
        Value::String(id) => id.to_value(&vm.heap).clone(),
        x => panic!("Global '{name}' is not a string: {x:?}"),
    }
}

#[test]
fn arithmetic() {
    let mut vm = run_ok("var result = 1 + 2 * 3;");
    assert_eq!(global_number(&mut vm, "result"), 7.0);

    let mut vm = run_ok("var result = (1 + 2) * 3 - -4 / 2;");
    assert_eq!(global_number(&mut vm, "result"), 11.0);
}

#[test]
fn comparison_and_logic() {
    let mut vm = run_ok(
        "var a = !nil;
         var b = 1 < 2 and 2 <= 2;
         var c = 3 > 4 or 4 >= 5;
         var d = 0 == 0;
         var e = \"\" != \"x\";",
    );
    assert!(global_bool(&mut vm, "a"));
    assert!(global_bool(&mut vm, "b"));
    assert!(!global_bool(&mut vm, "c"));
    assert!(global_bool(&mut vm, "d"));
    assert!(global_bool(&mut vm, "e"));
}

#[test]
fn short_circuits_skip_right_operand() {
    let mut vm = run_ok(
        "var called = false;
         fun touch() { called = true; return true; }
         var a = false and touch();
         var b = true or touch();",
    );
    assert!(!global_bool(&mut vm, "called"));
    assert_eq!(global(&mut vm, "a"), Value::Bool(false));
    assert_eq!(global(&mut vm, "b"), Value::Bool(true));
}

#[test]
fn control_flow() {
    let mut vm = run_ok(
        "var result = 0;
         if (1 < 2) { result = 1; } else { result = 2; }
         var sum = 0;
         var i = 0;
         while (i < 5) { sum = sum + i; i = i + 1; }
         var product = 1;
         for (var j = 1; j <= 5; j = j + 1) { product = product * j; }",
    );
    assert_eq!(global_number(&mut vm, "result"), 1.0);
    assert_eq!(global_number(&mut vm, "sum"), 10.0);
    assert_eq!(global_number(&mut vm, "product"), 120.0);
}

#[test]
fn closure_counter() {
    let mut vm = run_ok(
        "fun makeCounter() {
             var i = 0;
             fun count() { i = i + 1; return i; }
             return count;
         }
         var c = makeCounter();
         var a = c();
         var b = c();
         var d = c();",
    );
    assert_eq!(global_number(&mut vm, "a"), 1.0);
    assert_eq!(global_number(&mut vm, "b"), 2.0);
    assert_eq!(global_number(&mut vm, "d"), 3.0);
}

#[test]
fn closures_share_captured_variable() {
    let mut vm = run_ok(
        "fun outer() {
             var x = 1;
             fun set(v) { x = v; }
             fun get() { return x; }
             set(5);
             return get();
         }
         var result = outer();",
    );
    assert_eq!(global_number(&mut vm, "result"), 5.0);
}

#[test]
fn upvalue_closed_at_scope_end() {
    let mut vm = run_ok(
        "var get;
         {
             var captured = \"inner\";
             fun reader() { return captured; }
             get = reader;
         }
         var result = get();",
    );
    assert_eq!(global_string(&mut vm, "result"), "inner");
    assert!(vm.open_upvalues.is_empty());
}

#[test]
fn string_concatenation_interns() {
    let mut vm = run_ok(
        "var a = \"foo\" + \"bar\";
         var b = \"foobar\";
         var equal = a == b;",
    );
    assert!(global_bool(&mut vm, "equal"));
    // Interning makes equal content id-equal.
    let a = global(&mut vm, "a");
    let interned = vm.heap.string_id(&"foobar");
    assert_eq!(a, Value::String(interned));
}

#[test]
fn class_with_inheritance_and_super() {
    let mut vm = run_ok(
        "class A { greet() { return \"A\"; } }
         class B < A { greet() { return super.greet() + \"B\"; } }
         var result = B().greet();",
    );
    assert_eq!(global_string(&mut vm, "result"), "AB");
}

#[test]
fn inherited_method_is_callable_directly() {
    let mut vm = run_ok(
        "class A { inherited() { return 1; } }
         class B < A {}
         var result = B().inherited();",
    );
    assert_eq!(global_number(&mut vm, "result"), 1.0);
}

#[test]
fn initializer_returns_this() {
    let mut vm = run_ok(
        "class Box { init(v) { this.v = v; } }
         var result = Box(42).v;",
    );
    assert_eq!(global_number(&mut vm, "result"), 42.0);
}

#[test]
fn bound_method_keeps_receiver() {
    let mut vm = run_ok(
        "class Named {
             init(name) { this.name = name; }
             get() { return this.name; }
         }
         var method = Named(\"bound\").get;
         var result = method();",
    );
    assert_eq!(global_string(&mut vm, "result"), "bound");
}

#[test]
fn fields_shadow_methods() {
    let mut vm = run_ok(
        "fun shadow() { return \"field\"; }
         class C { m() { return \"method\"; } }
         var c = C();
         c.m = shadow;
         var result = c.m();",
    );
    assert_eq!(global_string(&mut vm, "result"), "field");
}

#[test]
fn clock_native_returns_seconds() {
    let mut vm = run_ok("var t = clock(); var positive = t > 0;");
    assert!(global_bool(&mut vm, "positive"));
}

#[test]
fn globals_persist_across_interpretations() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "var a = 1;"), InterpretResult::Ok);
    assert_eq!(run(&mut vm, "var b = a + 1;"), InterpretResult::Ok);
    assert_eq!(global_number(&mut vm, "b"), 2.0);
}

#[test]
fn stacks_are_empty_after_normal_termination() {
    let vm = run_ok(
        "fun f(n) { if (n <= 0) { return 0; } return f(n - 1); }
         var r = f(10);",
    );
    assert!(vm.stack.is_empty());
    assert!(vm.callstack.is_empty());
    assert!(vm.open_upvalues.is_empty());
}

#[test]
fn type_errors_are_runtime_errors() {
    let mut vm = VM::new();
    assert_eq!(
        run(&mut vm, "fun f() { return 1 + \"x\"; } f();"),
        InterpretResult::RuntimeError
    );
    // The VM is reusable afterwards.
    assert!(vm.stack.is_empty());
    assert!(vm.callstack.is_empty());
    assert_eq!(run(&mut vm, "var ok = 1 + 2;"), InterpretResult::Ok);

    assert_eq!(
        run(&mut VM::new(), "print -\"negated\";"),
        InterpretResult::RuntimeError
    );
    assert_eq!(
        run(&mut VM::new(), "print 1 < \"one\";"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn undefined_accesses_are_runtime_errors() {
    assert_eq!(run(&mut VM::new(), "print missing;"), InterpretResult::RuntimeError);
    assert_eq!(
        run(&mut VM::new(), "missing = 1;"),
        InterpretResult::RuntimeError
    );
    assert_eq!(
        run(&mut VM::new(), "class C {} print C().missing;"),
        InterpretResult::RuntimeError
    );
    assert_eq!(
        run(&mut VM::new(), "print 1.field;"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn assigning_to_undefined_global_leaves_no_binding() {
    let mut vm = VM::new();
    assert_eq!(run(&mut vm, "ghost = 1;"), InterpretResult::RuntimeError);
    assert_eq!(run(&mut vm, "print ghost;"), InterpretResult::RuntimeError);
}

#[test]
fn call_errors() {
    assert_eq!(run(&mut VM::new(), "var x = 1; x();"), InterpretResult::RuntimeError);
    assert_eq!(
        run(&mut VM::new(), "fun f(a, b) {} f(1);"),
        InterpretResult::RuntimeError
    );
    assert_eq!(
        run(&mut VM::new(), "class C {} C(1);"),
        InterpretResult::RuntimeError
    );
    assert_eq!(
        run(&mut VM::new(), "class C { init() {} } C(1);"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn unbounded_recursion_overflows_the_frame_stack() {
    assert_eq!(
        run(&mut VM::new(), "fun f() { f(); } f();"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn inheriting_from_non_class_is_a_runtime_error() {
    assert_eq!(
        run(&mut VM::new(), "var NotAClass = 1; class C < NotAClass {}"),
        InterpretResult::RuntimeError
    );
}

#[test]
fn too_many_constants_is_a_compile_error() {
    // Every distinct number literal lands in the constant pool of the
    // script chunk.
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("print {i};"));
    }
    assert_eq!(run(&mut VM::new(), &source), InterpretResult::CompileError);
}

#[test]
fn local_slot_limit() {
    let mut accepted = String::from("fun f() {");
    for i in 0..255 {
        accepted.push_str(&format!("var v{i} = 0;"));
    }
    accepted.push('}');
    assert_eq!(run(&mut VM::new(), &accepted), InterpretResult::Ok);

    let mut rejected = String::from("fun f() {");
    for i in 0..256 {
        rejected.push_str(&format!("var v{i} = 0;"));
    }
    rejected.push('}');
    assert_eq!(run(&mut VM::new(), &rejected), InterpretResult::CompileError);
}

/// A function whose innermost closure captures `outer_vars + middle_vars`
/// distinct variables. The variables are split over two enclosing
/// functions because a single one cannot hold enough locals; the inner
/// function captures the middle's directly and the outer's through the
/// middle's upvalues.
fn nested_captures(outer_vars: usize, middle_vars: usize) -> String {
    let mut source = String::from("fun outer() {");
    for i in 0..outer_vars {
        source.push_str(&format!("var u{i} = 0;"));
    }
    source.push_str("fun middle() {");
    for i in 0..middle_vars {
        source.push_str(&format!("var w{i} = 0;"));
    }
    source.push_str("fun inner() {");
    for i in 0..outer_vars {
        source.push_str(&format!("u{i};"));
    }
    for i in 0..middle_vars {
        source.push_str(&format!("w{i};"));
    }
    source.push_str("}}}");
    source
}

#[test]
fn upvalue_slot_limit() {
    // 256 captured variables fill the upvalue array exactly.
    assert_eq!(
        run(&mut VM::new(), &nested_captures(128, 128)),
        InterpretResult::Ok
    );
    // The 257th reports "Too many closure variables in function.".
    assert_eq!(
        run(&mut VM::new(), &nested_captures(129, 128)),
        InterpretResult::CompileError
    );
}

/// An `if` whose branch body is `statements` assignment statements.
/// `x = x + x;` compiles to eight bytes and adds no constants, so the
/// body size can grow past the 16 bit jump range without tripping the
/// constant limit first.
fn branch_with_body(statements: usize) -> String {
    let mut source = String::from("var x = 1; if (true) {");
    for _ in 0..statements {
        source.push_str("x = x + x;");
    }
    source.push('}');
    source
}

/// A `while` whose loop body is `statements` assignment statements.
fn loop_with_body(statements: usize) -> String {
    let mut source = String::from("var x = 1; while (false) {");
    for _ in 0..statements {
        source.push_str("x = x + x;");
    }
    source.push('}');
    source
}

#[test]
fn jump_distance_limit() {
    // 32000 bytes of branch body still patch fine.
    assert_eq!(
        run(&mut VM::new(), &branch_with_body(4_000)),
        InterpretResult::Ok
    );
    // 72000 bytes exceed the forward jump's 16 bit operand and report
    // "Too much code to jump over.".
    assert_eq!(
        run(&mut VM::new(), &branch_with_body(9_000)),
        InterpretResult::CompileError
    );
}

#[test]
fn loop_body_size_limit() {
    assert_eq!(
        run(&mut VM::new(), &loop_with_body(4_000)),
        InterpretResult::Ok
    );
    // The backward jump overflows first and reports "Loop body too large.".
    assert_eq!(
        run(&mut VM::new(), &loop_with_body(9_000)),
        InterpretResult::CompileError
    );
}

#[test]
fn gc_survives_allocation_heavy_program() {
    let mut vm = run_ok(
        "class Node { init(next) { this.next = next; } }
         var head = nil;
         var i = 0;
         while (i < 50000) {
             head = Node(head);
             if (i - (i / 100) * 100 == 0) { head = nil; }
             i = i + 1;
         }
         var done = true;",
    );
    assert!(global_bool(&mut vm, "done"));
}
