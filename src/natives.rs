//! Native functions exposed to Lox programs.

#![allow(clippy::unnecessary_wraps)]

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{value::Value, vm::VM};

/// Seconds since the unix epoch as a double.
fn clock_native(_vm: &mut VM, _args: &mut [&mut Value]) -> Result<Value, String> {
    Ok(Value::Number(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64(),
    ))
}

pub(super) fn define(vm: &mut VM) {
    vm.define_native_function(&"clock", &[0], clock_native);
}
