use crate::{
    chunk::CodeOffset,
    heap::{ClassId, NativeFunctionId, StringId, UpvalueId},
    value::{Instance, Upvalue, Value},
};

use super::{InterpretResult, RuntimeError, VM};

// Handle calls.
impl VM {
    pub(super) fn call(&mut self) -> Result<(), RuntimeError> {
        let arg_count = self.read_byte();
        let callee = self.stack[self.stack.len() - 1 - usize::from(arg_count)];
        self.call_value(callee, arg_count)
    }

    /// Invoke a property of an instance directly.
    ///
    /// Fields shadow methods, so a callable field is called like any other
    /// value. Otherwise the method is called straight from the class without
    /// materializing a bound method.
    pub(super) fn invoke(
        &mut self,
        method_name: StringId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let receiver = *self
            .peek(arg_count.into())
            .expect("Stack underflow in OP_INVOKE");
        if let Value::Instance(instance) = receiver {
            if let Some(value) = instance
                .to_value(&self.heap)
                .fields
                .get(&method_name)
                .copied()
            {
                let new_stack_base = self.stack.len() - usize::from(arg_count) - 1;
                self.stack[new_stack_base] = value;
                self.call_value(value, arg_count)
            } else {
                let class = instance.to_value(&self.heap).class;
                self.invoke_from_class(class, method_name, arg_count)
            }
        } else {
            runtime_error!(self, "Only instances have methods.");
            Err(RuntimeError)
        }
    }

    /// Invoke a method on the receiver directly from the given class.
    pub(super) fn invoke_from_class(
        &mut self,
        class: ClassId,
        method_name: StringId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let Some(method) = class.to_value(&self.heap).methods.get(&method_name).copied() else {
            runtime_error!(
                self,
                "Undefined property '{}'.",
                method_name.to_value(&self.heap)
            );
            return Err(RuntimeError);
        };
        self.execute_call(Value::Closure(method), arg_count)
    }

    /// Call the passed value with the passed number of arguments.
    ///
    /// The arguments reside on top of the stack with the first (leftmost) argument
    /// being the deepest on the stack, directly on top of where the `callee` was taken from.
    ///
    /// Callable values are:
    /// - Closures:
    ///   - Are scheduled directly to be executed.
    /// - Bound methods:
    ///   - The callee slot is replaced with the receiver, then the contained
    ///     closure is scheduled.
    /// - Classes:
    ///   - The callee slot is replaced with a fresh instance; if the class has
    ///     an `init` method it is called with the arguments, otherwise no
    ///     arguments are allowed.
    /// - Native functions:
    ///   - Are executed directly.
    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        match callee {
            Value::Closure(_) => self.execute_call(callee, arg_count),
            Value::BoundMethod(bound_method) => {
                let bound_method = bound_method.to_value(&self.heap);
                let receiver = bound_method.receiver;
                let method = bound_method.method;
                let new_stack_base = self.stack.len() - usize::from(arg_count) - 1;
                self.stack[new_stack_base] = receiver;
                self.execute_call(Value::Closure(method), arg_count)
            }
            Value::Class(class) => {
                let maybe_initializer = class
                    .to_value(&self.heap)
                    .methods
                    .get(&self.heap.builtin_constants().init_string)
                    .copied();

                let instance = self.heap.add_instance(Instance::new(class));
                let stack_index = self.stack.len() - usize::from(arg_count) - 1;
                self.stack[stack_index] = instance;
                if let Some(initializer) = maybe_initializer {
                    self.execute_call(Value::Closure(initializer), arg_count)
                } else if arg_count != 0 {
                    runtime_error!(self, "Expected 0 arguments but got {arg_count}.");
                    Err(RuntimeError)
                } else {
                    Ok(())
                }
            }
            Value::NativeFunction(f) => self.execute_native_function_call(f, arg_count),
            _ => {
                runtime_error!(self, "Can only call functions and classes.");
                Err(RuntimeError)
            }
        }
    }

    /// Execute a normal closure call.
    ///
    /// The arity of the closure is checked against the provided number of arguments.
    /// Then the closure is pushed onto the callstack.
    pub(super) fn execute_call(
        &mut self,
        closure_value: Value,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let closure = closure_value.as_closure();
        let arity = closure
            .to_value(&self.heap)
            .function
            .to_value(&self.heap)
            .arity;
        let arg_count = usize::from(arg_count);
        if arg_count != arity {
            runtime_error!(self, "Expected {arity} arguments but got {arg_count}.");
            return Err(RuntimeError);
        }

        if self.callstack.len() == crate::config::FRAMES_MAX {
            runtime_error!(self, "Stack overflow.");
            return Err(RuntimeError);
        }

        self.callstack
            .push(*closure, self.stack.len() - arg_count - 1, &self.heap);
        Ok(())
    }

    /// Execute a call to a native function.
    ///
    /// Checks that the number of arguments matches the arity of the function.
    /// After the call the stack is truncated to remove the arguments and the function
    /// and the result is pushed onto the stack.
    fn execute_native_function_call(
        &mut self,
        f: NativeFunctionId,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let native = f.to_value(&self.heap);
        let arity = native.arity;
        let name = native.name;
        let fun = native.fun;
        if !arity.contains(&arg_count) {
            runtime_error!(
                self,
                "Native function '{}' expected {} argument{}, got {}.",
                name.to_value(&self.heap),
                arity[0],
                { if arity[0] == 1 { "" } else { "s" } },
                arg_count
            );
            return Err(RuntimeError);
        }
        let start_index = self.stack.len() - usize::from(arg_count);
        let mut args: Vec<Value> = self.stack[start_index..].to_vec();
        let mut ref_args: Vec<&mut Value> = args.iter_mut().collect();
        let result = fun(self, ref_args.as_mut_slice());
        match result {
            Ok(value) => {
                self.stack.truncate(start_index - 1);
                self.stack_push(value);
                Ok(())
            }
            Err(e) => {
                runtime_error!(self, "{}", e);
                Err(RuntimeError)
            }
        }
    }
}

// Methods, upvalues and returns.
impl VM {
    /// Bind a method of the given class to the instance on top of the stack.
    ///
    /// The instance is replaced with the bound method.
    /// Returns whether a method with that name exists.
    pub(super) fn bind_method(&mut self, class: ClassId, name: StringId) -> bool {
        let Some(method) = class.to_value(&self.heap).methods.get(&name).copied() else {
            return false;
        };
        let bound_method = Value::bound_method(
            *self.peek(0).expect("Stack underflow in bind_method"),
            method,
            &mut self.heap,
        );
        self.stack.pop(); // instance
        self.stack_push(bound_method);
        true
    }

    /// Capture an upvalue from the current frame's window.
    ///
    /// Walks the open upvalue list, which is sorted by decreasing stack
    /// index, until reaching an entry at or below the requested slot.
    /// If the slot has already been captured that upvalue is reused,
    /// otherwise a new one is spliced in at the right position.
    pub(super) fn capture_upvalue(&mut self, local: usize) -> UpvalueId {
        let local = self.callstack.current().stack_base + local;
        let mut insert_at = self.open_upvalues.len();

        for (i, this) in self.open_upvalues.iter().enumerate() {
            let location = this.to_value(&self.heap).as_open();
            if location == local {
                return *this;
            }
            if location < local {
                insert_at = i;
                break;
            }
        }

        let upvalue = self.heap.add_upvalue(Upvalue::Open(local));
        let upvalue_id = *upvalue.upvalue_location();
        self.open_upvalues.insert(insert_at, upvalue_id);

        upvalue_id
    }

    /// Close all open upvalues pointing at or above the given stack slot.
    ///
    /// The captured values are copied off the stack into the upvalues
    /// themselves, which from then on own them.
    pub(super) fn close_upvalue(&mut self, last: usize) {
        while self
            .open_upvalues
            .front()
            .is_some_and(|v| v.to_value(&self.heap).as_open() >= last)
        {
            let upvalue_id = self
                .open_upvalues
                .pop_front()
                .expect("Open upvalue list underflow in close_upvalue");

            let pointed_value = self.stack[upvalue_id.to_value(&self.heap).as_open()];
            *upvalue_id.to_value_mut(&mut self.heap) = Upvalue::Closed(pointed_value);
        }
    }

    /// Define the method on top of the stack on the class below it.
    ///
    /// Pops the method, the class stays for the next method.
    pub(super) fn define_method(&mut self, method_name: StringId) {
        let method = *self
            .peek(0)
            .expect("Stack underflow in OP_METHOD")
            .as_closure();
        let class = *self
            .peek(1)
            .expect("Stack underflow in OP_METHOD")
            .as_class();
        class
            .to_value_mut(&mut self.heap)
            .methods
            .insert(method_name, method);
        self.stack.pop();
    }

    /// Return from the current function.
    ///
    /// Closes every upvalue that still points into the returning frame's
    /// window. If this was the outermost frame the interpretation is over;
    /// otherwise the stack is rewound to the frame's base and the result
    /// pushed for the caller.
    pub(super) fn return_(&mut self) -> Option<InterpretResult> {
        let result = self.stack.pop().expect("Stack underflow in OP_RETURN");
        let frame = self
            .callstack
            .pop(&self.heap)
            .expect("Call stack underflow in OP_RETURN");
        self.close_upvalue(frame.stack_base);
        if self.callstack.is_empty() {
            // Pop the script function itself.
            self.stack.pop();
            return Some(InterpretResult::Ok);
        }
        self.stack.truncate(frame.stack_base);
        self.stack_push(result);
        None
    }
}

// Property access.
impl VM {
    /// Read a property off the instance on top of the stack.
    ///
    /// Fields take precedence; on a field miss the name is looked up in the
    /// class's methods and bound to the instance.
    pub(super) fn get_property(&mut self) -> Result<(), RuntimeError> {
        let field = self.read_string("OP_GET_PROPERTY");
        let value = *self.peek(0).expect("Stack underflow in OP_GET_PROPERTY");
        let Value::Instance(instance) = value else {
            runtime_error!(self, "Only instances have properties.");
            return Err(RuntimeError);
        };
        if let Some(value) = instance.to_value(&self.heap).fields.get(&field).copied() {
            self.stack.pop(); // instance
            self.stack_push(value);
            Ok(())
        } else if self.bind_method(instance.to_value(&self.heap).class, field) {
            // The method has been bound to the instance so that it can
            // later be called separately.
            Ok(())
        } else {
            runtime_error!(
                self,
                "Undefined property '{}'.",
                field.to_value(&self.heap)
            );
            Err(RuntimeError)
        }
    }

    /// Write a field of the instance below the value on top of the stack.
    ///
    /// Afterwards only the assigned value remains on the stack, since
    /// assignment is an expression.
    pub(super) fn set_property(&mut self) -> Result<(), RuntimeError> {
        let field = self.read_string("OP_SET_PROPERTY");
        let receiver = *self.peek(1).expect("Stack underflow in OP_SET_PROPERTY");
        let Value::Instance(instance) = receiver else {
            runtime_error!(self, "Only instances have fields.");
            return Err(RuntimeError);
        };
        let value = self.stack.pop().expect("Stack underflow in OP_SET_PROPERTY");
        instance
            .to_value_mut(&mut self.heap)
            .fields
            .insert(field, value);
        self.stack.pop(); // instance
        self.stack_push(value);
        Ok(())
    }
}
