/// Main switch for the `OpCode` execution.
///
/// This is a macro for performance reasons: the handlers work directly
/// on the locals of the dispatch loop and early returns leave `run`
/// itself instead of having to thread results through a function.
macro_rules! run_instruction {
    ($self:ident) => {
        #[cfg(feature = "trace_execution")]
        {
            let function = $self.callstack.function();
            let mut disassembler =
                InstructionDisassembler::new(&function.to_value(&$self.heap).chunk, &$self.heap);
            *disassembler.offset = $self.callstack.current().ip;
            println!(
                "          [ {} ]",
                $self
                    .stack
                    .iter()
                    .map(|v| v.to_string(&$self.heap))
                    .collect::<Vec<_>>()
                    .join(" ][ ")
            );
            print!("{disassembler:?}");
        }
        $self.collect_garbage();
        match OpCode::try_from($self.read_byte()).expect("Internal error: unrecognized opcode") {
            // Index of the constant is the operand, value is in the constants table
            OpCode::Constant => {
                let value = $self.read_constant();
                $self.stack_push(value);
            }
            OpCode::Nil => $self.stack_push(Value::Nil),
            OpCode::True => $self.stack_push(Value::Bool(true)),
            OpCode::False => $self.stack_push(Value::Bool(false)),
            OpCode::Pop => {
                $self.stack.pop().expect("Stack underflow in OP_POP.");
            }
            // Grabs index (into the stack) as the operand (next bytecode)
            OpCode::GetLocal => $self.get_local(),
            // Index is the operand again, value to set is on the stack
            OpCode::SetLocal => $self.set_local(),
            // Name of the global is the operand
            OpCode::GetGlobal => {
                if $self.get_global().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::SetGlobal => {
                if $self.set_global().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::DefineGlobal => $self.define_global(),
            // Upvalue index is the operand
            // Closure is the one on the callstack
            OpCode::GetUpvalue => {
                let upvalue_index = usize::from($self.read_byte());
                let closure = $self.callstack.closure();
                let upvalue_location =
                    closure.to_value(&$self.heap).upvalues[upvalue_index].to_value(&$self.heap);
                match *upvalue_location {
                    Upvalue::Open(absolute_local_index) => {
                        $self.stack_push($self.stack[absolute_local_index]);
                    }
                    Upvalue::Closed(value) => $self.stack_push(value),
                }
            }
            // Upvalue index is the operand, closure is on the callstack,
            // value to set is on the stack
            OpCode::SetUpvalue => {
                let upvalue_index = usize::from($self.read_byte());
                let closure = $self.callstack.closure();
                let upvalue_id = closure.to_value(&$self.heap).upvalues[upvalue_index];
                let new_value = *$self
                    .stack
                    .last()
                    .expect("Stack underflow in OP_SET_UPVALUE");
                match upvalue_id.to_value_mut(&mut $self.heap) {
                    Upvalue::Open(absolute_local_index) => {
                        let absolute_local_index = *absolute_local_index;
                        $self.stack[absolute_local_index] = new_value;
                    }
                    Upvalue::Closed(value) => {
                        *value = new_value;
                    }
                }
            }
            // Property to get is the operand, instance is on the stack.
            // Fields shadow methods; methods get bound to the instance.
            OpCode::GetProperty => {
                if $self.get_property().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            // Property to set is the operand, instance is on the stack
            // as is the value to set.
            OpCode::SetProperty => {
                if $self.set_property().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            // Grab and bind a method from the superclass.
            // Operand is the name of the method, the stack has the superclass.
            OpCode::GetSuper => {
                let method_name = $self.read_string("OP_GET_SUPER");
                let superclass = *$self
                    .stack
                    .pop()
                    .expect("Stack underflow in OP_GET_SUPER")
                    .as_class();
                if !$self.bind_method(superclass, method_name) {
                    runtime_error!(
                        $self,
                        "Undefined property '{}'.",
                        method_name.to_value(&$self.heap)
                    );
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Equal => $self.equal(),
            OpCode::Greater => binary_op!($self, >),
            OpCode::Less => binary_op!($self, <),
            // `Add` is overloaded: two strings concatenate, two numbers add.
            OpCode::Add => {
                if $self.add().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Subtract => binary_op!($self, -),
            OpCode::Multiply => binary_op!($self, *),
            OpCode::Divide => binary_op!($self, /),
            OpCode::Not => $self.not_(),
            OpCode::Negate => {
                if $self.negate().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            OpCode::Print => {
                let value = $self.stack.pop().expect("Stack underflow in OP_PRINT.");
                println!("{}", value.to_string(&$self.heap));
            }
            OpCode::Jump => {
                let offset = $self.read_16bit_number();
                $self.callstack.current_mut().ip += offset;
            }
            OpCode::JumpIfFalse => $self.jump_if_false(),
            // Offset to jump backwards is the operand(s)
            OpCode::Loop => {
                let offset = $self.read_16bit_number();
                $self.callstack.current_mut().ip -= offset;
            }
            // Arg count is passed as the operand.
            // The callee is on the stack followed by all arguments
            // in order from left to right.
            OpCode::Call => {
                if $self.call().is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            // Operands are the method name to invoke as well as the number of arguments.
            // Stack contains the receiver followed by the arguments.
            // (... --- Instance --- arg1 --- arg2 --- ... --- argN)
            OpCode::Invoke => {
                let method_name = $self.read_string("OP_INVOKE");
                let arg_count = $self.read_byte();
                if $self.invoke(method_name, arg_count).is_err() {
                    return InterpretResult::RuntimeError;
                }
            }
            // Invoke a method from the superclass.
            // Operands are the name of the method and number of arguments.
            // Stack has the receiver, the arguments and the superclass on top.
            OpCode::SuperInvoke => {
                let method_name = $self.read_string("OP_SUPER_INVOKE");
                let arg_count = $self.read_byte();
                let superclass = *$self
                    .stack
                    .pop()
                    .expect("Stack underflow in OP_SUPER_INVOKE")
                    .as_class();
                if $self
                    .invoke_from_class(superclass, method_name, arg_count)
                    .is_err()
                {
                    return InterpretResult::RuntimeError;
                }
            }
            // Get the function with the actual bytecode as a constant from the operand.
            // Capture the upvalues and push the closure onto the stack.
            OpCode::Closure => {
                let value = $self.read_constant();
                let function = value.as_function();
                let mut closure = Closure::new(*function, &$self.heap);

                for _ in 0..closure.upvalue_count {
                    let is_local = $self.read_byte();
                    debug_assert!(
                        is_local == 0 || is_local == 1,
                        "'is_local' must be 0 or 1, got {is_local}"
                    );
                    let is_local = is_local == 1;

                    let index = usize::from($self.read_byte());
                    if is_local {
                        closure.upvalues.push($self.capture_upvalue(index));
                    } else {
                        closure
                            .upvalues
                            .push($self.callstack.closure().to_value(&$self.heap).upvalues[index]);
                    }
                }
                let closure_value = $self.heap.add_closure(closure);
                $self.stack_push(closure_value);
            }
            // Close the upvalue pointing at the top of the stack
            OpCode::CloseUpvalue => {
                $self.close_upvalue($self.stack.len() - 1);
                $self.stack.pop();
            }
            // Value to return is on the stack
            OpCode::Return => {
                if let Some(result) = $self.return_() {
                    return result;
                }
            }
            // Classname is the operand, create a new class and push it onto the stack
            OpCode::Class => {
                let class_name = $self.read_string("OP_CLASS");
                let class = $self.heap.add_class(Class::new(class_name));
                $self.stack_push(class);
            }
            // Stack has (... --- Superclass --- Class).
            // Copies all methods from the superclass into the subclass,
            // then pops the subclass. The superclass stays behind as the
            // `super` local of the class body's scope.
            OpCode::Inherit => {
                let superclass_value = *$self.peek(1).expect("Stack underflow in OP_INHERIT");
                let Value::Class(superclass) = superclass_value else {
                    runtime_error!($self, "Superclass must be a class.");
                    return InterpretResult::RuntimeError;
                };
                let methods = superclass.to_value(&$self.heap).methods.clone();
                let subclass = *$self
                    .stack
                    .pop()
                    .expect("Stack underflow in OP_INHERIT")
                    .as_class();
                subclass
                    .to_value_mut(&mut $self.heap)
                    .methods
                    .extend(methods);
            }
            // Name of the method is the operand, the class and the closure
            // are on the stack (... --- Class --- Closure)
            OpCode::Method => {
                let method_name = $self.read_string("OP_METHOD");
                $self.define_method(method_name);
            }
        };
    };
}
