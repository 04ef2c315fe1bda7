use super::{RuntimeError, VM};
use crate::chunk::CodeOffset;
use crate::value::Value;

/// Handle binary operations between numbers.
///
/// The top of the stack is the right operand, below it the left one.
macro_rules! binary_op {
    ($self:ident, $op:tt) => {{
        let slice_start = $self.stack.len() - 2;

        let ok = match &$self.stack[slice_start..] {
            [Value::Number(a), Value::Number(b)] => {
                let result: Value = (*a $op *b).into();
                $self.stack.pop();
                $self.stack.pop();
                $self.stack_push(result);
                true
            }
            _ => false,
        };

        if !ok {
            runtime_error!($self, "Operands must be numbers.");
            return InterpretResult::RuntimeError;
        }
    }};
}

impl VM {
    /// Add the top two values on the stack.
    ///
    /// `Add` is overloaded: two numbers add arithmetically, two strings
    /// concatenate into a new interned string. Everything else is an error.
    pub(super) fn add(&mut self) -> Result<(), RuntimeError> {
        let slice_start = self.stack.len() - 2;

        let ok = match &self.stack[slice_start..] {
            [Value::Number(a), Value::Number(b)] => {
                let value = Value::Number(a + b);
                self.stack.pop();
                self.stack.pop();
                self.stack_push(value);
                true
            }
            [Value::String(a), Value::String(b)] => {
                let new_string = format!("{}{}", self.heap.strings[*a], self.heap.strings[*b]);
                let new_string_id = self.heap.string_id(&new_string);
                self.stack.pop();
                self.stack.pop();
                self.stack_push(new_string_id.into());
                true
            }
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            runtime_error!(self, "Operands must be two numbers or two strings.");
            Err(RuntimeError)
        }
    }

    /// Negate the top value on the stack.
    ///
    /// # Panics
    ///
    /// If the stack is empty. This is an internal error and should never happen.
    pub(super) fn negate(&mut self) -> Result<(), RuntimeError> {
        let value = *self.peek(0).expect("Stack underflow in OP_NEGATE");
        if let Value::Number(n) = value {
            self.stack.pop();
            self.stack_push(Value::Number(-n));
            Ok(())
        } else {
            runtime_error!(self, "Operand must be a number.");
            Err(RuntimeError)
        }
    }
}
