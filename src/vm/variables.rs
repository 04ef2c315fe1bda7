use crate::chunk::CodeOffset;

use super::{RuntimeError, VM};

impl VM {
    pub(super) fn set_local(&mut self) {
        let slot = usize::from(self.read_byte());
        *self.stack_get_mut(slot) = *self.peek(0).expect("Stack underflow in OP_SET_LOCAL");
    }

    pub(super) fn get_local(&mut self) {
        let slot = usize::from(self.read_byte());
        self.stack_push(*self.stack_get(slot));
    }

    pub(super) fn get_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_GET_GLOBAL");
        match self.globals.get(&name) {
            Some(value) => {
                let value = *value;
                self.stack_push(value);
                Ok(())
            }
            None => {
                runtime_error!(
                    self,
                    "Undefined variable '{}'.",
                    name.to_value(&self.heap)
                );
                Err(RuntimeError)
            }
        }
    }

    /// Assign to an already defined global.
    ///
    /// Assigning to a name that has not been defined is an error and,
    /// unlike definition, leaves no binding behind. The value stays on
    /// the stack since assignment is an expression.
    pub(super) fn set_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string("OP_SET_GLOBAL");
        let stack_top_value = *self
            .stack
            .last()
            .expect("Stack underflow in OP_SET_GLOBAL");
        match self.globals.get_mut(&name) {
            Some(global) => {
                *global = stack_top_value;
                Ok(())
            }
            None => {
                runtime_error!(
                    self,
                    "Undefined variable '{}'.",
                    name.to_value(&self.heap)
                );
                Err(RuntimeError)
            }
        }
    }

    /// Define a global, overwriting any previous binding of the same name.
    ///
    /// The value is only popped after the insert so that it stays
    /// reachable for the garbage collector throughout.
    pub(super) fn define_global(&mut self) {
        let name = self.read_string("OP_DEFINE_GLOBAL");
        let stack_top_value = *self
            .stack
            .last()
            .expect("Stack underflow in OP_DEFINE_GLOBAL");
        self.globals.insert(name, stack_top_value);
        self.stack.pop();
    }
}
