//! Contains the `OpCode` enum as well as the chunks containing the bytecode to be interpreted.

use crate::heap::{Heap, StringId};
use crate::types::Line;
use crate::value::Value;
use convert_case::{Case, Casing};
use derivative::Derivative;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use paste::paste;
use shrinkwraprs::Shrinkwrap;
use std::fmt::Debug;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};

#[derive(Shrinkwrap, Clone, Copy, Debug)]
#[shrinkwrap(mutable)]
pub struct CodeOffset(pub usize);

#[derive(Shrinkwrap, Clone, Copy)]
pub struct ConstantIndex(pub u8);

impl From<ConstantIndex> for u8 {
    fn from(index: ConstantIndex) -> Self {
        index.0
    }
}

/// The set of `OpCodes` emitted by the compiler to be interpreted/executed by the VM.
#[derive(
    IntoPrimitive, TryFromPrimitive, PartialEq, Eq, Debug, Clone, Copy, EnumIter, AsRefStr,
)]
#[repr(u8)]
pub enum OpCode {
    Constant,

    Nil,
    True,
    False,

    Pop,

    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    GetSuper,

    Equal,
    Greater,
    Less,

    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    Print,

    Jump,
    JumpIfFalse,
    Loop,

    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,

    Class,
    Inherit,
    Method,
}

impl OpCode {
    /// Get the length of the longest `OpCode` when turned into snake case.
    ///
    /// Used for aligning debugging output.
    fn max_name_length() -> usize {
        Self::iter()
            .map(|v| v.as_ref().to_case(Case::UpperSnake).len())
            .max()
            .unwrap_or(0)
    }
}

/// Wraps a block of bytecode used for interpretation.
///
/// Each script and function has its own `Chunk`.
/// Each chunk has a name, mainly for debugging purposes, its code,
/// line information for each entry in the code array, as well as a constant
/// table for literal constants that appear in the chunk.
#[derive(Derivative, Clone, Debug)]
#[derivative(PartialEq)]
pub struct Chunk {
    name: StringId,
    code: Vec<u8>,
    #[derivative(PartialEq = "ignore")]
    lines: Vec<Line>,
    #[derivative(PartialEq = "ignore")]
    constants: Vec<Value>,
}
impl Eq for Chunk {}

impl Chunk {
    pub(super) fn new(name: StringId) -> Self {
        Self {
            name,
            code: Vec::default(),
            lines: Vec::default(),
            constants: Vec::default(),
        }
    }

    pub(super) fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub(super) fn code(&self) -> &[u8] {
        &self.code
    }

    /// Retrieve a constant by index.
    pub(super) fn get_constant<T>(&self, index: T) -> &Value
    where
        T: Into<usize>,
    {
        &self.constants[index.into()]
    }

    /// Write a byte (`OpCode` or operand) into the chunk.
    /// Also update the line information accordingly.
    pub(super) fn write<T>(&mut self, what: T, line: Line)
    where
        T: Into<u8>,
    {
        self.code.push(what.into());
        self.lines.push(line);
    }

    /// Patch an existing entry in the code.
    ///
    /// Mainly used for patching forward jumps in conditions
    /// where the size of the code to jump over is not yet known.
    pub(super) fn patch<T>(&mut self, offset: CodeOffset, what: T)
    where
        T: Into<u8>,
    {
        self.code[*offset] = what.into();
    }

    /// Add a constant to the constant table and return its index.
    ///
    /// Returns `None` if the index no longer fits into the single
    /// operand byte of `OpCode::Constant` and friends.
    pub(super) fn make_constant(&mut self, what: Value) -> Option<ConstantIndex> {
        self.constants.push(what);
        u8::try_from(self.constants.len() - 1).ok().map(ConstantIndex)
    }

    /// Write a constant into the code.
    /// Create it in the constant table and write the index preceded by
    /// the corresponding `OpCode`.
    pub(super) fn write_constant(&mut self, what: Value, line: Line) -> bool {
        if let Some(index) = self.make_constant(what) {
            self.write(OpCode::Constant, line);
            self.write(index, line);
            true
        } else {
            false
        }
    }

    pub(super) fn get_line(&self, offset: CodeOffset) -> Line {
        self.lines[*offset.as_ref()]
    }
}

impl Chunk {
    pub(crate) fn to_string(&self, heap: &Heap) -> String {
        let name = self.name.to_value(heap);
        let mut result = format!("== {name} ==\n");

        let mut disassembler = InstructionDisassembler::new(self, heap);
        while disassembler.offset.as_ref() < &self.code.len() {
            let disasm_output = format!("{disassembler:?}");
            result.push_str(&disasm_output);
            *disassembler.offset += disassembler.instruction_len(*disassembler.offset, heap);
        }

        result
    }
}

/// Debug helper for disassembling a chunk's code into
/// a human readable format.
pub struct InstructionDisassembler<'chunk, 'heap> {
    chunk: &'chunk Chunk,
    pub(super) offset: CodeOffset,
    operand_alignment: usize,
    opcode_name_alignment: usize,
    heap: &'heap Heap,
}

impl<'chunk, 'heap> InstructionDisassembler<'chunk, 'heap> {
    #[must_use]
    pub(super) fn new(chunk: &'chunk Chunk, heap: &'heap Heap) -> Self {
        Self {
            chunk,
            offset: CodeOffset(0),
            operand_alignment: 4,
            // +3 because we add "OP_" to the start.
            opcode_name_alignment: OpCode::max_name_length() + 3,
            heap,
        }
    }

    #[allow(clippy::enum_glob_use)]
    fn instruction_len(&self, offset: usize, heap: &Heap) -> usize {
        use OpCode::*;
        let opcode = OpCode::try_from_primitive(self.chunk.code[offset]).unwrap();
        std::mem::size_of::<OpCode>()
            + match opcode {
                Nil | True | False | Pop | Equal | Greater | Less | Add | Subtract | Multiply
                | Divide | Not | Negate | Print | CloseUpvalue | Return | Inherit => 0,
                Constant | GetLocal | SetLocal | GetGlobal | DefineGlobal | SetGlobal
                | GetUpvalue | SetUpvalue | GetProperty | SetProperty | GetSuper | Call | Class
                | Method => 1,
                Jump | JumpIfFalse | Loop | Invoke | SuperInvoke => 2,
                Closure => 1 + self.upvalue_code_len(offset, heap),
            }
    }

    fn upvalue_code_len(&self, closure_offset: usize, heap: &Heap) -> usize {
        let code = self.chunk.code();
        let constant = code[closure_offset + 1];
        let value = self.chunk.get_constant(constant);
        value.as_function().to_value(heap).upvalue_count * 2
    }

    fn debug_constant_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        offset: CodeOffset,
        heap: &Heap,
    ) -> std::fmt::Result {
        let constant_index = ConstantIndex(self.chunk.code()[offset.as_ref() + 1]);
        let constant_value = *self.chunk.get_constant(*constant_index.as_ref());
        write!(
            f,
            "{:-OPCODE_NAME_ALIGNMENT$} {:>OPERAND_ALIGNMENT$}",
            name,
            *constant_index,
            OPCODE_NAME_ALIGNMENT = self.opcode_name_alignment,
            OPERAND_ALIGNMENT = self.operand_alignment
        )?;
        writeln!(f, " '{}'", constant_value.to_string(heap))
    }

    #[allow(clippy::unused_self)]
    fn debug_simple_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        _offset: CodeOffset,
        _heap: &Heap,
    ) -> std::fmt::Result {
        writeln!(f, "{name}")
    }

    fn debug_byte_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        offset: CodeOffset,
        _heap: &Heap,
    ) -> std::fmt::Result {
        let slot = self.chunk.code[*offset + 1];
        writeln!(
            f,
            "{name:-OPCODE_NAME_ALIGNMENT$} {slot:>OPERAND_ALIGNMENT$}",
            OPCODE_NAME_ALIGNMENT = self.opcode_name_alignment,
            OPERAND_ALIGNMENT = self.operand_alignment
        )
    }

    fn debug_jump_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        offset: CodeOffset,
        heap: &Heap,
    ) -> std::fmt::Result {
        let code = self.chunk.code();
        let jump = (usize::from(code[offset.as_ref() + 1]) << 8)
            + (usize::from(code[offset.as_ref() + 2]));
        let target = *offset + self.instruction_len(*offset, heap);
        let target = if OpCode::try_from_primitive(code[*offset]).unwrap() == OpCode::Loop {
            target - jump
        } else {
            target + jump
        };
        writeln!(
            f,
            "{:-OPCODE_NAME_ALIGNMENT$} {:>OPERAND_ALIGNMENT$} -> {}",
            name,
            *offset,
            target,
            OPCODE_NAME_ALIGNMENT = self.opcode_name_alignment,
            OPERAND_ALIGNMENT = self.operand_alignment
        )
    }

    fn debug_closure_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        offset: CodeOffset,
        heap: &Heap,
    ) -> std::fmt::Result {
        let mut offset = *offset + 1;

        let code = self.chunk.code();
        let constant = code[offset];
        offset += 1;

        let value = self.chunk.get_constant(constant);
        writeln!(
            f,
            "{:-OPCODE_NAME_ALIGNMENT$} {:>OPERAND_ALIGNMENT$} {}",
            name,
            constant,
            value.to_string(heap),
            OPCODE_NAME_ALIGNMENT = self.opcode_name_alignment,
            OPERAND_ALIGNMENT = self.operand_alignment,
        )?;

        let function = value.as_function();
        for _ in 0..function.to_value(heap).upvalue_count {
            let is_local = code[offset];
            offset += 1;

            debug_assert!(
                is_local == 0 || is_local == 1,
                "is_local must be 0 or 1, got: {is_local}"
            );
            let is_local = is_local == 1;

            let index = code[offset];
            offset += 1;
            writeln!(
                f,
                "{:04}    |{} {} {}",
                offset - 2,
                // +1 for the space before opcode_name and 1 between name and operand
                " ".repeat(self.opcode_name_alignment + self.operand_alignment + 2),
                if is_local { "local" } else { "upvalue" },
                index
            )?;
        }

        Ok(())
    }

    fn debug_invoke_opcode(
        &self,
        f: &mut std::fmt::Formatter,
        name: &str,
        offset: CodeOffset,
        heap: &Heap,
    ) -> std::fmt::Result {
        let code = self.chunk.code();
        let constant = code[offset.as_ref() + 1];
        let arg_count = code[offset.as_ref() + 2];
        let constant_value = self.chunk.get_constant(constant);
        let formatted_name = format!("{name} ({arg_count} args)");
        writeln!(
            f,
            "{:-OPCODE_NAME_ALIGNMENT$} {:>OPERAND_ALIGNMENT$} '{}'",
            formatted_name,
            constant,
            constant_value.to_string(heap),
            OPCODE_NAME_ALIGNMENT = self.opcode_name_alignment,
            OPERAND_ALIGNMENT = self.operand_alignment
        )
    }
}

macro_rules! disassemble {
    (
        $self:ident,
        $f:ident,
        $offset:ident,
        $heap:ident,
        $m:expr,
        $(
            $k:ident(
                $($v:ident),* $(,)?
            )
        ),* $(,)?
    ) => {paste! {
        match $m {
            $($(
                OpCode::$v => $self.[<debug_ $k _opcode>]($f, stringify!([<OP_ $v:snake:upper>]), $offset, $heap)
            ),*),*
        }
    }}
}

impl Debug for InstructionDisassembler<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.chunk.code();
        let offset = self.offset;

        write!(f, "{:04} ", *offset.as_ref())?;
        if *offset.as_ref() > 0
            && self.chunk.get_line(offset) == self.chunk.get_line(CodeOffset(offset.as_ref() - 1))
        {
            write!(f, "   | ")?;
        } else {
            write!(
                f,
                "{:>OPERAND_ALIGNMENT$} ",
                *self.chunk.get_line(offset),
                OPERAND_ALIGNMENT = self.operand_alignment
            )?;
        }

        let opcode = OpCode::try_from_primitive(code[*offset.as_ref()])
            .unwrap_or_else(|_| panic!("Unknown opcode: {}", code[*offset.as_ref()]));

        let heap = &self.heap;
        disassemble!(
            self,
            f,
            offset,
            heap,
            opcode,
            constant(
                Constant,
                DefineGlobal,
                GetGlobal,
                SetGlobal,
                GetProperty,
                SetProperty,
                GetSuper,
                Class,
                Method,
            ),
            closure(Closure),
            byte(GetLocal, SetLocal, GetUpvalue, SetUpvalue, Call),
            jump(Jump, JumpIfFalse, Loop),
            invoke(Invoke, SuperInvoke),
            simple(
                Nil,
                True,
                False,
                Pop,
                Equal,
                Greater,
                Less,
                Add,
                Subtract,
                Multiply,
                Divide,
                Not,
                Negate,
                Print,
                CloseUpvalue,
                Return,
                Inherit,
            ),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, types::Line, value::Value};

    #[test]
    fn test_opcode_size() {
        assert_eq!(std::mem::size_of::<OpCode>(), 1);
    }

    fn create_test_chunk(heap: &mut Heap) -> Chunk {
        let name_id = heap.string_id(&"test_chunk");
        Chunk::new(name_id)
    }

    #[test]
    fn test_constant_management() {
        let mut heap = Heap::new();
        let mut chunk = create_test_chunk(&mut heap);

        let index1 = chunk.make_constant(Value::Bool(true)).unwrap();
        let index2 = chunk.make_constant(Value::Bool(false)).unwrap();

        assert_eq!(*index1, 0);
        assert_eq!(*index2, 1);
        assert_eq!(chunk.constants().len(), 2);
        assert_eq!(*chunk.get_constant(0usize), Value::Bool(true));
        assert_eq!(*chunk.get_constant(1usize), Value::Bool(false));
    }

    #[test]
    fn test_constant_limit() {
        let mut heap = Heap::new();
        let mut chunk = create_test_chunk(&mut heap);

        for i in 0..256 {
            assert_eq!(
                chunk.make_constant(Value::Number(f64::from(i))).map(|c| *c),
                Some(u8::try_from(i).unwrap())
            );
        }
        assert!(chunk.make_constant(Value::Nil).is_none());
    }

    #[test]
    fn test_code_patching() {
        let mut heap = Heap::new();
        let mut chunk = create_test_chunk(&mut heap);

        chunk.write(OpCode::Jump, Line(1));
        let patch_offset = CodeOffset(chunk.code().len());
        chunk.write(0xffu8, Line(1));
        chunk.write(0xffu8, Line(1));

        chunk.patch(patch_offset, 42u8);
        assert_eq!(chunk.code()[1], 42);
    }

    #[test]
    fn test_line_tracking() {
        let mut heap = Heap::new();
        let mut chunk = create_test_chunk(&mut heap);

        chunk.write(OpCode::Nil, Line(1));
        chunk.write(OpCode::Pop, Line(3));
        assert_eq!(chunk.get_line(CodeOffset(0)), Line(1));
        assert_eq!(chunk.get_line(CodeOffset(1)), Line(3));
    }
}
