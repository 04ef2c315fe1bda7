/// Report runtime errors with the correct line number and function name.
///
/// Prints the message followed by one line per active frame, innermost
/// first. Macro for borrow checking reasons.
macro_rules! runtime_error {
    ($self:ident, $($arg:expr),* $(,)?) => {
        eprintln!($($arg),*);
        for frame in $self.callstack.iter().rev() {
            let function = frame.closure(&$self.heap).function.to_value(&$self.heap);
            let line = function.chunk.get_line(CodeOffset(frame.ip - 1));
            let name = function.name.to_value(&$self.heap);
            if name == crate::config::SCRIPT_NAME {
                eprintln!("[line {}] in script", *line);
            } else {
                eprintln!("[line {}] in {}()", *line, name);
            }
        }
    };
}
