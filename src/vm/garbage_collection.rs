use super::VM;

impl VM {
    /// Call the heap garbage collector.
    ///
    /// Returns early if no gc is needed because the heap is still small.
    /// Marks all the roots that can be reached from the VM:
    /// - the value stack
    /// - the closures of all active frames
    /// - the open upvalues
    /// - the globals (names and values)
    ///
    /// The heap itself additionally roots the interned `init` string.
    ///
    /// Traces all the references from the roots, removes unmarked strings
    /// from the intern table and finally sweeps the arenas.
    pub(super) fn collect_garbage(&mut self) {
        #[cfg(not(feature = "stress_gc"))]
        if !self.heap.needs_gc() {
            return;
        }

        self.heap.gc_start();

        // Mark roots
        #[cfg(feature = "log_gc")]
        eprintln!("Marking stack values.");
        for value in &self.stack {
            self.heap.mark_value(value);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking callstack closures.");
        for frame in self.callstack.iter() {
            self.heap.mark_closure(frame.closure);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking open upvalues.");
        for upvalue in &self.open_upvalues {
            self.heap.mark_upvalue(*upvalue);
        }
        #[cfg(feature = "log_gc")]
        eprintln!("Marking globals.");
        for (name, value) in &self.globals {
            self.heap.mark_string(*name);
            self.heap.mark_value(value);
        }

        // Trace references
        self.heap.trace();

        // Remove unmarked strings from the intern table so that the sweep
        // does not leave dangling entries behind.
        let mut strings_by_name = std::mem::take(&mut self.heap.strings_by_name);
        strings_by_name.retain(|_, string_id| {
            #[cfg(feature = "log_gc")]
            if !string_id.marked(&self.heap) {
                eprintln!(
                    "String/{:?} free from strings by name {}",
                    string_id,
                    string_id.to_value(&self.heap)
                );
            }
            string_id.marked(&self.heap)
        });
        self.heap.strings_by_name = strings_by_name;

        // Finally, sweep
        self.heap.sweep();
    }
}
