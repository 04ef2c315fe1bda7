//! Handles the allocation of all heap resident values.
//!
//! While booleans, `nil` and numbers are stored directly on the stack,
//! all other objects only have references stored there.
//! The actual objects live in the heap.
//!
//! The heap is managed via arenas for each variant of `Value`.
//! Garbage collection occurs via `mark and sweep`.

mod arenas;

use paste::paste;
use rustc_hash::FxHashMap as HashMap;
use std::collections::hash_map::Entry;

use crate::heap::arenas::Arena;
pub use crate::heap::arenas::{
    BoundMethodId, ClassId, ClosureId, FunctionId, InstanceId, NativeFunctionId, StringId,
    UpvalueId,
};
use crate::value::{BoundMethod, Class, Closure, Function, Instance, NativeFunction, Upvalue, Value};

/// Collection of builtin constants that are needed in different parts
/// of the heap or VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltinConstants {
    /// Name of the initializer, `init`.
    pub(super) init_string: StringId,
}

impl BuiltinConstants {
    #[must_use]
    fn new(heap: &mut Heap) -> Self {
        Self {
            init_string: heap.string_id(&"init"),
        }
    }
}

/// Switch to add a `Value` to the gray vector of the correct arena.
///
/// Needs to be a macro because it is used in multiple places and a function
/// runs into issues with the borrow checker.
macro_rules! gray_value {
    ($self:expr, $value:expr) => {
        match $value {
            Value::String(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("String/{:?} gray {}", id, $self.strings[*id]);
                }
                $self.strings.gray.push(*id);
            }
            Value::Function(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Function/{:?} gray {}", id, $self.functions[*id]);
                }
                $self.functions.gray.push(*id);
            }
            Value::Closure(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Closure/{:?} gray {}", id, $self.closures[*id]);
                }
                $self.closures.gray.push(*id);
            }
            Value::Upvalue(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Upvalue/{:?} gray {}", id, $self.upvalues[*id]);
                }
                $self.upvalues.gray.push(*id);
            }
            Value::NativeFunction(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!(
                        "NativeFunction/{:?} gray {}",
                        id, $self.native_functions[*id]
                    );
                }
                $self.native_functions.gray.push(*id);
            }
            Value::Class(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Class/{:?} gray {}", id, $self.classes[*id]);
                }
                $self.classes.gray.push(*id);
            }
            Value::Instance(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("Instance/{:?} gray {}", *id, $self.instances[*id]);
                }
                $self.instances.gray.push(*id);
            }
            Value::BoundMethod(id) => {
                #[cfg(feature = "log_gc")]
                {
                    eprintln!("BoundMethod/{:?} gray {}", id, $self.bound_methods[*id]);
                }
                $self.bound_methods.gray.push(*id);
            }
            Value::Bool(_) | Value::Nil | Value::Number(_) => {}
        }
    };
}

/// Main representation of the heap.
///
/// Heart is multiple arenas, one for each heap resident variant of `Value`.
#[derive(Clone, Debug)]
pub struct Heap {
    builtin_constants: Option<BuiltinConstants>,
    pub(super) strings_by_name: HashMap<String, StringId>,

    pub(super) strings: Arena<StringId, String>,
    functions: Arena<FunctionId, Function>,
    closures: Arena<ClosureId, Closure>,
    upvalues: Arena<UpvalueId, Upvalue>,
    native_functions: Arena<NativeFunctionId, NativeFunction>,
    classes: Arena<ClassId, Class>,
    instances: Arena<InstanceId, Instance>,
    bound_methods: Arena<BoundMethodId, BoundMethod>,

    next_gc: usize,
    pub(super) black_value: bool,
}

impl Heap {
    pub(super) fn new() -> Self {
        let mut heap = Self {
            builtin_constants: None,
            strings_by_name: HashMap::default(),

            strings: Arena::new("String"),
            functions: Arena::new("Function"),
            closures: Arena::new("Closure"),
            upvalues: Arena::new("Upvalue"),
            native_functions: Arena::new("NativeFunction"),
            classes: Arena::new("Class"),
            instances: Arena::new("Instance"),
            bound_methods: Arena::new("BoundMethod"),

            next_gc: 1024 * 1024,
            black_value: true,
        };
        heap.builtin_constants = Some(BuiltinConstants::new(&mut heap));

        heap
    }

    pub(super) fn builtin_constants(&self) -> &BuiltinConstants {
        self.builtin_constants.as_ref().unwrap()
    }

    /// Uniquefy string Ids so that each actual string is mapped to the same Id.
    pub(super) fn string_id<S>(&mut self, s: &S) -> StringId
    where
        S: ToString,
    {
        if let Entry::Occupied(entry) = self.strings_by_name.entry(s.to_string()) {
            return *entry.get();
        }
        let string_val = self.add_string(s.to_string());
        let string_id = string_val.as_string();
        self.strings_by_name.insert(s.to_string(), *string_id);
        *string_id
    }

    const fn bytes_allocated(&self) -> usize {
        self.strings.bytes_allocated()
            + self.functions.bytes_allocated()
            + self.closures.bytes_allocated()
            + self.upvalues.bytes_allocated()
            + self.native_functions.bytes_allocated()
            + self.classes.bytes_allocated()
            + self.instances.bytes_allocated()
            + self.bound_methods.bytes_allocated()
    }

    #[cfg(not(feature = "stress_gc"))]
    pub(super) const fn needs_gc(&self) -> bool {
        self.bytes_allocated() > self.next_gc
    }

    /// Prepare the garbage collection by marking all
    /// values used by the heap itself.
    ///
    /// Currently this is only the interned initializer name.
    pub(super) fn gc_start(&mut self) {
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- gc begin");
        }

        self.strings.gray.push(self.builtin_constants().init_string);
    }

    /// Trace through all reachable values.
    ///
    /// For that repeatedly iterate over all marked values
    /// and mark everything that can be reached by them.
    pub(super) fn trace(&mut self) {
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- trace start");
        }
        while !self.strings.gray.is_empty()
            || !self.functions.gray.is_empty()
            || !self.closures.gray.is_empty()
            || !self.upvalues.gray.is_empty()
            || !self.native_functions.gray.is_empty()
            || !self.classes.gray.is_empty()
            || !self.instances.gray.is_empty()
            || !self.bound_methods.gray.is_empty()
        {
            for index in self.strings.flush_gray() {
                self.blacken_string(index);
            }
            for index in self.functions.flush_gray() {
                self.blacken_function(index);
            }
            for index in self.closures.flush_gray() {
                self.blacken_closure(index);
            }
            for index in self.upvalues.flush_gray() {
                self.blacken_upvalue(index);
            }
            for index in self.native_functions.flush_gray() {
                self.blacken_native_function(index);
            }
            for index in self.classes.flush_gray() {
                self.blacken_class(index);
            }
            for index in self.instances.flush_gray() {
                self.blacken_instance(index);
            }
            for index in self.bound_methods.flush_gray() {
                self.blacken_bound_method(index);
            }
        }
    }

    pub(super) fn mark_value(&mut self, value: &Value) {
        gray_value!(self, value);
    }

    pub(super) fn mark_string(&mut self, id: StringId) {
        self.strings.gray.push(id);
    }

    pub(super) fn mark_closure(&mut self, id: ClosureId) {
        self.closures.gray.push(id);
    }

    pub(super) fn mark_upvalue(&mut self, id: UpvalueId) {
        self.upvalues.gray.push(id);
    }

    /// Strings do not contain anything else.
    fn blacken_string(&mut self, index: StringId) {
        let item = &mut self.strings.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("String/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
    }

    /// Functions contain their own name as well as the constants
    /// in their chunk.
    fn blacken_function(&mut self, index: FunctionId) {
        let item = &mut self.functions.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Function/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let function = &item.item;
        let name = function.name;
        let constants = function.chunk.constants().to_vec();
        self.strings.gray.push(name);
        for constant in &constants {
            gray_value!(self, constant);
        }
    }

    /// Closures store their wrapped function as well as the captured upvalues.
    fn blacken_closure(&mut self, index: ClosureId) {
        let item = &mut self.closures.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Closure/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let closure = &item.item;
        let function = closure.function;
        let upvalues = closure.upvalues.clone();
        self.functions.gray.push(function);
        for upvalue in upvalues {
            self.upvalues.gray.push(upvalue);
        }
    }

    /// Closed upvalues refer to a separate value that has to be marked.
    ///
    /// Open ones point into the stack and do not contain any data that is
    /// stored on the heap.
    fn blacken_upvalue(&mut self, index: UpvalueId) {
        let item = &mut self.upvalues.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Upvalue/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        match &item.item {
            Upvalue::Open(_) => {}
            Upvalue::Closed(value) => {
                let value = *value;
                gray_value!(self, &value);
            }
        }
    }

    /// Native functions only have their name on the heap.
    /// The implementation is directly in Rust.
    fn blacken_native_function(&mut self, index: NativeFunctionId) {
        let item = &mut self.native_functions.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("NativeFunction/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let name = item.item.name;
        self.strings.gray.push(name);
    }

    /// Classes store their name as well as their methods with their names.
    fn blacken_class(&mut self, index: ClassId) {
        let item = &mut self.classes.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Class/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let class = &item.item;
        let name = class.name;
        let methods = class
            .methods
            .iter()
            .map(|(name, method)| (*name, *method))
            .collect::<Vec<_>>();
        self.strings.gray.push(name);
        for (method_name, method) in methods {
            self.strings.gray.push(method_name);
            self.closures.gray.push(method);
        }
    }

    /// Instances store the class they belong to as well as their fields.
    fn blacken_instance(&mut self, index: InstanceId) {
        let item = &mut self.instances.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("Instance/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let instance = &item.item;
        let class = instance.class;
        let fields = instance
            .fields
            .iter()
            .map(|(name, value)| (*name, *value))
            .collect::<Vec<_>>();
        self.classes.gray.push(class);
        for (field_name, field) in fields {
            self.strings.gray.push(field_name);
            gray_value!(self, &field);
        }
    }

    /// Bound methods store the instance they are bound to
    /// as well as the method they are binding.
    fn blacken_bound_method(&mut self, index: BoundMethodId) {
        let item = &mut self.bound_methods.data[index];
        if item.marked == self.black_value {
            return;
        }
        #[cfg(feature = "log_gc")]
        {
            eprintln!("BoundMethod/{index:?} mark {}", item.item);
        }
        item.marked = self.black_value;
        let bound_method = &item.item;
        let receiver = bound_method.receiver;
        let method = bound_method.method;
        gray_value!(self, &receiver);
        self.closures.gray.push(method);
    }

    pub(super) fn sweep(&mut self) {
        #[cfg(feature = "log_gc")]
        eprintln!("-- sweep start");
        #[cfg(feature = "log_gc")]
        let before = self.bytes_allocated();

        // Sweep closures before functions and strings last as
        // the `log_gc` debug output of the former prints the latter.
        self.closures.sweep(self.black_value);
        self.functions.sweep(self.black_value);
        self.bound_methods.sweep(self.black_value);
        self.upvalues.sweep(self.black_value);
        self.native_functions.sweep(self.black_value);
        self.classes.sweep(self.black_value);
        self.instances.sweep(self.black_value);
        self.strings.sweep(self.black_value);

        self.black_value = !self.black_value;

        self.next_gc = self.bytes_allocated() * crate::config::GC_HEAP_GROW_FACTOR;
        #[cfg(feature = "log_gc")]
        {
            eprintln!("-- gc end");
            eprintln!(
                "   collected {} (from {} to {}) next at {}",
                humansize::format_size(before - self.bytes_allocated(), humansize::BINARY),
                humansize::format_size(before, humansize::BINARY),
                humansize::format_size(self.bytes_allocated(), humansize::BINARY),
                humansize::format_size(self.next_gc, humansize::BINARY),
            );
        }
    }

    /// Total number of live objects across all arenas.
    ///
    /// Only used to verify collector behavior in tests.
    #[cfg(test)]
    pub(super) fn object_count(&self) -> usize {
        self.strings.len()
            + self.functions.len()
            + self.closures.len()
            + self.upvalues.len()
            + self.native_functions.len()
            + self.classes.len()
            + self.instances.len()
            + self.bound_methods.len()
    }
}

macro_rules! define_value_methods {
    ($(
        $slot_name:ident => {
            field: $field_name:ident,
            ty: $ty:ty,
            id_ty: $id_ty:ty
        }
    ),* $(,)?) => {
        paste! {
        $(
            // e.g. pub(super) fn add_string(&mut self, value: String) -> Value
            pub(super) fn [<add_$slot_name>](&mut self, value: $ty) -> Value {
                self.$field_name.add(value, self.black_value).into()
            }

            // e.g. pub(super) fn get_string(&self, index: StringId) -> &String
            pub(super) fn [<get_$slot_name>](&self, index: $id_ty) -> &$ty {
                self.$field_name.get(index)
            }

            // e.g. pub(super) fn get_mut_string(&mut self, index: StringId) -> &mut String
            #[allow(dead_code)]
            pub(super) fn [<get_mut_$slot_name>](&mut self, index: $id_ty) -> &mut $ty {
                self.$field_name.get_mut(index)
            }

            // e.g. pub(super) fn string_marked(&self, index: StringId) -> bool
            #[allow(dead_code)]
            pub(super) fn [< $slot_name _marked>](&self, index: $id_ty) -> bool {
                self.$field_name.is_marked(index, self.black_value)
            }
        )*
    }
}}

impl Heap {
    define_value_methods!(
        string => {
            field: strings,
            ty: String,
            id_ty: StringId
        },
        function => {
            field: functions,
            ty: Function,
            id_ty: FunctionId
        },
        closure => {
            field: closures,
            ty: Closure,
            id_ty: ClosureId
        },
        upvalue => {
            field: upvalues,
            ty: Upvalue,
            id_ty: UpvalueId
        },
        native_function => {
            field: native_functions,
            ty: NativeFunction,
            id_ty: NativeFunctionId
        },
        class => {
            field: classes,
            ty: Class,
            id_ty: ClassId
        },
        instance => {
            field: instances,
            ty: Instance,
            id_ty: InstanceId
        },
        bound_method => {
            field: bound_methods,
            ty: BoundMethod,
            id_ty: BoundMethodId
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_interning_returns_same_id() {
        let mut heap = Heap::new();
        let a = heap.string_id(&"hello");
        let b = heap.string_id(&"hello");
        let c = heap.string_id(&"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.get_string(a), "hello");
    }

    #[test]
    fn init_string_is_interned() {
        let mut heap = Heap::new();
        let init = heap.string_id(&"init");
        assert_eq!(heap.builtin_constants().init_string, init);
    }

    fn collect_with_root(heap: &mut Heap, root: StringId) {
        heap.gc_start();
        heap.mark_string(root);
        heap.trace();
        let mut strings_by_name = std::mem::take(&mut heap.strings_by_name);
        strings_by_name.retain(|_, id| heap.strings.is_marked(*id, heap.black_value));
        heap.strings_by_name = strings_by_name;
        heap.sweep();
    }

    #[test]
    fn sweep_frees_unmarked_objects() {
        let mut heap = Heap::new();
        let keep = heap.string_id(&"keep");
        let stale = heap.string_id(&"stale");

        collect_with_root(&mut heap, keep);

        assert_eq!(heap.get_string(keep), "keep");
        assert!(!heap.strings_by_name.contains_key("stale"));
        // The freed id must be reusable without resurrecting the content.
        let fresh = heap.string_id(&"stale");
        assert_ne!(fresh, stale);
    }

    #[test]
    fn repeated_collections_are_stable() {
        let mut heap = Heap::new();
        let keep = heap.string_id(&"stable");

        for _ in 0..2 {
            collect_with_root(&mut heap, keep);
        }

        // Both the builtin init string and the marked root survive.
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.get_string(keep), "stable");
    }
}
