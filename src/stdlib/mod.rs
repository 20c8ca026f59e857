//! Prelude globals and the method tables of the built-in types.
//!
//! Every entry is an ordinary native function. Methods receive their
//! receiver in slot 0 and their arguments from slot 1.

mod array;
mod map;
mod prelude;
mod string;

use crate::object::{Arity, NativeFn, ObjRef};
use crate::value::Value;
use crate::vm::{ErrorKind, Interpreter, RuntimeError};

/// Name, function and arity of one native.
pub(crate) type Entry = (&'static str, NativeFn, Arity);

/// Installs the prelude globals and fills the `Array`, `String` and `Map`
/// method tables.
pub fn open(vm: &mut Interpreter) {
    for &(name, function, arity) in prelude::GLOBALS {
        vm.push_native(name, function, arity);
        vm.set_global(name);
    }
    let tables = [
        (vm.builtins.array, array::METHODS),
        (vm.builtins.string, string::METHODS),
        (vm.builtins.map, map::METHODS),
    ];
    for (def, methods) in tables {
        add_methods(vm, def, methods);
    }
}

fn add_methods(vm: &mut Interpreter, def: ObjRef, methods: &[Entry]) {
    for &(name, function, arity) in methods {
        let native = vm.new_native(name, function, arity);
        let name = vm.heap.native(native).name;
        let hash = vm.heap.str_hash(name);
        let before = vm.heap.object_size(def);
        vm.heap.struct_def_mut(def).methods.insert(name, hash, Value::object(native));
        vm.grew(def, before);
    }
}

/// Resolves a possibly negative position against `len`. With `inclusive`
/// the position one past the end is also accepted.
pub(crate) fn position(vm: &Interpreter, n: f64, len: usize, inclusive: bool) -> Result<usize, RuntimeError> {
    let mut i = n as i64;
    if i < 0 {
        i += len as i64;
    }
    let limit = if inclusive { len as i64 } else { len as i64 - 1 };
    if i < 0 || i > limit {
        return Err(vm.error(ErrorKind::IndexOutOfBounds));
    }
    Ok(i as usize)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::vm::Interpreter;

    #[test]
    fn stdlib_can_be_disabled() {
        let mut vm = Interpreter::new(Config { stdlib: false, print_errors: false, ..Config::default() });
        assert!(vm.get_global("print").is_err());
        assert!(vm.interpret("t", "return [].len();").is_err());
        // The type structs exist regardless.
        assert!(vm.interpret("t", "return 1 is Number;").is_ok());
    }
}
