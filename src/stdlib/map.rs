use super::Entry;
use crate::object::{Arity, ObjRef, Object};
use crate::value::Value;
use crate::vm::{ErrorKind, Interpreter, RuntimeError};

pub(super) const METHODS: &[Entry] = &[
    ("len", len, Arity::Fixed(0)),
    ("has", has, Arity::Fixed(1)),
    ("remove", remove, Arity::Fixed(1)),
    ("keys", keys, Arity::Fixed(0)),
    ("clear", clear, Arity::Fixed(0)),
];

fn receiver(vm: &Interpreter) -> Result<ObjRef, RuntimeError> {
    let v = vm.value_at(0)?;
    match v.as_obj() {
        Some(r) if matches!(vm.heap.get(r), Object::Map(_)) => Ok(r),
        _ => Err(vm.error(ErrorKind::Type { expected: "map", got: vm.value_type(0)?.name() })),
    }
}

fn len(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let map = receiver(vm)?;
    let n = vm.heap.map(map).entries.len();
    vm.push_number(n as f64);
    Ok(true)
}

fn has(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let map = receiver(vm)?;
    let key = vm.value_at(1)?;
    let found = vm.heap.map(map).entries.contains(&key, vm.heap.hash_value(key));
    vm.push_bool(found);
    Ok(true)
}

/// Removes `key` and returns its value. Missing keys are an error.
fn remove(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let map = receiver(vm)?;
    let key = vm.value_at(1)?;
    let hash = vm.heap.hash_value(key);
    match vm.heap.map_mut(map).entries.remove(&key, hash) {
        Some(v) => {
            vm.push(v);
            Ok(true)
        }
        None => Err(vm.error(ErrorKind::UndefinedKey)),
    }
}

fn keys(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let map = receiver(vm)?;
    let keys: Vec<Value> = vm.heap.map(map).entries.keys().copied().collect();
    vm.push_array();
    for key in keys {
        vm.push(key);
        vm.array_push()?;
    }
    Ok(true)
}

fn clear(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let map = receiver(vm)?;
    vm.heap.map_mut(map).entries.clear();
    Ok(false)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::value::Value;
    use crate::vm::{InterpretError, Interpreter};

    fn run(source: &str) -> Result<Value, InterpretError> {
        Interpreter::new(Config { print_errors: false, ..Config::default() }).interpret("test", source)
    }

    #[test]
    fn has_remove_and_len() {
        let source = "
            var m = {\"a\" -> 1, 2 -> \"two\"};
            var had = m.has(2);
            var removed = m.remove(\"a\");
            return if (had && !m.has(\"a\")) removed * 10 + m.len() else -1;";
        assert_eq!(run(source).unwrap(), Value::number(11.0));
        let Err(InterpretError::Runtime(e)) = run("var m = {}; m.remove(1);") else {
            panic!("expected runtime error");
        };
        assert_eq!(e.message(), "Undefined map key");
    }

    #[test]
    fn keys_and_clear() {
        let source = "
            var m = {1 -> null, 2 -> null, 3 -> null};
            var ks = m.keys();
            var sum = 0;
            for (var i = 0; i < ks.len(); i++) sum += ks[i];
            m.clear();
            return sum * 10 + m.len();";
        assert_eq!(run(source).unwrap(), Value::number(60.0));
    }
}
