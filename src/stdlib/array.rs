use super::{Entry, position};
use crate::object::{Arity, ObjRef, Object};
use crate::vm::{ErrorKind, Interpreter, RuntimeError};

pub(super) const METHODS: &[Entry] = &[
    ("len", len, Arity::Fixed(0)),
    ("push", push, Arity::Variadic),
    ("pop", pop, Arity::Fixed(0)),
    ("insert", insert, Arity::Fixed(2)),
    ("remove", remove, Arity::Fixed(1)),
    ("find", find, Arity::Fixed(1)),
    ("join", join, Arity::Variadic),
];

fn receiver(vm: &Interpreter) -> Result<ObjRef, RuntimeError> {
    let v = vm.value_at(0)?;
    match v.as_obj() {
        Some(r) if matches!(vm.heap.get(r), Object::Array(_)) => Ok(r),
        _ => Err(vm.error(ErrorKind::Type { expected: "array", got: vm.value_type(0)?.name() })),
    }
}

fn len(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    let n = vm.heap.array_items(array).len();
    vm.push_number(n as f64);
    Ok(true)
}

fn push(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    let before = vm.heap.object_size(array);
    for i in 1..=argc {
        let v = vm.value_at(i as isize)?;
        vm.heap.array_items_mut(array).push(v);
    }
    vm.grew(array, before);
    Ok(false)
}

fn pop(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    match vm.heap.array_items_mut(array).pop() {
        Some(v) => {
            vm.push(v);
            Ok(true)
        }
        None => Err(vm.error(ErrorKind::IndexOutOfBounds)),
    }
}

fn insert(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    let len = vm.heap.array_items(array).len();
    let at = position(vm, vm.get_number(1)?, len, true)?;
    let v = vm.value_at(2)?;
    let before = vm.heap.object_size(array);
    vm.heap.array_items_mut(array).insert(at, v);
    vm.grew(array, before);
    Ok(false)
}

fn remove(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    let len = vm.heap.array_items(array).len();
    let at = position(vm, vm.get_number(1)?, len, false)?;
    let removed = vm.heap.array_items_mut(array).remove(at);
    vm.push(removed);
    Ok(true)
}

fn find(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let array = receiver(vm)?;
    let needle = vm.value_at(1)?;
    let found = vm.heap.array_items(array).iter().position(|&v| v == needle);
    vm.push_number(found.map_or(-1.0, |i| i as f64));
    Ok(true)
}

/// `join(sep?)`: string forms of the elements, separated by `sep`.
fn join(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    if argc > 1 {
        return Err(vm.error(ErrorKind::Arity { expected: 1, got: argc }));
    }
    let array = receiver(vm)?;
    let sep = vm.opt_str(1)?.unwrap_or("").to_string();
    let mut out = String::new();
    let mut i = 0;
    // Elements are re-read each step; a `tostr` method may modify the array.
    while let Some(&item) = vm.heap.array_items(array).get(i) {
        if i > 0 {
            out.push_str(&sep);
        }
        vm.push(item);
        let s = vm.tostr(-1)?;
        vm.pop_n(1);
        out.push_str(&s);
        i += 1;
    }
    vm.push_string(out);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::value::Value;
    use crate::vm::{InterpretError, Interpreter};

    fn run(source: &str) -> Result<Value, InterpretError> {
        Interpreter::new(Config { print_errors: false, ..Config::default() }).interpret("test", source)
    }

    fn number(source: &str) -> f64 {
        run(source).unwrap().as_number().unwrap()
    }

    #[test]
    fn push_pop_and_len() {
        assert_eq!(number("var a = []; a.push(1, 2, 3); a.pop(); return a.len();"), 2.0);
        assert_eq!(number("var a = [4]; return a.pop();"), 4.0);
        assert!(run("[].pop();").is_err());
    }

    #[test]
    fn insert_and_remove() {
        assert_eq!(number("var a = [1, 3]; a.insert(1, 2); a.insert(3, 4); return a[1] * 10 + a[3];"), 24.0);
        assert_eq!(number("var a = [1, 2, 3]; var r = a.remove(-1); return r * 10 + a.len();"), 32.0);
        assert!(run("var a = [1]; a.insert(3, 0);").is_err());
    }

    #[test]
    fn find_uses_equality() {
        assert_eq!(number("return [\"a\", \"b\"].find(\"b\");"), 1.0);
        assert_eq!(number("return [1, 2].find(3);"), -1.0);
    }

    #[test]
    fn join_stringifies_elements() {
        let mut vm = Interpreter::new(Config::default());
        let v = vm.interpret("t", "return [1, \"x\", true, null].join(\", \");").unwrap();
        assert_eq!(vm.heap.as_str(v), Some("1, x, true, null"));
        let v = vm.interpret("u", "return [1, 2].join();").unwrap();
        assert_eq!(vm.heap.as_str(v), Some("12"));
    }
}
