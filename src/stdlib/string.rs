use super::{Entry, position};
use crate::object::Arity;
use crate::vm::{ErrorKind, Interpreter, RuntimeError};

pub(super) const METHODS: &[Entry] = &[
    ("len", len, Arity::Fixed(0)),
    ("upper", upper, Arity::Fixed(0)),
    ("lower", lower, Arity::Fixed(0)),
    ("find", find, Arity::Fixed(1)),
    ("sub", sub, Arity::Variadic),
];

fn len(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let n = vm.get_str(0)?.chars().count();
    vm.push_number(n as f64);
    Ok(true)
}

fn upper(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let s = vm.get_str(0)?.to_uppercase();
    vm.push_string(s);
    Ok(true)
}

fn lower(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let s = vm.get_str(0)?.to_lowercase();
    vm.push_string(s);
    Ok(true)
}

/// Character index of the first occurrence of the argument, or -1.
fn find(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let needle = vm.tostr(1)?;
    let hay = vm.get_str(0)?;
    let found = hay.find(needle.as_str()).map(|byte| hay[..byte].chars().count());
    vm.push_number(found.map_or(-1.0, |i| i as f64));
    Ok(true)
}

/// `sub(start, end?)`: characters from `start` up to, not including, `end`.
/// Both may be negative; `end` defaults to the length.
fn sub(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    if !(1..=2).contains(&argc) {
        return Err(vm.error(ErrorKind::Arity { expected: 2, got: argc }));
    }
    let count = vm.get_str(0)?.chars().count();
    let start = position(vm, vm.get_number(1)?, count, true)?;
    let end = match vm.opt_number(2)? {
        Some(n) => position(vm, n, count, true)?,
        None => count,
    };
    if end < start {
        return Err(vm.error(ErrorKind::IndexOutOfBounds));
    }
    let s: String = vm.get_str(0)?.chars().skip(start).take(end - start).collect();
    vm.push_string(s);
    Ok(true)
}
