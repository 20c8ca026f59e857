use super::Entry;
use crate::object::Arity;
use crate::vm::{ErrorKind, Interpreter, RuntimeError, ValueType};

pub(super) const GLOBALS: &[Entry] = &[
    ("print", print, Arity::Variadic),
    ("tostr", tostr, Arity::Fixed(1)),
    ("tonum", tonum, Arity::Fixed(1)),
    ("typeof", type_of, Arity::Fixed(1)),
    ("assert", assert, Arity::Variadic),
    ("error", error, Arity::Fixed(1)),
    ("pcall", pcall, Arity::Variadic),
    ("random", random, Arity::Fixed(0)),
];

fn print(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    let mut line = String::new();
    for i in 1..=argc {
        if i > 1 {
            line.push(' ');
        }
        line.push_str(&vm.tostr(i as isize)?);
    }
    println!("{line}");
    Ok(false)
}

fn tostr(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let s = vm.tostr(1)?;
    vm.push_string(s);
    Ok(true)
}

/// Number literal syntax with an optional sign. Rejects the `inf`/`nan`
/// spellings `f64::from_str` would take.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    let valid = match unsigned.split_once('.') {
        Some((int, frac)) => (int.is_empty() || digits(int)) && digits(frac),
        None => digits(unsigned),
    };
    if valid { s.parse().ok() } else { None }
}

fn tonum(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    match vm.value_type(1)? {
        ValueType::Number => vm.push_copy(1)?,
        ValueType::String => match parse_number(vm.get_str(1)?) {
            Some(n) => vm.push_number(n),
            None => vm.push_null(),
        },
        ValueType::Bool => {
            let b = vm.get_bool(1)?;
            vm.push_number(if b { 1.0 } else { 0.0 });
        }
        ValueType::Null => vm.push_number(0.0),
        _ => return Err(vm.error(ErrorKind::Message("Cannot convert given value to number".into()))),
    }
    Ok(true)
}

fn type_of(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let name = vm.value_type(1)?.name();
    vm.push_str(name);
    Ok(true)
}

fn assert(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    if !(1..=2).contains(&argc) {
        return Err(vm.error(ErrorKind::Arity { expected: 2, got: argc }));
    }
    let passed = !vm.value_at(1)?.is_falsey();
    if !passed {
        let message = match argc {
            2 => vm.tostr(2)?,
            _ => "Assertion failed".to_string(),
        };
        return Err(vm.error(ErrorKind::Message(message)));
    }
    Ok(false)
}

fn error(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let message = vm.tostr(1)?;
    Err(vm.error(ErrorKind::Message(message)))
}

/// `pcall(f, args...)` returns `[true, result]` or `[false, message]`.
fn pcall(vm: &mut Interpreter, argc: usize) -> Result<bool, RuntimeError> {
    if argc == 0 {
        return Err(vm.error(ErrorKind::Arity { expected: 1, got: 0 }));
    }
    let outcome = vm.pcall(argc - 1);
    vm.push_array();
    match outcome {
        Ok(()) => {
            vm.push_bool(true);
            vm.array_push()?;
            vm.push_copy(-2)?;
        }
        Err(err) => {
            vm.push_bool(false);
            vm.array_push()?;
            vm.push_string(err.message());
        }
    }
    vm.array_push()?;
    Ok(true)
}

fn random(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    vm.push_number(fastrand::f64());
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

    fn text(source: &str) -> String {
        let mut vm = Interpreter::new(Config { print_errors: false, ..Config::default() });
        let v = vm.interpret("t", source).unwrap();
        vm.heap.as_str(v).unwrap_or("<not a string>").to_string()
    }

    #[test]
    fn conversions() {
        assert_eq!(run("return tonum(\" 42 \");").unwrap(), Value::number(42.0));
        assert_eq!(run("return tonum(\"nope\");").unwrap(), Value::NULL);
        assert_eq!(run("return tonum(\"-2.5\");").unwrap(), Value::number(-2.5));
        assert_eq!(run("return tonum(\".5\");").unwrap(), Value::number(0.5));
        for input in ["inf", "NaN", "infinity", "-inf", "1e3", "1.", "", "--1"] {
            let source = format!("return tonum(\"{input}\");");
            assert_eq!(run(&source).unwrap(), Value::NULL, "tonum({input:?})");
        }
        assert_eq!(run("return tonum(true);").unwrap(), Value::number(1.0));
        assert_eq!(text("return tostr(1.5);"), "1.5");
        assert_eq!(text("return typeof([]) .. typeof(null) .. typeof(print);"), "arraynullnative function");
    }

    #[test]
    fn pcall_catches_script_errors() {
        let source = "
            fn boom(x) { error(\"bad \" .. x); }
            var r = pcall(boom, 7);
            var ok = pcall(fn(a, b) -> a + b, 1, 2);
            return $\"{r[0]} {r[1]} {ok[0]} {ok[1]}\";";
        assert_eq!(text(source), "false bad 7 true 3");
    }

    #[test]
    fn pcall_restores_state_for_following_code() {
        let source = "
            var total = 0;
            for (var i = 0; i < 5; i++) {
                var r = pcall(fn() -> [][i]);
                if (!r[0]) total++;
            }
            return total;";
        assert_eq!(run(source).unwrap(), Value::number(5.0));
    }

    #[test]
    fn assert_and_error_messages() {
        let Err(InterpretError::Runtime(e)) = run("assert(1 == 2, \"math broke\");") else {
            panic!("expected runtime error");
        };
        assert_eq!(e.message(), "math broke");
        let Err(InterpretError::Runtime(e)) = run("assert(false);") else {
            panic!("expected runtime error");
        };
        assert_eq!(e.message(), "Assertion failed");
        assert!(run("assert(true);").is_ok());
    }

    #[test]
    fn random_is_in_unit_range() {
        let v = run("return random();").unwrap().as_number().unwrap();
        assert!((0.0..1.0).contains(&v));
    }
}
