use std::cell::Cell;
use std::rc::Rc;

use hobby::{Config, Interpreter, RuntimeError};

fn vm(config: Config) -> Interpreter {
    Interpreter::new(Config { print_errors: false, ..config })
}

/// User data whose finalizer bumps a shared counter.
struct Tracked(Rc<Cell<u32>>);

fn finalize(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
    let tracked = vm.get_userdata::<Tracked>(1)?;
    tracked.0.set(tracked.0.get() + 1);
    Ok(false)
}

fn push_tracked(vm: &mut Interpreter, count: &Rc<Cell<u32>>) {
    vm.push_userdata(Tracked(Rc::clone(count)));
    vm.userdata_set_finalizer(finalize).unwrap();
}

#[test]
fn finalizer_runs_once_for_unreachable_userdata() {
    let mut vm = vm(Config::default());
    let count = Rc::new(Cell::new(0));
    push_tracked(&mut vm, &count);
    vm.pop_n(1);

    vm.collect_garbage();
    assert_eq!(count.get(), 1);
    let after_first = vm.live_objects();

    vm.collect_garbage();
    vm.collect_garbage();
    assert_eq!(count.get(), 1);
    assert!(vm.live_objects() < after_first, "finalized userdata should be freed on the next cycle");
}

#[test]
fn reachable_userdata_is_not_finalized() {
    let mut vm = vm(Config::default());
    let count = Rc::new(Cell::new(0));
    push_tracked(&mut vm, &count);
    vm.set_global("handle");
    vm.collect_garbage();
    vm.collect_garbage();
    assert_eq!(count.get(), 0);

    vm.interpret("drop.hby", "handle = null;").unwrap();
    vm.collect_garbage();
    assert_eq!(count.get(), 1);
}

#[test]
fn script_objects_survive_collection() {
    let mut vm = vm(Config { gc_initial_threshold: 8 * 1024, ..Config::default() });
    vm.push_null();
    vm.set_global("keep");
    let source = "
        keep = [];
        for (var i = 0; i < 200; i++) {
            var garbage = {\"i\" -> i, \"s\" -> $\"tmp {i}\"};
            if (i % 10 == 0) keep.push($\"kept {i}\");
        }";
    vm.interpret("keep.hby", source).unwrap();
    vm.collect_garbage();
    let v = vm.interpret("check.hby", "return $\"{keep.len()} {keep[0]} {keep[19]}\";").unwrap();
    assert_eq!(vm.value_str(v), Some("20 kept 0 kept 190"));
    assert!(vm.collections() >= 2);
}

#[test]
fn module_values_stay_rooted() {
    let mut vm = vm(Config::default());
    vm.interpret("mod.hby", "return $\"built {1 + 1}\";").unwrap();
    vm.collect_garbage();
    let v = vm.module("mod.hby").unwrap();
    assert_eq!(vm.value_str(v), Some("built 2"));
}

#[test]
fn stress_mode_runs_whole_programs() {
    let mut vm = vm(Config { gc_stress: true, ..Config::default() });
    let source = "
        struct Node {
            var value = 0;
            var next = null;
        }
        fn build(n) {
            var head = null;
            for (var i = 0; i < n; i++) head = Node { value = i, next = head };
            return head;
        }
        fn sum(list) {
            var total = 0;
            while (list != null) {
                total += list.value;
                list = list.next;
            }
            return total;
        }
        var parts = [];
        for (var i = 0; i < 20; i++) parts.push($\"{i}\");
        var m = {};
        for (var i = 0; i < 20; i++) { var j = i; m[$\"k{i}\"] = fn() -> j; }
        return $\"{sum(build(50))} {parts.join(\",\").len()} {m[\"k7\"]()}\";";
    let v = vm.interpret("stress.hby", source).unwrap();
    assert_eq!(vm.value_str(v), Some("1225 49 7"));
    assert!(vm.collections() > 100);
}

#[test]
fn stress_mode_keeps_userdata_finalizers_single_shot() {
    let mut vm = vm(Config { gc_stress: true, ..Config::default() });
    let count = Rc::new(Cell::new(0));
    for _ in 0..5 {
        push_tracked(&mut vm, &count);
        vm.pop_n(1);
    }
    vm.collect_garbage();
    vm.collect_garbage();
    assert_eq!(count.get(), 5);
}

#[test]
fn threshold_grows_with_live_data() {
    let mut vm = vm(Config { gc_initial_threshold: 4096, ..Config::default() });
    vm.interpret("grow.hby", "var a = []; for (var i = 0; i < 500; i++) a.push($\"s{i}\"); return a;").unwrap();
    assert!(vm.collections() >= 1);
    let collections = vm.collections();
    vm.collect_garbage();
    assert_eq!(vm.collections(), collections + 1);
    assert!(vm.bytes_allocated() > 0);
}

#[test]
fn growing_containers_trigger_collection() {
    let mut vm = vm(Config::default());
    let source = "
        for (var i = 0; i < 50; i++) {
            var a = [];
            for (var j = 0; j < 5000; j++) a.push(j);
        }
        var m = {};
        for (var k = 0; k < 20000; k++) m[k] = k;
        return m.len();";
    let v = vm.interpret("grow.hby", source).unwrap();
    assert_eq!(v.as_number(), Some(20000.0));
    assert!(vm.collections() >= 1, "container growth never reached the collector");
    assert!(vm.bytes_allocated() < 8 * 1024 * 1024);
}

#[test]
fn userdata_size_hint_counts_toward_threshold() {
    let mut vm = vm(Config::default());
    let buffer = vec![0u8; 2 * 1024 * 1024];
    let len = buffer.len();
    vm.push_userdata_sized(buffer, len);
    assert!(vm.bytes_allocated() > len);
    vm.pop_n(1);

    let collections = vm.collections();
    vm.push_map();
    assert_eq!(vm.collections(), collections + 1);
    assert!(vm.bytes_allocated() < len);
}
