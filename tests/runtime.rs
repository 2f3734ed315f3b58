// End-to-end tests against the host API, one scenario per original
// embedder use case: classes, integers, arrays, instance variables,
// collection, and symbols.

use utalk::{Config, Context};


fn ctx() -> Context {
    Context::new(Config::default())
}


#[test]
fn test_subclass_and_instantiate() {
    let mut ctx = ctx();
    let object_symb = ctx.symb("Object");
    let subclass_symb = ctx.symb("subclass:");
    let class_symb = ctx.symb("class");
    let new_symb = ctx.symb("new");
    let widget_name = ctx.symb("Widget");

    let object_class = ctx.get_global(object_symb);
    let widget_class = ctx.send(object_class, subclass_symb, &[widget_name]);
    let widget = ctx.send(widget_class, new_symb, &[]);

    assert_eq!(ctx.send(widget, class_symb, &[]), widget_class);
    assert_eq!(ctx.class_of(widget), widget_class);
    assert_eq!(ctx.super_of(widget), object_class);
}


#[test]
fn test_integer_arithmetic() {
    let mut ctx = ctx();
    let integer_symb = ctx.symb("Integer");
    let new_symb = ctx.symb("new");
    let raw_set = ctx.symb("rawSet:");
    let raw_get = ctx.symb("rawGet");

    let integer_class = ctx.get_global(integer_symb);
    let locals = ctx.push_locals(2);

    let a = ctx.send(integer_class, new_symb, &[]);
    ctx.set_local(locals, 0, a);
    let six = ctx.integer(6);
    ctx.send(a, raw_set, &[six]);

    let b = ctx.send(integer_class, new_symb, &[]);
    ctx.set_local(locals, 1, b);
    let three = ctx.integer(3);
    ctx.send(b, raw_set, &[three]);

    for (selector, expected) in &[("+", 9), ("-", 3), ("*", 18), ("/", 2)] {
        let selector = ctx.symb(selector);
        let result = ctx.send(a, selector, &[b]);
        let raw = ctx.send(result, raw_get, &[]);
        assert_eq!(ctx.unbox_int(raw), Ok(*expected));
    }
    ctx.pop_locals();
}


#[test]
fn test_integer_raw_round_trip() {
    let mut ctx = ctx();
    let raw_set = ctx.symb("rawSet:");
    let raw_get = ctx.symb("rawGet");
    let locals = ctx.push_locals(1);
    let boxed = ctx.integer(0);
    ctx.set_local(locals, 0, boxed);

    for k in &[0, 1, -1, 42, -80000, i32::min_value(), i32::max_value()] {
        let arg = ctx.integer(*k);
        ctx.send(boxed, raw_set, &[arg]);
        let read = ctx.send(boxed, raw_get, &[]);
        assert_eq!(ctx.unbox_int(read), Ok(*k));
    }
    ctx.pop_locals();
}


#[test]
fn test_array_at_put() {
    let mut ctx = ctx();
    let array_symb = ctx.symb("Array");
    let new_sized = ctx.symb("new:");
    let at = ctx.symb("at:");
    let at_put = ctx.symb("at:put:");
    let length = ctx.symb("length");
    let raw_get = ctx.symb("rawGet");

    let array_class = ctx.get_global(array_symb);
    let locals = ctx.push_locals(1);
    let ten = ctx.integer(10);
    let array = ctx.send(array_class, new_sized, &[ten]);
    ctx.set_local(locals, 0, array);

    let len = ctx.send(array, length, &[]);
    let raw = ctx.send(len, raw_get, &[]);
    assert_eq!(ctx.unbox_int(raw), Ok(10));

    // Out of bounds answers nil.
    let oob = ctx.integer(10);
    assert_eq!(ctx.send(array, at, &[oob]), ctx.nil());

    let five = ctx.integer(5);
    let t = ctx.true_obj();
    ctx.send(array, at_put, &[five, t]);
    let five = ctx.integer(5);
    assert_eq!(ctx.send(array, at, &[five]), t);

    // A slot never written still answers nil.
    let six = ctx.integer(6);
    assert_eq!(ctx.send(array, at, &[six]), ctx.nil());
    ctx.pop_locals();
}


#[test]
fn test_subclass_with_instance_variables() {
    let mut ctx = ctx();
    let object_symb = ctx.symb("Object");
    let new_symb = ctx.symb("new");
    let new_sized = ctx.symb("new:");
    let array_symb = ctx.symb("Array");
    let long_subclass =
        ctx.symb("subclass:instanceVariableNames:classVariableNames:");

    let object_class = ctx.get_global(object_symb);
    let array_class = ctx.get_global(array_symb);
    let locals = ctx.push_locals(3);

    let one = ctx.integer(1);
    let ivar_names = ctx.send(array_class, new_sized, &[one]);
    ctx.set_local(locals, 0, ivar_names);
    let one = ctx.integer(1);
    let cvar_names = ctx.send(array_class, new_sized, &[one]);
    ctx.set_local(locals, 1, cvar_names);

    let name = ctx.symb("Pointy");
    let subc = ctx.send(
        object_class,
        long_subclass,
        &[name, ivar_names, cvar_names],
    );
    ctx.set_local(locals, 2, subc);
    let instance = ctx.send(subc, new_symb, &[]);

    // One instance-variable slot was allocated, initialized to nil.
    assert_eq!(ctx.ivar(instance, 0), Ok(ctx.nil()));
    let t = ctx.true_obj();
    ctx.set_ivar(instance, 0, t).unwrap();
    assert_eq!(ctx.ivar(instance, 0), Ok(t));
    assert!(ctx.ivar(instance, 1).is_err());
    ctx.pop_locals();
}


#[test]
fn test_gc_preserves_reachable_state() {
    let mut ctx = ctx();
    let array_symb = ctx.symb("Array");
    let new_sized = ctx.symb("new:");
    let at = ctx.symb("at:");
    let at_put = ctx.symb("at:put:");

    let array_class = ctx.get_global(array_symb);
    let locals = ctx.push_locals(1);

    // arr := Array new: 10. arr at: 3 put: true.
    let ten = ctx.integer(10);
    let array = ctx.send(array_class, new_sized, &[ten]);
    ctx.set_local(locals, 0, array);
    let three = ctx.integer(3);
    let t = ctx.true_obj();
    ctx.send(array, at_put, &[three, t]);

    ctx.gc_run();

    // The rooted array still holds true at index 3.
    let array = ctx.local(locals, 0);
    let three = ctx.integer(3);
    assert_eq!(ctx.send(array, at, &[three]), ctx.true_obj());
    ctx.pop_locals();
}


#[test]
fn test_symbol_identity_and_round_trip() {
    let mut ctx = ctx();
    let foo1 = ctx.symb("foo");
    let foo2 = ctx.symb("foo");
    let bar = ctx.symb("bar");

    assert_eq!(foo1, foo2);
    assert_ne!(foo1, bar);
    assert_eq!(ctx.symbol_name(foo1).as_deref(), Some("foo"));
    assert_eq!(ctx.symbol_name(bar).as_deref(), Some("bar"));
}


#[test]
fn test_globals_round_trip() {
    let mut ctx = ctx();
    let key = ctx.symb("thing");
    let value = ctx.integer(5);
    ctx.gc_preserve(value);

    ctx.set_global(key, value);
    assert_eq!(ctx.get_global(key), value);

    let nil = ctx.nil();
    ctx.set_global(key, nil);
    assert_eq!(ctx.get_global(key), nil);
}


#[test]
fn test_method_lookup_picks_closest_override() {
    let mut ctx = ctx();
    let object_symb = ctx.symb("Object");
    let subclass_symb = ctx.symb("subclass:");
    let new_symb = ctx.symb("new");
    let poke = ctx.symb("poke");

    fn answer_true(
        ctx: &mut Context,
        _receiver: utalk::Obj,
        _argv: &[utalk::Obj],
    ) -> utalk::Obj {
        ctx.true_obj()
    }
    fn answer_false(
        ctx: &mut Context,
        _receiver: utalk::Obj,
        _argv: &[utalk::Obj],
    ) -> utalk::Obj {
        ctx.false_obj()
    }

    let object_class = ctx.get_global(object_symb);
    let base_name = ctx.symb("Base");
    let base = ctx.send(object_class, subclass_symb, &[base_name]);
    ctx.set_global(base_name, base);
    let derived_name = ctx.symb("Derived");
    let derived = ctx.send(base, subclass_symb, &[derived_name]);
    ctx.set_global(derived_name, derived);

    ctx.set_method(base, poke, answer_true, 0).unwrap();

    // Inherited until overridden.
    let locals = ctx.push_locals(2);
    let d = ctx.send(derived, new_symb, &[]);
    ctx.set_local(locals, 0, d);
    let b = ctx.send(base, new_symb, &[]);
    ctx.set_local(locals, 1, b);
    assert_eq!(ctx.send(d, poke, &[]), ctx.true_obj());

    ctx.set_method(derived, poke, answer_false, 0).unwrap();
    assert_eq!(ctx.send(d, poke, &[]), ctx.false_obj());
    assert_eq!(ctx.send(b, poke, &[]), ctx.true_obj());
    ctx.pop_locals();
}


#[test]
fn test_execute_blob_from_disk_format() {
    let mut ctx = ctx();
    // Object subclass: #Widget; Widget blah (compiled, answers nil).
    let mut bytes = Vec::new();
    for name in &["Object", "subclass:", "Widget", "blah", "new"] {
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
    }
    bytes.push(0);
    bytes.extend_from_slice(&[
        13, 2, 0,                   // PUSHSYMBOL #Widget
        8, 0, 0,                    // GETGLOBAL Object
        12, 1, 0,                   // SENDMSG subclass:
        4,                          // DUP
        9, 2, 0,                    // SETGLOBAL Widget
        14, 3, 0, 0, 2, 0, 0, 0,    // SETMETHOD blah, argc 0, body 2
        0, 7,                       // PUSHNIL; RETURN
        8, 2, 0,                    // GETGLOBAL Widget
        12, 4, 0,                   // SENDMSG new
        12, 3, 0,                   // SENDMSG blah
        5,                          // POP
    ]);

    let code = ctx.load(&bytes).expect("load failed");
    ctx.execute(code, 0).expect("execute failed");
    assert_eq!(ctx.stack_depth(), 0);

    let widget_name = ctx.symb("Widget");
    let widget = ctx.get_global(widget_name);
    let object_name = ctx.symb("Object");
    assert_eq!(ctx.super_of(widget), ctx.get_global(object_name));
}
