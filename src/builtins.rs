// The primordial classes and their host-implemented methods.
//
// Everything user code can reach without loading bytecode is
// installed here, against the classes the Context bootstrap already
// created. Method bodies follow Smalltalk's error convention: a
// misused primitive answers nil, it does not fault the VM.

use crate::context::Context;
use crate::object::{Body, Obj};


pub(crate) fn install(ctx: &mut Context) {
    let object = ctx.object_class;
    let true_class = ctx.true_class;
    let false_class = ctx.false_class;
    let integer = ctx.integer_class;
    let array = ctx.array_class;

    let selectors = [
        (object, "new", new as crate::object::Primitive, 0u8),
        (object, "class", class, 0),
        (object, "subclass:", subclass, 1),
        (
            object,
            "subclass:instanceVariableNames:classVariableNames:",
            subclass_with_variables,
            3,
        ),
        (object, "doesNotUnderstand:", does_not_understand, 1),
        (true_class, "ifTrue:", value_of_argument, 1),
        (true_class, "ifFalse:", nop, 1),
        (false_class, "ifTrue:", nop, 1),
        (false_class, "ifFalse:", value_of_argument, 1),
        (integer, "+", int_add, 1),
        (integer, "-", int_sub, 1),
        (integer, "*", int_mul, 1),
        (integer, "/", int_div, 1),
        (integer, "rawGet", raw_get, 0),
        (integer, "rawSet:", raw_set, 1),
        (array, "new:", array_new, 1),
        (array, "at:", array_at, 1),
        (array, "at:put:", array_at_put, 2),
        (array, "length", array_length, 0),
    ];
    for (class, name, func, argc) in selectors.iter() {
        let selector = ctx.symb(name);
        if let Err(e) = ctx.set_method(*class, selector, *func, *argc) {
            panic!("installing {} failed: {:?}", name, e);
        }
    }

    // Interned up front so conditionals never allocate a symbol
    // mid-send.
    ctx.symb("value");
}


//////////////////////////////////////////////////////////////////////
// Object
//////////////////////////////////////////////////////////////////////

fn new(ctx: &mut Context, receiver: Obj, _argv: &[Obj]) -> Obj {
    ctx.new_instance(receiver)
}

fn class(ctx: &mut Context, receiver: Obj, _argv: &[Obj]) -> Obj {
    ctx.class_of(receiver)
}

fn subclass(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    match ctx.new_subclass(receiver, argv[0], &[]) {
        Ok(class) => class,
        Err(_) => ctx.nil(),
    }
}

// The long form: the second argument is an Array whose slot count
// (not contents) decides how many instance variables get added.
// Class variables are accepted and recorded nowhere, as in the
// original object model.
fn subclass_with_variables(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    let ivar_names = match &ctx.heap.get(argv[1]).body {
        Body::Slots(slots) => slots.to_vec(),
        _ => Vec::new(),
    };
    match ctx.new_subclass(receiver, argv[0], &ivar_names) {
        Ok(class) => class,
        Err(_) => ctx.nil(),
    }
}

fn does_not_understand(ctx: &mut Context, _receiver: Obj, _argv: &[Obj]) -> Obj {
    ctx.nil()
}


//////////////////////////////////////////////////////////////////////
// Booleans
//////////////////////////////////////////////////////////////////////

// ifTrue:/ifFalse: take anything answering `value`; there are no
// block literals yet, so the host supplies such objects.
fn value_of_argument(ctx: &mut Context, _receiver: Obj, argv: &[Obj]) -> Obj {
    let value = ctx.symb("value");
    ctx.send(argv[0], value, &[])
}

fn nop(ctx: &mut Context, _receiver: Obj, _argv: &[Obj]) -> Obj {
    ctx.nil()
}


//////////////////////////////////////////////////////////////////////
// Integer
//////////////////////////////////////////////////////////////////////

fn int_binary(
    ctx: &mut Context,
    receiver: Obj,
    argv: &[Obj],
    apply: fn(i32, i32) -> Option<i32>,
) -> Obj {
    match (ctx.unbox_int(receiver), ctx.unbox_int(argv[0])) {
        (Ok(a), Ok(b)) => match apply(a, b) {
            Some(result) => ctx.integer(result),
            None => ctx.nil(),
        },
        _ => ctx.nil(),
    }
}

fn int_add(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    int_binary(ctx, receiver, argv, |a, b| Some(a.wrapping_add(b)))
}

fn int_sub(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    int_binary(ctx, receiver, argv, |a, b| Some(a.wrapping_sub(b)))
}

fn int_mul(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    int_binary(ctx, receiver, argv, |a, b| Some(a.wrapping_mul(b)))
}

fn int_div(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    int_binary(ctx, receiver, argv, |a, b| a.checked_div(b))
}

// rawGet answers the receiver itself; the host half of the pair is
// Context::unbox_int.
fn raw_get(_ctx: &mut Context, receiver: Obj, _argv: &[Obj]) -> Obj {
    receiver
}

// rawSet: copies the argument's boxed value into the receiver.
fn raw_set(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    let value = match ctx.unbox_int(argv[0]) {
        Ok(value) => value,
        Err(_) => return ctx.nil(),
    };
    match &mut ctx.heap.get_mut(receiver).body {
        Body::Int(slot) => {
            *slot = value;
            receiver
        }
        _ => ctx.nil(),
    }
}


//////////////////////////////////////////////////////////////////////
// Array
//////////////////////////////////////////////////////////////////////

// Array elements are just extra instance slots, so an array's length
// is its slot count.

fn array_new(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    let length = match ctx.unbox_int(argv[0]) {
        Ok(length) if length >= 0 => length as usize,
        _ => return ctx.nil(),
    };
    if !ctx.heap.is_class(receiver) {
        return ctx.nil();
    }
    ctx.new_instance_sized(receiver, length)
}

fn array_element_count(ctx: &Context, receiver: Obj) -> usize {
    match &ctx.heap.get(receiver).body {
        Body::Slots(slots) => slots.len(),
        _ => 0,
    }
}

fn array_at(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    let index = match ctx.unbox_int(argv[0]) {
        Ok(index) if index >= 0 => index as usize,
        _ => return ctx.nil(),
    };
    if index >= array_element_count(ctx, receiver) {
        // Out of bounds answers nil, it does not fault.
        return ctx.nil();
    }
    match ctx.ivar(receiver, index) {
        Ok(value) => value,
        Err(_) => ctx.nil(),
    }
}

fn array_at_put(ctx: &mut Context, receiver: Obj, argv: &[Obj]) -> Obj {
    let index = match ctx.unbox_int(argv[0]) {
        Ok(index) if index >= 0 => index as usize,
        _ => return ctx.nil(),
    };
    if index >= array_element_count(ctx, receiver) {
        return ctx.nil();
    }
    match ctx.set_ivar(receiver, index, argv[1]) {
        Ok(()) => argv[1],
        Err(_) => ctx.nil(),
    }
}

fn array_length(ctx: &mut Context, receiver: Obj, _argv: &[Obj]) -> Obj {
    let length = array_element_count(ctx, receiver) as i32;
    ctx.integer(length)
}
