// Mark and sweep.
//
// Roots are the operand stack (which includes every push_locals
// slot), both sides of the global scope, and anything flagged
// Preserve. Marking chases the class handle, the super chain, ivar
// slots, and class metadata. The sweep hands unmarked slots back to
// the heap pool; handles to survivors are untouched, so host code
// only has to keep its objects reachable, not re-read them.

use crate::context::Context;
use crate::object::{Body, GcFlag, Obj};


pub(crate) fn collect(ctx: &mut Context) {
    if ctx.gc_paused > 0 {
        trace!("gc: paused, skipping");
        return;
    }
    let before = ctx.heap.live_objects();
    mark(ctx);
    sweep(ctx);
    trace!(
        "gc: {} live before, {} after, {} bytes in use",
        before,
        ctx.heap.live_objects(),
        ctx.heap.bytes_in_use()
    );
}


fn mark(ctx: &mut Context) {
    let mut worklist: Vec<Obj> = Vec::new();
    worklist.extend(ctx.stack.iter().copied());
    ctx.globals.for_each(|symbol, value| {
        worklist.push(*symbol);
        worklist.push(*value);
    });
    ctx.heap.scan(|obj, object| {
        if object.mask.contains(GcFlag::Preserve) {
            worklist.push(obj);
        }
    });

    while let Some(obj) = worklist.pop() {
        if obj == Obj::NULL {
            continue;
        }
        let object = ctx.heap.get_mut(obj);
        if object.mask.contains(GcFlag::Marked) {
            continue;
        }
        object.mask.insert(GcFlag::Marked);
        worklist.push(object.class);
        match &object.body {
            Body::Slots(slots) => worklist.extend(slots.iter().copied()),
            Body::Int(_) => {}
            Body::Class(class) => {
                if let Some(super_class) = class.super_class {
                    worklist.push(super_class);
                }
                worklist.push(class.name);
                worklist.extend(class.ivar_names.iter().copied());
                class.methods.for_each(|selector, _| {
                    worklist.push(*selector);
                });
            }
        }
    }
}


fn sweep(ctx: &mut Context) {
    let mut victims: Vec<Obj> = Vec::new();
    ctx.heap.scan(|obj, object| {
        if !object.mask.contains(GcFlag::Marked)
            && !object.mask.contains(GcFlag::Preserve)
        {
            victims.push(obj);
        }
    });
    for &obj in victims.iter() {
        // Dropping a class record drops its method table with it.
        ctx.heap.free(obj);
    }
    ctx.heap.scan_mut(|_, object| {
        object.mask.remove(GcFlag::Marked);
    });
}


#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;

    fn ctx() -> Context {
        Context::new(Config::default())
    }

    #[test]
    fn test_collect_reclaims_garbage() {
        let mut ctx = ctx();
        let class = {
            let object = ctx.object_class;
            let name = ctx.symb("Scratch");
            ctx.new_subclass(object, name, &[]).unwrap()
        };
        let name = ctx.symb("Scratch");
        ctx.set_global(name, class);

        let baseline = ctx.live_objects();
        for _ in 0..10 {
            ctx.new_instance(class);
        }
        assert_eq!(ctx.live_objects(), baseline + 10);

        // Nothing roots those instances.
        ctx.gc_run();
        assert_eq!(ctx.live_objects(), baseline);
    }

    #[test]
    fn test_rooted_objects_survive() {
        let mut ctx = ctx();
        let class = {
            let object = ctx.object_class;
            let name = ctx.symb("Kept");
            ctx.new_subclass(object, name, &[]).unwrap()
        };
        let keep = ctx.symb("keep");
        let instance = ctx.new_instance(class);
        ctx.set_global(keep, instance);

        ctx.gc_run();
        assert_eq!(ctx.get_global(keep), instance);
        assert_eq!(ctx.class_of(instance), class);
    }

    #[test]
    fn test_locals_are_roots() {
        let mut ctx = ctx();
        let locals = ctx.push_locals(1);
        let boxed = ctx.integer(42);
        ctx.set_local(locals, 0, boxed);

        ctx.gc_run();
        let survivor = ctx.local(locals, 0);
        assert_eq!(ctx.unbox_int(survivor), Ok(42));
        ctx.pop_locals();

        // Unrooted now; the next cycle takes it.
        let live = ctx.live_objects();
        ctx.gc_run();
        assert_eq!(ctx.live_objects(), live - 1);
    }

    #[test]
    fn test_preserve_and_release() {
        let mut ctx = ctx();
        let boxed = ctx.integer(7);
        ctx.gc_preserve(boxed);
        ctx.gc_run();
        assert_eq!(ctx.unbox_int(boxed), Ok(7));

        ctx.gc_release(boxed);
        let live = ctx.live_objects();
        ctx.gc_run();
        assert_eq!(ctx.live_objects(), live - 1);
    }

    #[test]
    fn test_pause_suppresses_collection() {
        let mut ctx = ctx();
        ctx.gc_pause();
        let live = ctx.live_objects();
        ctx.integer(1);
        ctx.gc_run();
        assert_eq!(ctx.live_objects(), live + 1);

        ctx.gc_resume();
        ctx.gc_run();
        assert_eq!(ctx.live_objects(), live);
    }

    #[test]
    fn test_repeated_cycles_are_stable() {
        let mut ctx = ctx();
        let keep = ctx.symb("keep");
        let array = {
            let class = ctx.array_class;
            let instance = ctx.new_instance_sized(class, 4);
            instance
        };
        ctx.set_global(keep, array);
        let t = ctx.true_obj();
        ctx.set_ivar(array, 2, t).unwrap();

        let live_after_one = {
            ctx.gc_run();
            ctx.live_objects()
        };
        for _ in 0..5 {
            ctx.gc_run();
        }
        assert_eq!(ctx.live_objects(), live_after_one);
        assert_eq!(ctx.ivar(array, 2), Ok(t));
    }
}
