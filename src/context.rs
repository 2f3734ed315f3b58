// The Context: one image, one thread, one of everything.
//
// A Context owns the object heap, the symbol registry, the global
// scope, the operand stack, and every loaded Code block. All host
// interaction goes through methods on it. Potential collection
// points are: instance allocation, interning a new symbol, and any
// message send. A raw Obj handle held by host code stays valid only
// while the object is reachable from a root (the operand stack,
// including push_locals slots, or a global).

use crate::builtins;
use crate::config::Config;
use crate::gc;
use crate::object::{Body, Class, GcFlag, Heap, Method, Obj, Object, Primitive};
use crate::symbol::SymbolRegistry;
use crate::tree::Tree;
use crate::vm::{self, Code, CodeId};
use crate::{Error, Result};
use enumflags2::BitFlags;


pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) symbols: SymbolRegistry,
    pub(crate) globals: Tree<Obj, Obj>,
    pub(crate) codes: Vec<Code>,
    pub(crate) stack: Vec<Obj>,
    locals: Vec<usize>,
    pub(crate) gc_paused: u32,
    config: Config,

    nil_obj: Obj,
    true_obj: Obj,
    false_obj: Obj,
    pub(crate) object_class: Obj,
    pub(crate) symbol_class: Obj,
    pub(crate) integer_class: Obj,
    pub(crate) array_class: Obj,
    pub(crate) true_class: Obj,
    pub(crate) false_class: Obj,
    pub(crate) mnu_class: Obj,
}


// A window of rooted scratch slots on the operand stack, for host
// code that holds objects across collection points.
#[derive(Copy, Clone, Debug)]
pub struct Locals {
    base: usize,
    count: usize,
}


impl Context {
    pub fn new(config: Config) -> Context {
        let mut ctx = Context {
            heap: Heap::new(config.heap_capacity),
            symbols: SymbolRegistry::new(),
            globals: Tree::new(),
            codes: Vec::new(),
            stack: Vec::with_capacity(config.stack_capacity),
            locals: Vec::new(),
            gc_paused: 0,
            config,
            nil_obj: Obj::NULL,
            true_obj: Obj::NULL,
            false_obj: Obj::NULL,
            object_class: Obj::NULL,
            symbol_class: Obj::NULL,
            integer_class: Obj::NULL,
            array_class: Obj::NULL,
            true_class: Obj::NULL,
            false_class: Obj::NULL,
            mnu_class: Obj::NULL,
        };
        ctx.bootstrap();
        ctx
    }

    // Tie the primordial knot. Object and Symbol are built by hand
    // because interning needs the Symbol class and everything needs
    // Object; after that the ordinary paths work.
    fn bootstrap(&mut self) {
        self.object_class = self.raw_class(None, Obj::NULL, 0, Vec::new());
        self.symbol_class =
            self.raw_class(Some(self.object_class), Obj::NULL, 0, Vec::new());
        self.gc_preserve(self.object_class);
        self.gc_preserve(self.symbol_class);

        let object_name = self.symb("Object");
        let symbol_name = self.symb("Symbol");
        if let Some(class) = self.heap.as_class_mut(self.object_class) {
            class.name = object_name;
        }
        if let Some(class) = self.heap.as_class_mut(self.symbol_class) {
            class.name = symbol_name;
        }
        self.set_global(object_name, self.object_class);
        self.set_global(symbol_name, self.symbol_class);

        let undefined = self.define_class(self.object_class, "UndefinedObject");
        self.nil_obj = self.new_instance(undefined);
        self.gc_preserve(self.nil_obj);

        let boolean = self.define_class(self.object_class, "Boolean");
        self.true_class = self.define_class(boolean, "True");
        self.false_class = self.define_class(boolean, "False");
        self.true_obj = self.new_instance(self.true_class);
        self.false_obj = self.new_instance(self.false_class);
        self.gc_preserve(self.true_obj);
        self.gc_preserve(self.false_obj);

        self.integer_class = self.define_class(self.object_class, "Integer");
        self.array_class = self.define_class(self.object_class, "Array");

        let receiver_name = self.symb("receiver");
        let selector_name = self.symb("selector");
        let mnu_name = self.symb("MessageNotUnderstood");
        let mnu = self.raw_class(
            Some(self.object_class),
            mnu_name,
            2,
            vec![receiver_name, selector_name],
        );
        self.gc_preserve(mnu);
        self.set_global(mnu_name, mnu);
        self.mnu_class = mnu;

        builtins::install(self);
    }

    // Allocate a class object and point its class handle at itself.
    fn raw_class(
        &mut self,
        super_class: Option<Obj>,
        name: Obj,
        ivar_count: usize,
        ivar_names: Vec<Obj>,
    ) -> Obj {
        let class = Class {
            super_class,
            name,
            methods: Tree::new(),
            ivar_count,
            ivar_names: ivar_names.into_boxed_slice(),
            instance_size: Class::instance_footprint(ivar_count),
        };
        let obj = self.alloc_object(Obj::NULL, Body::Class(Box::new(class)));
        self.heap.get_mut(obj).class = obj;
        obj
    }

    // Bootstrap shorthand: named, preserved, registered subclass.
    fn define_class(&mut self, parent: Obj, name: &str) -> Obj {
        let name = self.symb(name);
        let class = match self.new_subclass(parent, name, &[]) {
            Ok(class) => class,
            Err(e) => panic!("bootstrap subclass failed: {:?}", e),
        };
        self.gc_preserve(class);
        self.set_global(name, class);
        class
    }

    // Allocation of a body whose size the class does not fix:
    // arrays, class records, host-boxed integers.
    pub(crate) fn alloc_object(&mut self, class: Obj, body: Body) -> Obj {
        let size = Heap::footprint(&body);
        self.alloc_object_sized(class, body, size)
    }

    // Every object allocation funnels through here; the byte charge
    // against heap_capacity is the collection trigger.
    pub(crate) fn alloc_object_sized(
        &mut self,
        class: Obj,
        body: Body,
        size: usize,
    ) -> Obj {
        if self.gc_paused == 0 && self.heap.would_exceed(size) {
            gc::collect(self);
        }
        self.heap.alloc(
            Object {
                class,
                mask: BitFlags::empty(),
                body,
            },
            size,
        )
    }

    //////////////////////////////////////////////////////////////
    // Object model
    //////////////////////////////////////////////////////////////

    // Answer a fresh instance of `class`, every slot nil, charged at
    // the class's recorded instance_size. A non-class receiver
    // answers nil (user error, not a fault).
    pub fn new_instance(&mut self, class: Obj) -> Obj {
        let (count, size) = match self.heap.as_class(class) {
            Some(c) => (c.ivar_count, c.instance_size),
            None => return self.nil_obj,
        };
        if class == self.integer_class {
            return self.alloc_object_sized(class, Body::Int(0), size);
        }
        let nil = self.nil_obj;
        let slots = vec![nil; count].into_boxed_slice();
        self.alloc_object_sized(class, Body::Slots(slots), size)
    }

    // Instance with extra slots beyond the class's own: arrays.
    pub(crate) fn new_instance_sized(&mut self, class: Obj, slots: usize) -> Obj {
        let nil = self.nil_obj;
        let slots = vec![nil; slots].into_boxed_slice();
        self.alloc_object(class, Body::Slots(slots))
    }

    pub fn new_subclass(
        &mut self,
        parent: Obj,
        name: Obj,
        added_ivar_names: &[Obj],
    ) -> Result<Obj> {
        let (count, mut names) = match self.heap.as_class(parent) {
            Some(c) => (c.ivar_count, c.ivar_names.to_vec()),
            None => return Err(Error::NotAClass),
        };
        names.extend_from_slice(added_ivar_names);
        let count = count + added_ivar_names.len();
        Ok(self.raw_class(Some(parent), name, count, names))
    }

    pub fn class_of(&self, obj: Obj) -> Obj {
        self.heap.class_of(obj)
    }

    // The superclass of the receiver's class; nil at the root. For a
    // class receiver this is its own superclass, since a class is
    // its own class.
    pub fn super_of(&self, obj: Obj) -> Obj {
        let class = self.heap.class_of(obj);
        match self.heap.as_class(class).and_then(|c| c.super_class) {
            Some(super_class) => super_class,
            None => self.nil_obj,
        }
    }

    pub fn ivar(&self, obj: Obj, index: usize) -> Result<Obj> {
        match &self.heap.get(obj).body {
            Body::Slots(slots) if index < slots.len() => Ok(slots[index]),
            Body::Slots(slots) => Err(Error::IvarBounds {
                index,
                count: slots.len(),
            }),
            _ => Err(Error::IvarBounds { index, count: 0 }),
        }
    }

    pub fn set_ivar(&mut self, obj: Obj, index: usize, value: Obj) -> Result<()> {
        match &mut self.heap.get_mut(obj).body {
            Body::Slots(slots) if index < slots.len() => {
                slots[index] = value;
                Ok(())
            }
            Body::Slots(slots) => Err(Error::IvarBounds {
                index,
                count: slots.len(),
            }),
            _ => Err(Error::IvarBounds { index, count: 0 }),
        }
    }

    //////////////////////////////////////////////////////////////
    // Symbols and globals
    //////////////////////////////////////////////////////////////

    pub fn symb(&mut self, name: &str) -> Obj {
        if let Some(symbol) = self.symbols.find(name) {
            return symbol;
        }
        let class = self.symbol_class;
        let symbol = self.alloc_object(class, Body::Slots(Box::new([])));
        self.heap.get_mut(symbol).mask.insert(GcFlag::Preserve);
        self.symbols.define(name, symbol);
        symbol
    }

    pub fn symbol_name(&self, symbol: Obj) -> Option<String> {
        self.symbols.name_of(symbol)
    }

    // An absent global is nil, not an error.
    pub fn get_global(&mut self, symbol: Obj) -> Obj {
        match self.globals.get(&symbol) {
            Some(value) => *value,
            None => self.nil_obj,
        }
    }

    // Binding a global to nil removes it.
    pub fn set_global(&mut self, symbol: Obj, value: Obj) {
        if value == self.nil_obj {
            self.globals.remove(&symbol);
        } else {
            self.globals.set(symbol, value);
        }
    }

    pub fn nil(&self) -> Obj {
        self.nil_obj
    }

    pub fn true_obj(&self) -> Obj {
        self.true_obj
    }

    pub fn false_obj(&self) -> Obj {
        self.false_obj
    }

    pub fn integer(&mut self, value: i32) -> Obj {
        let class = self.integer_class;
        self.alloc_object(class, Body::Int(value))
    }

    pub fn unbox_int(&self, obj: Obj) -> Result<i32> {
        match self.heap.get(obj).body {
            Body::Int(value) => Ok(value),
            _ => Err(Error::NotAnInteger),
        }
    }

    //////////////////////////////////////////////////////////////
    // Dispatch
    //////////////////////////////////////////////////////////////

    // Walk the class chain looking for `selector`. The splay inside
    // `get` keeps hot selectors near each table's root.
    pub(crate) fn lookup_method(
        &mut self,
        mut class: Obj,
        selector: Obj,
    ) -> Option<Method> {
        loop {
            let found = match self.heap.as_class_mut(class) {
                Some(c) => c.methods.get(&selector).copied(),
                None => return None,
            };
            if let Some(method) = found {
                return Some(method);
            }
            match self.heap.as_class(class).and_then(|c| c.super_class) {
                Some(super_class) => class = super_class,
                None => return None,
            }
        }
    }

    pub fn set_method(
        &mut self,
        class: Obj,
        selector: Obj,
        func: Primitive,
        argc: u8,
    ) -> Result<()> {
        match self.heap.as_class_mut(class) {
            Some(c) => {
                // Latest install wins, same as a compiled SETMETHOD.
                c.methods.set(selector, Method::Primitive { func, argc });
                Ok(())
            }
            None => Err(Error::NotAClass),
        }
    }

    pub fn send(&mut self, receiver: Obj, selector: Obj, argv: &[Obj]) -> Obj {
        let class = self.heap.class_of(receiver);
        match self.lookup_method(class, selector) {
            None => self.message_not_understood(receiver, selector),
            Some(Method::Primitive { func, argc }) => {
                if argv.len() != argc as usize {
                    return self.nil_obj;
                }
                func(self, receiver, argv)
            }
            Some(Method::Compiled { code, offset, argc }) => {
                if argv.len() != argc as usize {
                    return self.nil_obj;
                }
                for &arg in argv {
                    self.stack.push(arg);
                }
                if let Err(e) = vm::run(self, code, offset) {
                    panic!("vm fault in compiled method: {:?}", e);
                }
                // The callee left its result above the arguments.
                let result = match self.stack.pop() {
                    Some(result) => result,
                    None => panic!("compiled method returned no value"),
                };
                self.stack.truncate(self.stack.len() - argv.len());
                result
            }
        }
    }

    // Failed lookup: hand the receiver a MessageNotUnderstood. If
    // the receiver does not even understand doesNotUnderstand:, give
    // up with nil rather than recurse.
    pub(crate) fn message_not_understood(
        &mut self,
        receiver: Obj,
        selector: Obj,
    ) -> Obj {
        let dnu = self.symb("doesNotUnderstand:");
        if selector == dnu {
            return self.nil_obj;
        }
        let class = self.heap.class_of(receiver);
        if self.lookup_method(class, dnu).is_none() {
            trace!("no doesNotUnderstand: up the chain from {:?}", receiver);
            return self.nil_obj;
        }
        // Root the receiver while the error object gets built; the
        // allocation below is a collection point.
        self.stack.push(receiver);
        let mnu_class = self.mnu_class;
        let err = self.new_instance(mnu_class);
        let _ = self.set_ivar(err, 0, receiver);
        let _ = self.set_ivar(err, 1, selector);
        let result = self.send(receiver, dnu, &[err]);
        self.stack.pop();
        result
    }

    //////////////////////////////////////////////////////////////
    // Operand stack
    //////////////////////////////////////////////////////////////

    pub(crate) fn push(&mut self, value: Obj) -> Result<()> {
        if self.stack.len() >= self.config.stack_capacity {
            return Err(Error::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Obj> {
        self.stack.pop().ok_or(Error::StackUnderflow)
    }

    pub(crate) fn peek(&self) -> Result<Obj> {
        self.stack.last().copied().ok_or(Error::StackUnderflow)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // Root `count` scratch slots for host code that must hold
    // objects across a collection point.
    pub fn push_locals(&mut self, count: usize) -> Locals {
        let base = self.stack.len();
        let nil = self.nil_obj;
        for _ in 0..count {
            self.stack.push(nil);
        }
        self.locals.push(base);
        Locals { base, count }
    }

    pub fn local(&self, locals: Locals, index: usize) -> Obj {
        if index >= locals.count {
            panic!("local slot {} out of {}", index, locals.count);
        }
        self.stack[locals.base + index]
    }

    pub fn set_local(&mut self, locals: Locals, index: usize, value: Obj) {
        if index >= locals.count {
            panic!("local slot {} out of {}", index, locals.count);
        }
        self.stack[locals.base + index] = value;
    }

    pub fn pop_locals(&mut self) {
        match self.locals.pop() {
            Some(base) => self.stack.truncate(base),
            None => trace!("pop_locals with no locals pushed"),
        }
    }

    //////////////////////////////////////////////////////////////
    // Collector controls
    //////////////////////////////////////////////////////////////

    pub fn gc_run(&mut self) {
        gc::collect(self);
    }

    // Pauses nest; the collector stays off until every pause has
    // been matched by a resume.
    pub fn gc_pause(&mut self) {
        self.gc_paused += 1;
    }

    pub fn gc_resume(&mut self) {
        if self.gc_paused > 0 {
            self.gc_paused -= 1;
        }
    }

    pub fn gc_preserve(&mut self, obj: Obj) {
        self.heap.get_mut(obj).mask.insert(GcFlag::Preserve);
    }

    pub fn gc_release(&mut self, obj: Obj) {
        self.heap.get_mut(obj).mask.remove(GcFlag::Preserve);
    }

    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    //////////////////////////////////////////////////////////////
    // Bytecode
    //////////////////////////////////////////////////////////////

    pub fn load(&mut self, bytes: &[u8]) -> Result<CodeId> {
        let code = vm::load_code(self, bytes)?;
        self.codes.push(code);
        Ok(CodeId(self.codes.len() - 1))
    }

    pub fn execute(&mut self, code: CodeId, offset: usize) -> Result<()> {
        vm::run(self, code, offset)
    }

    pub(crate) fn code(&self, id: CodeId) -> &Code {
        &self.codes[id.0]
    }
}
