// The object model.
//
// Every value in the image is an Obj: a handle into the context's
// object heap. The heap is a pool, so a handle stays valid (and
// stable) until the collector reclaims the object; there is no
// compaction and nothing ever moves. Classes are objects too, and a
// class is exactly the object whose class handle names itself.

use crate::context::Context;
use crate::pool::Pool;
use crate::tree::Tree;
use crate::vm::CodeId;
use enumflags2::BitFlags;


// Collector state bits carried by every object. An occupied pool
// slot plays the role of an "alive" bit.
#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum GcFlag {
    Marked = 0b01,
    Preserve = 0b10,
}

pub type GcMask = BitFlags<GcFlag>;


// A handle to a heap object. Identity of the handle is identity of
// the object; symbols in particular are compared this way.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Obj(pub(crate) u32);

impl Obj {
    // Placeholder used only while the primordial classes are being
    // tied together. Never escapes the bootstrap.
    pub(crate) const NULL: Obj = Obj(std::u32::MAX);
}


#[derive(Debug)]
pub struct Object {
    pub class: Obj,
    pub mask: GcMask,
    pub body: Body,
}


// The payload of an object. Ordinary instances (and arrays, whose
// elements are just extra slots) hold a slot per instance variable;
// boxed integers hold their raw value; classes hold their record.
#[derive(Debug)]
pub enum Body {
    Slots(Box<[Obj]>),
    Int(i32),
    Class(Box<Class>),
}


#[derive(Debug)]
pub struct Class {
    // None only for the root class; dispatch terminates there.
    pub super_class: Option<Obj>,
    pub name: Obj,
    pub methods: Tree<Obj, Method>,
    pub ivar_count: usize,
    pub ivar_names: Box<[Obj]>,
    // Per-instance footprint in bytes, charged against the heap
    // budget at allocation time.
    pub instance_size: usize,
}

impl Class {
    pub fn instance_footprint(ivar_count: usize) -> usize {
        std::mem::size_of::<Object>() + ivar_count * std::mem::size_of::<Obj>()
    }
}


pub type Primitive = fn(&mut Context, Obj, &[Obj]) -> Obj;


// A method is either host code or a span of bytecode in a loaded
// Code block.
#[derive(Copy, Clone, Debug)]
pub enum Method {
    Primitive { func: Primitive, argc: u8 },
    Compiled { code: CodeId, offset: usize, argc: u8 },
}

impl Method {
    pub fn argc(&self) -> u8 {
        match self {
            Method::Primitive { argc, .. } => *argc,
            Method::Compiled { argc, .. } => *argc,
        }
    }
}


// The object heap: a pool of object records plus a byte budget. The
// budget is what drives collection; the pool itself grows, so an
// allocation as such cannot fail.
#[derive(Debug)]
pub struct Heap {
    pool: Pool<Object>,
    bytes_in_use: usize,
    capacity: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Heap {
        Heap {
            pool: Pool::with_capacity(64),
            bytes_in_use: 0,
            capacity,
        }
    }

    // The footprint of a body whose size is not fixed by its class:
    // arrays, class records, host-boxed integers. Instances of known
    // shape charge their class's instance_size instead; the two
    // agree for any body of `ivar_count` slots.
    pub fn footprint(body: &Body) -> usize {
        let payload = match body {
            Body::Slots(slots) => slots.len() * std::mem::size_of::<Obj>(),
            Body::Int(_) => 0,
            Body::Class(_) => std::mem::size_of::<Class>(),
        };
        std::mem::size_of::<Object>() + payload
    }

    pub fn would_exceed(&self, extra: usize) -> bool {
        self.bytes_in_use + extra > self.capacity
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    pub fn live_objects(&self) -> usize {
        self.pool.len()
    }

    // `size` is the number of bytes charged against the heap budget
    // for this object; the matching refund on free recomputes it
    // from the body, so callers must pass a size that agrees.
    pub fn alloc(&mut self, object: Object, size: usize) -> Obj {
        self.bytes_in_use += size;
        Obj(self.pool.alloc(object))
    }

    pub fn free(&mut self, obj: Obj) {
        let object = self.pool.free(obj.0);
        self.bytes_in_use -= Heap::footprint(&object.body);
    }

    pub fn get(&self, obj: Obj) -> &Object {
        match self.pool.get(obj.0) {
            Some(object) => object,
            None => panic!("dangling object handle {:?}", obj),
        }
    }

    pub fn get_mut(&mut self, obj: Obj) -> &mut Object {
        match self.pool.get_mut(obj.0) {
            Some(object) => object,
            None => panic!("dangling object handle {:?}", obj),
        }
    }

    pub fn class_of(&self, obj: Obj) -> Obj {
        self.get(obj).class
    }

    // A class is the fix point of the class relation.
    pub fn is_class(&self, obj: Obj) -> bool {
        self.get(obj).class == obj
    }

    pub fn as_class(&self, obj: Obj) -> Option<&Class> {
        match &self.get(obj).body {
            Body::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self, obj: Obj) -> Option<&mut Class> {
        match &mut self.get_mut(obj).body {
            Body::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn scan<F: FnMut(Obj, &Object)>(&self, mut visit: F) {
        self.pool.scan(|i, object| visit(Obj(i), object));
    }

    pub fn scan_mut<F: FnMut(Obj, &mut Object)>(&mut self, mut visit: F) {
        self.pool.scan_mut(|i, object| visit(Obj(i), object));
    }
}
