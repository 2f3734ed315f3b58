// uTalk: featherweight embeddable Smalltalk runtime.
//
// Copyright (C) 2020  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.
//
// *What this is*
//
// A single-threaded object runtime for a Smalltalk-family language:
// an object heap with user-defined classes and single inheritance,
// dynamic message dispatch by selector, a stack-based bytecode
// interpreter, and a tracing garbage collector.
//
// The surface-language compiler and disassembler are external
// collaborators. The embedder creates a Context, loads compiled
// bytecode blobs, and talks to objects through the host API on
// Context. Everything else is internal.

extern crate enumflags2;
extern crate ron;
extern crate serde;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod util;
pub mod builtins;
pub mod config;
pub mod context;
pub mod gc;
pub mod object;
pub mod pool;
pub mod symbol;
pub mod tree;
pub mod vm;

pub use crate::config::Config;
pub use crate::context::{Context, Locals};
pub use crate::object::Obj;
pub use crate::vm::CodeId;


// The set of runtime faults. All of these are non-recoverable from
// inside the image: a fault aborts the VM loop and surfaces to the
// embedder. Errors that user code can observe (a receiver not
// understanding a message, an out-of-bounds array access) never take
// this path; they answer nil instead.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Error {
    StackUnderflow,
    StackOverflow,
    FrameUnderflow,
    UnknownOpcode(u8),
    Truncated,
    InvalidSymbol,
    SymbolIndex(u16),
    IvarBounds { index: usize, count: usize },
    NotAClass,
    NotAnInteger,
}


pub type Result<T> = core::result::Result<T, Error>;
