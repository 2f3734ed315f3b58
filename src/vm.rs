// (C) 2020 Brandon Lewis
//
// The bytecode interpreter and loader.
//
// *Execution model*
//
// A Code block is a symbol table plus a flat instruction stream.
// Execution runs against the context's single operand stack, with a
// stack of call frames on the side. A frame records where to resume
// (ip), which Code block it runs in, and the operand-stack depth at
// entry (bp). RETURN discards the frame's whole stack segment and
// replaces it with the result, so a message send nets exactly one
// value no matter what the body pushed.
//
// *Wire format*
//
// A blob is a run of null-terminated symbol strings closed by an
// empty string, followed by raw instructions. Multi-byte operands
// are little-endian on disk; the loader byteswaps them once on
// big-endian hosts, and the interpreter always reads native-order
// operands. Unknown opcodes fail the load, not the run.

use crate::context::Context;
use crate::object::{Method, Obj};
use crate::{Error, Result};
use std::collections::HashMap;


// A handle to a Code block owned by the Context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeId(pub(crate) usize);


#[derive(Debug)]
pub struct Code {
    pub symbols: Vec<Obj>,
    pub instructions: Vec<u8>,
}


// The on-disk opcode encoding. Always append; reordering breaks
// every compiled blob in existence.
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    PushNil = 0,
    PushTrue,
    PushFalse,
    PushSuper,
    Dup,
    Pop,
    Swap, // reserved, not yet emitted by any compiler
    Return,
    GetGlobal,
    SetGlobal,
    GetIvar,
    SetIvar,
    SendMsg,
    PushSymbol,
    SetMethod,
}


impl Opcode {
    pub fn decode(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        match byte {
            0 => Some(PushNil),
            1 => Some(PushTrue),
            2 => Some(PushFalse),
            3 => Some(PushSuper),
            4 => Some(Dup),
            5 => Some(Pop),
            6 => Some(Swap),
            7 => Some(Return),
            8 => Some(GetGlobal),
            9 => Some(SetGlobal),
            10 => Some(GetIvar),
            11 => Some(SetIvar),
            12 => Some(SendMsg),
            13 => Some(PushSymbol),
            14 => Some(SetMethod),
            _ => None,
        }
    }
}


lazy_static! {
    // Operand field widths per opcode, for the load-time
    // normalization walk. A SETMETHOD body is not an operand: the
    // walk continues straight through it, since it is instructions.
    static ref OPERAND_LAYOUT: HashMap<u8, &'static [usize]> = {
        use Opcode::*;
        let mut table: HashMap<u8, &'static [usize]> = HashMap::new();
        for op in &[PushNil, PushTrue, PushFalse, PushSuper, Dup, Pop, Swap, Return] {
            table.insert(*op as u8, &[][..]);
        }
        for op in &[GetGlobal, SetGlobal, GetIvar, SetIvar, SendMsg, PushSymbol] {
            table.insert(*op as u8, &[2][..]);
        }
        table.insert(SetMethod as u8, &[2, 1, 4][..]);
        table
    };
}


//////////////////////////////////////////////////////////////////////
// Loader
//////////////////////////////////////////////////////////////////////

pub(crate) fn load_code(ctx: &mut Context, bytes: &[u8]) -> Result<Code> {
    let mut symbols = Vec::new();
    let mut pos = 0;
    loop {
        let start = pos;
        while pos < bytes.len() && bytes[pos] != 0 {
            pos += 1;
        }
        if pos == bytes.len() {
            // No closing sentinel.
            return Err(Error::Truncated);
        }
        if pos == start {
            pos += 1;
            break;
        }
        let name = std::str::from_utf8(&bytes[start..pos])
            .map_err(|_| Error::InvalidSymbol)?;
        symbols.push(ctx.symb(name));
        pos += 1;
    }
    let mut instructions = bytes[pos..].to_vec();
    normalize(&mut instructions)?;
    trace!(
        "loaded {} symbols, {} instruction bytes",
        symbols.len(),
        instructions.len()
    );
    Ok(Code {
        symbols,
        instructions,
    })
}


// Validate every opcode and, on big-endian hosts, byteswap each
// operand in place so the interpreter reads native order.
fn normalize(instructions: &mut [u8]) -> Result<()> {
    let mut ip = 0;
    while ip < instructions.len() {
        let byte = instructions[ip];
        let layout = match OPERAND_LAYOUT.get(&byte) {
            Some(layout) => *layout,
            None => return Err(Error::UnknownOpcode(byte)),
        };
        ip += 1;
        for &width in layout.iter() {
            if ip + width > instructions.len() {
                return Err(Error::Truncated);
            }
            if cfg!(target_endian = "big") && width > 1 {
                instructions[ip..ip + width].reverse();
            }
            ip += width;
        }
    }
    Ok(())
}


fn read_u16(instructions: &[u8], at: usize) -> Result<u16> {
    if at + 2 > instructions.len() {
        return Err(Error::Truncated);
    }
    let mut raw = [0; 2];
    raw.copy_from_slice(&instructions[at..at + 2]);
    Ok(u16::from_ne_bytes(raw))
}


fn read_u32(instructions: &[u8], at: usize) -> Result<u32> {
    if at + 4 > instructions.len() {
        return Err(Error::Truncated);
    }
    let mut raw = [0; 4];
    raw.copy_from_slice(&instructions[at..at + 4]);
    Ok(u32::from_ne_bytes(raw))
}


//////////////////////////////////////////////////////////////////////
// Interpreter
//////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug)]
struct Frame {
    ip: usize,
    bp: usize,
    code: CodeId,
}


// What an instruction did to the control state.
enum ControlFlow {
    Advance(usize),
    Jump(usize),
    Call { advance: usize, callee: Frame },
    Ret,
}


// Drive `code` from `offset` until the root frame returns or the
// instruction stream runs out.
pub(crate) fn run(ctx: &mut Context, code: CodeId, offset: usize) -> Result<()> {
    let mut frames = vec![Frame {
        ip: offset,
        bp: ctx.stack.len(),
        code,
    }];
    loop {
        let frame = match frames.last() {
            Some(frame) => *frame,
            None => return Ok(()),
        };
        if frame.ip >= ctx.code(frame.code).instructions.len() {
            if frames.len() == 1 {
                // Top-level code is allowed to just run out.
                return Ok(());
            }
            // A method body must RETURN.
            return Err(Error::Truncated);
        }
        match step(ctx, frame)? {
            ControlFlow::Advance(n) => {
                if let Some(top) = frames.last_mut() {
                    top.ip += n;
                }
            }
            ControlFlow::Jump(target) => {
                if let Some(top) = frames.last_mut() {
                    top.ip = target;
                }
            }
            ControlFlow::Call { advance, callee } => {
                if let Some(top) = frames.last_mut() {
                    top.ip += advance;
                }
                frames.push(callee);
            }
            ControlFlow::Ret => {
                frames.pop();
            }
        }
    }
}


// Execute the single instruction under `frame.ip`.
fn step(ctx: &mut Context, frame: Frame) -> Result<ControlFlow> {
    let byte = ctx.code(frame.code).instructions[frame.ip];
    let op = match Opcode::decode(byte) {
        Some(op) => op,
        None => return Err(Error::UnknownOpcode(byte)),
    };
    trace!("ip={} {:?} depth={}", frame.ip, op, ctx.stack.len());
    match op {
        Opcode::PushNil => {
            let nil = ctx.nil();
            ctx.push(nil)?;
            Ok(ControlFlow::Advance(1))
        }

        Opcode::PushTrue => {
            let value = ctx.true_obj();
            ctx.push(value)?;
            Ok(ControlFlow::Advance(1))
        }

        Opcode::PushFalse => {
            let value = ctx.false_obj();
            ctx.push(value)?;
            Ok(ControlFlow::Advance(1))
        }

        Opcode::PushSuper => {
            let top = ctx.pop()?;
            let super_class = ctx.super_of(top);
            ctx.push(super_class)?;
            Ok(ControlFlow::Advance(1))
        }

        Opcode::Dup => {
            let top = ctx.peek()?;
            ctx.push(top)?;
            Ok(ControlFlow::Advance(1))
        }

        Opcode::Pop => {
            ctx.pop()?;
            Ok(ControlFlow::Advance(1))
        }

        // Reserved encoding: loadable, not executable.
        Opcode::Swap => Err(Error::UnknownOpcode(byte)),

        Opcode::Return => {
            let result = ctx.pop()?;
            if ctx.stack.len() < frame.bp {
                return Err(Error::FrameUnderflow);
            }
            ctx.stack.truncate(frame.bp);
            ctx.push(result)?;
            Ok(ControlFlow::Ret)
        }

        Opcode::GetGlobal => {
            let symbol = operand_symbol(ctx, frame)?;
            let value = ctx.get_global(symbol);
            ctx.push(value)?;
            Ok(ControlFlow::Advance(3))
        }

        Opcode::SetGlobal => {
            let symbol = operand_symbol(ctx, frame)?;
            let value = ctx.peek()?;
            ctx.set_global(symbol, value);
            ctx.pop()?;
            Ok(ControlFlow::Advance(3))
        }

        Opcode::GetIvar => {
            let index = read_u16(&ctx.code(frame.code).instructions, frame.ip + 1)?;
            let target = ctx.pop()?;
            let value = ctx.ivar(target, index as usize)?;
            ctx.push(value)?;
            Ok(ControlFlow::Advance(3))
        }

        Opcode::SetIvar => {
            let index = read_u16(&ctx.code(frame.code).instructions, frame.ip + 1)?;
            let target = ctx.pop()?;
            let value = ctx.pop()?;
            ctx.set_ivar(target, index as usize, value)?;
            Ok(ControlFlow::Advance(3))
        }

        Opcode::PushSymbol => {
            let symbol = operand_symbol(ctx, frame)?;
            ctx.push(symbol)?;
            Ok(ControlFlow::Advance(3))
        }

        Opcode::SendMsg => {
            let selector = operand_symbol(ctx, frame)?;
            send_message(ctx, selector)
        }

        Opcode::SetMethod => {
            let instructions = &ctx.code(frame.code).instructions;
            let index = read_u16(instructions, frame.ip + 1)?;
            if frame.ip + 3 >= instructions.len() {
                return Err(Error::Truncated);
            }
            let argc = instructions[frame.ip + 3];
            let body_len = read_u32(instructions, frame.ip + 4)? as usize;
            let entry = frame.ip + 8;
            if entry + body_len > instructions.len() {
                return Err(Error::Truncated);
            }
            let selector = symbol_at(ctx, frame.code, index)?;
            let target = ctx.pop()?;
            match ctx.heap.as_class_mut(target) {
                Some(class) => {
                    class.methods.set(
                        selector,
                        Method::Compiled {
                            code: frame.code,
                            offset: entry,
                            argc,
                        },
                    );
                }
                None => return Err(Error::NotAClass),
            }
            Ok(ControlFlow::Jump(entry + body_len))
        }
    }
}


fn symbol_at(ctx: &Context, code: CodeId, index: u16) -> Result<Obj> {
    ctx.code(code)
        .symbols
        .get(index as usize)
        .copied()
        .ok_or(Error::SymbolIndex(index))
}


fn operand_symbol(ctx: &Context, frame: Frame) -> Result<Obj> {
    let index = read_u16(&ctx.code(frame.code).instructions, frame.ip + 1)?;
    symbol_at(ctx, frame.code, index)
}


// SENDMSG: the receiver is on top of the stack, its arguments below
// it, the one pushed last nearest.
fn send_message(ctx: &mut Context, selector: Obj) -> Result<ControlFlow> {
    let receiver = ctx.peek()?;
    let class = ctx.heap.class_of(receiver);
    match ctx.lookup_method(class, selector) {
        None => {
            ctx.pop()?;
            let result = ctx.message_not_understood(receiver, selector);
            ctx.push(result)?;
            Ok(ControlFlow::Advance(3))
        }

        Some(Method::Primitive { func, argc }) => {
            let argc = argc as usize;
            if ctx.stack.len() < argc + 1 {
                return Err(Error::StackUnderflow);
            }
            // Receiver and arguments stay on the stack while the
            // primitive runs, so a collection inside it cannot
            // reclaim them.
            let top = ctx.stack.len();
            let mut argv = Vec::with_capacity(argc);
            for k in 0..argc {
                argv.push(ctx.stack[top - 2 - k]);
            }
            let result = func(ctx, receiver, &argv);
            ctx.stack.truncate(top - argc - 1);
            ctx.push(result)?;
            Ok(ControlFlow::Advance(3))
        }

        Some(Method::Compiled { code, offset, argc }) => {
            let argc = argc as usize;
            if ctx.stack.len() < argc + 1 {
                return Err(Error::StackUnderflow);
            }
            // The callee segment starts below the arguments and the
            // receiver; RETURN consumes all of it and leaves the
            // result in its place.
            let callee = Frame {
                ip: offset,
                bp: ctx.stack.len() - argc - 1,
                code,
            };
            Ok(ControlFlow::Call { advance: 3, callee })
        }
    }
}
