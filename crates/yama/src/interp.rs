//! The bytecode dispatch loop.
//!
//! Execution enters through [`enter_call`]: push a frame for the callee, run
//! until that frame (and everything it spawned) returns, and hand the return
//! value back. Frames are pushed on `call` and popped on `ret`; the program
//! counter is per-frame. Every runtime fault maps to a [`Panic`] that the
//! context turns into a latched panic state; this module never mutates the
//! latch itself, except for reading panics raised by native bodies.
//!
//! Cancellation is checked on every call boundary and taken branch, which
//! bounds the delay between a cancel request and the synthetic panic to one
//! loop iteration.

use crate::{
    bytecode::Opcode,
    consts::ConstEntry,
    context::{Context, Frame, Panic, PanicKind},
    domain::TypeId,
    typeinfo::{CallFn, FunctionInfo},
    value::Value,
};

/// How a freshly pushed frame runs.
enum Entered {
    Native,
    Bytecode,
}

/// Calls the function type `tid` with `args`, running to completion.
///
/// On success every frame pushed here has been popped again. On panic the
/// frame stack is left for the caller ([`Context::call`]) to unwind.
pub(crate) fn enter_call(ctx: &mut Context, tid: TypeId, args: Vec<Value>) -> Result<Value, Panic> {
    let entry_depth = ctx.frames.len();
    match push_frame(ctx, tid, args, None)? {
        Entered::Native => run_native(ctx),
        Entered::Bytecode => run(ctx, entry_depth),
    }
}

fn check_cancel(ctx: &Context) -> Result<(), Panic> {
    if ctx.take_cancel() {
        Err(Panic::bare(PanicKind::Cancelled))
    } else {
        Ok(())
    }
}

/// Validates a call against the callee's signature and pushes its frame.
fn push_frame(ctx: &mut Context, tid: TypeId, args: Vec<Value>, dst: Option<u32>) -> Result<Entered, Panic> {
    check_cancel(ctx)?;
    if ctx.frames.len() >= ctx.max_call_frames() {
        return Err(Panic::new(
            PanicKind::StackOverflow,
            format!("call-frame depth bound ({}) exceeded", ctx.max_call_frames()),
        ));
    }

    let info = ctx.core().info_of(tid);
    let links = ctx.core().links_of(tid);
    let Some(f) = info.function_info() else {
        return Err(Panic::new(
            PanicKind::NotCallable,
            format!("{} is a {} type, not callable", info.unqualified_name, info.kind()),
        ));
    };

    if args.len() != f.callsig.param_count() {
        return Err(Panic::new(
            PanicKind::BadArgs,
            format!(
                "{} takes {} arguments, got {}",
                info.unqualified_name,
                f.callsig.param_count(),
                args.len()
            ),
        ));
    }
    for (slot, (arg, &pi)) in args.iter().zip(f.callsig.params()).enumerate() {
        let param_ty = links.get(pi as usize).copied().flatten();
        let fits = param_ty.is_some_and(|t| ctx.core().value_matches(arg, t));
        if !fits {
            return Err(Panic::new(
                PanicKind::TypeMismatch,
                format!("argument {slot} of {} has the wrong type", info.unqualified_name),
            ));
        }
    }

    let entered = match f.call_fn {
        CallFn::Native(_) => Entered::Native,
        CallFn::Bytecode => Entered::Bytecode,
    };
    let regs = match entered {
        Entered::Native => Vec::new(),
        Entered::Bytecode => {
            let mut regs = vec![Value::None; f.max_locals as usize];
            // Arguments land in the parameter slots.
            regs[..args.len()].copy_from_slice(&args);
            regs
        }
    };
    ctx.frames.push(Frame {
        info: info.clone(),
        links,
        regs,
        args: args.into(),
        pc: 0,
        dst,
        ret: None,
    });
    Ok(entered)
}

/// The declared return type of the frame's function.
fn ret_type(frame: &Frame, f: &FunctionInfo) -> Option<TypeId> {
    frame.links.get(f.callsig.ret() as usize).copied().flatten()
}

/// Runs the native body of the current (topmost) frame and pops it.
fn run_native(ctx: &mut Context) -> Result<Value, Panic> {
    let Some(frame) = ctx.frames.last() else {
        return Err(Panic::new(PanicKind::OutOfBounds, "no frame to run"));
    };
    let info = frame.info.clone();
    let Some(f) = info.function_info() else {
        return Err(Panic::new(PanicKind::NotCallable, "frame is not a function body"));
    };
    let CallFn::Native(body) = f.call_fn else {
        return Err(Panic::new(PanicKind::NotCallable, "frame is not a native body"));
    };

    body(ctx);

    if let Some(p) = ctx.panic_info() {
        // The native reported failure; its frame unwinds with the rest.
        return Err(p.clone());
    }
    let Some(frame) = ctx.frames.pop() else {
        return Err(Panic::new(PanicKind::OutOfBounds, "native frame vanished"));
    };
    let Some(v) = frame.ret else {
        return Err(Panic::new(
            PanicKind::BadReturn,
            format!("native {} returned without a value", info.unqualified_name),
        ));
    };
    let fits = ret_type(&frame, f).is_some_and(|t| ctx.core().value_matches(&v, t));
    if !fits {
        return Err(Panic::new(
            PanicKind::BadReturn,
            format!("native {} returned a value of the wrong type", info.unqualified_name),
        ));
    }
    Ok(v)
}

fn reg(frame: &Frame, i: u32) -> Result<Value, Panic> {
    frame
        .regs
        .get(i as usize)
        .copied()
        .ok_or_else(|| Panic::new(PanicKind::OutOfBounds, format!("register {i} out of bounds")))
}

fn set_reg(frame: &mut Frame, i: u32, v: Value) -> Result<(), Panic> {
    match frame.regs.get_mut(i as usize) {
        Some(slot) => {
            *slot = v;
            Ok(())
        }
        None => Err(Panic::new(PanicKind::OutOfBounds, format!("register {i} out of bounds"))),
    }
}

/// The branch destination of the instruction at `pc`.
fn branch_target(pc: usize, sbx: i32, len: usize) -> Result<usize, Panic> {
    i64::try_from(pc)
        .ok()
        .map(|pc| pc + 1 + i64::from(sbx))
        .and_then(|t| usize::try_from(t).ok())
        .filter(|&t| t < len)
        .ok_or_else(|| Panic::new(PanicKind::OutOfBounds, format!("jump from {pc} leaves the buffer")))
}

/// Materializes constant `b` of the current frame into a value.
fn const_value(frame: &Frame, b: u32) -> Result<Value, Panic> {
    let entry = frame
        .info
        .consts
        .get(b as usize)
        .ok_or_else(|| Panic::new(PanicKind::OutOfBounds, format!("constant {b} out of bounds")))?;
    match entry {
        ConstEntry::Int(v) => Ok(Value::Int(*v)),
        ConstEntry::UInt(v) => Ok(Value::UInt(*v)),
        ConstEntry::Float(v) => Ok(Value::Float(*v)),
        ConstEntry::Bool(v) => Ok(Value::Bool(*v)),
        ConstEntry::Char(v) => Ok(Value::Char(*v)),
        ConstEntry::FunctionType(name, _) => frame
            .links
            .get(b as usize)
            .copied()
            .flatten()
            .map(Value::Fn)
            .ok_or_else(|| Panic::new(PanicKind::TypeMismatch, format!("constant {b} ({name}) is unlinked"))),
        ConstEntry::PrimitiveType(name) => Err(Panic::new(
            PanicKind::TypeMismatch,
            format!("constant {b} ({name}) has no value representation"),
        )),
    }
}

/// Dispatches bytecode until the frame stack drops back to `entry_depth`.
fn run(ctx: &mut Context, entry_depth: usize) -> Result<Value, Panic> {
    let core = ctx.core().clone();
    loop {
        let Some(frame) = ctx.frames.last_mut() else {
            return Err(Panic::new(PanicKind::OutOfBounds, "frame stack underflow"));
        };
        let info = frame.info.clone();
        let Some(f) = info.function_info() else {
            return Err(Panic::new(PanicKind::NotCallable, "frame is not a function body"));
        };
        let pc = frame.pc;
        let Some(instr) = f.bcode.get(pc) else {
            return Err(Panic::new(
                PanicKind::OutOfBounds,
                format!("program counter {pc} overran the buffer"),
            ));
        };

        match instr.opc {
            Opcode::Noop => frame.pc += 1,
            Opcode::LoadNone => {
                set_reg(frame, instr.a, Value::None)?;
                frame.pc += 1;
            }
            Opcode::LoadConst => {
                let v = const_value(frame, instr.b)?;
                set_reg(frame, instr.a, v)?;
                frame.pc += 1;
            }
            Opcode::LoadArg => {
                let v = frame.args.get(instr.b as usize).copied().ok_or_else(|| {
                    Panic::new(PanicKind::OutOfBounds, format!("argument {} out of bounds", instr.b))
                })?;
                set_reg(frame, instr.a, v)?;
                frame.pc += 1;
            }
            Opcode::Copy => {
                let v = reg(frame, instr.b)?;
                set_reg(frame, instr.a, v)?;
                frame.pc += 1;
            }
            Opcode::Jump => {
                frame.pc = branch_target(pc, instr.sbx(), f.bcode.len())?;
                check_cancel(ctx)?;
            }
            Opcode::JumpTrue | Opcode::JumpFalse => {
                let Value::Bool(cond) = reg(frame, instr.a)? else {
                    return Err(Panic::new(
                        PanicKind::TypeMismatch,
                        format!("register {} is not a bool", instr.a),
                    ));
                };
                let taken = cond == (instr.opc == Opcode::JumpTrue);
                if taken {
                    frame.pc = branch_target(pc, instr.sbx(), f.bcode.len())?;
                    check_cancel(ctx)?;
                } else {
                    frame.pc += 1;
                }
            }
            Opcode::Ret => {
                let v = reg(frame, instr.a)?;
                let fits = ret_type(frame, f).is_some_and(|t| core.value_matches(&v, t));
                if !fits {
                    return Err(Panic::new(
                        PanicKind::BadReturn,
                        format!("{} returned a value of the wrong type", info.unqualified_name),
                    ));
                }
                let finished = ctx.frames.pop();
                if ctx.frames.len() == entry_depth {
                    return Ok(v);
                }
                if let Some(c) = finished.and_then(|fr| fr.dst) {
                    let Some(caller) = ctx.frames.last_mut() else {
                        return Err(Panic::new(PanicKind::OutOfBounds, "missing caller frame"));
                    };
                    set_reg(caller, c, v)?;
                }
            }
            Opcode::Call | Opcode::CallNr => {
                let a = instr.a;
                let window = (instr.b as usize).max(1) - 1;
                let callee = reg(frame, a)?;
                let first_arg = a as usize + 1;
                let args: Vec<Value> = frame
                    .regs
                    .get(first_arg..first_arg + window)
                    .ok_or_else(|| {
                        Panic::new(PanicKind::OutOfBounds, "call operand window out of bounds")
                    })?
                    .to_vec();
                let Value::Fn(tid) = callee else {
                    return Err(Panic::new(
                        PanicKind::NotCallable,
                        format!("register {a} holds {} value, not a callable", callee.kind()),
                    ));
                };
                let dst = (instr.opc == Opcode::Call).then_some(instr.c);
                // The pc must point past the call before the callee runs.
                frame.pc += 1;
                match push_frame(ctx, tid, args, dst)? {
                    Entered::Bytecode => {}
                    Entered::Native => {
                        let v = run_native(ctx)?;
                        if let Some(c) = dst {
                            let Some(caller) = ctx.frames.last_mut() else {
                                return Err(Panic::new(PanicKind::OutOfBounds, "missing caller frame"));
                            };
                            set_reg(caller, c, v)?;
                        }
                    }
                }
            }
        }
    }
}
