//! Per-execution state and the host command interface.
//!
//! A [`Context`] owns a value stack, a call-frame stack, and a panic latch,
//! and shares ownership of the domain it was created from. The command
//! methods here are the sole legitimate way for host code to drive the
//! machine: push operands, issue calls, and inspect results. Native function
//! bodies use the same interface to read their arguments and publish their
//! return value.

use std::{
    fmt,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use smallvec::SmallVec;
use strum::IntoStaticStr;

use crate::{
    config::CtxConfig,
    dbg::{dlog, DebugCats},
    domain::{Domain, DomainCore, LoadError, Type, TypeId},
    interp,
    intern::Str,
    typeinfo::{Kind, TypeInfo},
    value::{Value, ValueKind},
};

/// The kind of a runtime panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PanicKind {
    /// A register, constant, or argument index landed out of bounds.
    OutOfBounds,
    /// A value's runtime type did not fit where it was used.
    TypeMismatch,
    /// The call-frame depth bound was exceeded.
    StackOverflow,
    /// A call targeted a non-callable value.
    NotCallable,
    /// An argument list did not fit the callee's signature.
    BadArgs,
    /// A return value did not fit the declared return type, or a native
    /// returned without publishing one.
    BadReturn,
    /// The host requested cancellation.
    Cancelled,
    /// Raised by a native body.
    Host,
}

impl fmt::Display for PanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// A runtime panic: the error band that aborts a context's execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panic {
    pub kind: PanicKind,
    pub msg: Option<String>,
}

impl Panic {
    #[must_use]
    pub fn new(kind: PanicKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: Some(msg.into()),
        }
    }

    #[must_use]
    pub fn bare(kind: PanicKind) -> Self {
        Self { kind, msg: None }
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "panic ({}): {msg}", self.kind),
            None => write!(f, "panic ({})", self.kind),
        }
    }
}

/// Why a context command failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CtxError {
    /// The value stack holds fewer entries than the command needs.
    StackUnderflow { needed: usize, have: usize },
    /// A stack index beyond the current height.
    BadStackIndex(usize),
    /// An argument index beyond the current call's argument count.
    BadArgIndex(usize),
    /// A native-side command was issued outside any call.
    NotInCall,
    /// The named type has no value representation to push.
    NotAnObject(Str),
    /// The spec failed to resolve.
    Load(LoadError),
    /// Execution panicked; the panic is also latched on the context.
    Panic(Panic),
}

impl fmt::Display for CtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow { needed, have } => {
                write!(f, "value stack underflow: need {needed}, have {have}")
            }
            Self::BadStackIndex(idx) => write!(f, "no value stack entry at {idx}"),
            Self::BadArgIndex(idx) => write!(f, "no argument at {idx}"),
            Self::NotInCall => write!(f, "command requires an active call"),
            Self::NotAnObject(fullname) => write!(f, "type {fullname} has no value representation"),
            Self::Load(err) => write!(f, "{err}"),
            Self::Panic(p) => write!(f, "{p}"),
        }
    }
}

impl std::error::Error for CtxError {}

impl From<LoadError> for CtxError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

/// A thread-safe cancellation flag for one context.
///
/// Setting it asks the interpreter to raise a `cancelled` panic at its next
/// branch-taken or call boundary. The flag re-arms automatically once the
/// panic is raised.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True while a request is pending.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One call frame.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) info: Rc<TypeInfo>,
    pub(crate) links: Rc<Vec<Option<TypeId>>>,
    /// Register file; empty for native frames.
    pub(crate) regs: Vec<Value>,
    /// Arguments of the call, as passed.
    pub(crate) args: SmallVec<[Value; 4]>,
    pub(crate) pc: usize,
    /// Caller register receiving the return value; `None` for `call_nr`
    /// and host-entry calls.
    pub(crate) dst: Option<u32>,
    /// Return slot, written by `ret` or [`Context::put_ret`].
    pub(crate) ret: Option<Value>,
}

/// Per-execution state bound to a domain.
#[derive(Debug)]
pub struct Context {
    core: Rc<DomainCore>,
    cfg: CtxConfig,
    stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    panic: Option<Panic>,
    cancel: Arc<AtomicBool>,
    last_error: Option<String>,
}

impl Context {
    /// A context over `domain` with default configuration.
    #[must_use]
    pub fn new(domain: &Domain) -> Self {
        Self::new_with(domain, CtxConfig::default())
    }

    /// A context over `domain` with explicit configuration.
    #[must_use]
    pub fn new_with(domain: &Domain, cfg: CtxConfig) -> Self {
        Self {
            core: domain.core().clone(),
            cfg,
            stack: Vec::new(),
            frames: Vec::new(),
            panic: None,
            cancel: Arc::new(AtomicBool::new(false)),
            last_error: None,
        }
    }

    pub(crate) fn core(&self) -> &Rc<DomainCore> {
        &self.core
    }

    pub(crate) fn max_call_frames(&self) -> usize {
        self.cfg.max_call_frames
    }

    /// Takes a pending cancellation request, re-arming the flag.
    pub(crate) fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::Relaxed)
    }

    /// A handle other threads may use to cancel this context's execution.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// The most recent command failure, rendered.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while a panic is latched.
    #[must_use]
    pub fn panicking(&self) -> bool {
        self.panic.is_some()
    }

    /// The latched panic, if any.
    #[must_use]
    pub fn panic_info(&self) -> Option<&Panic> {
        self.panic.as_ref()
    }

    /// Clears the panic latch, making the context usable again.
    pub fn clear_panic(&mut self) {
        self.panic = None;
    }

    /// Latches a panic. The usual entry point for native bodies reporting
    /// failure; the interpreter unwinds once the native returns.
    pub fn panic_with(&mut self, kind: PanicKind, msg: impl Into<String>) {
        if self.panic.is_none() {
            let p = Panic::new(kind, msg);
            dlog!(self.cfg.dbg, DebugCats::CTX_PANIC, "{p}");
            self.panic = Some(p);
        }
    }

    fn fail(&mut self, err: CtxError) -> CtxError {
        self.last_error = Some(err.to_string());
        err
    }

    fn push_value(&mut self, v: Value) {
        dlog!(self.cfg.dbg, DebugCats::CTX_LLCMD, "push {v}");
        self.stack.push(v);
    }

    /// Pushes the none value.
    pub fn push_none(&mut self) {
        self.push_value(Value::None);
    }

    /// Pushes a signed integer.
    pub fn push_int(&mut self, v: i64) {
        self.push_value(Value::Int(v));
    }

    /// Pushes an unsigned integer.
    pub fn push_uint(&mut self, v: u64) {
        self.push_value(Value::UInt(v));
    }

    /// Pushes a float.
    pub fn push_float(&mut self, v: f64) {
        self.push_value(Value::Float(v));
    }

    /// Pushes a boolean.
    pub fn push_bool(&mut self, v: bool) {
        self.push_value(Value::Bool(v));
    }

    /// Pushes a character.
    pub fn push_char(&mut self, v: char) {
        self.push_value(Value::Char(v));
    }

    /// Resolves `spec` through the domain and pushes the resulting callable.
    ///
    /// Only function types have a value representation; anything else fails
    /// with [`CtxError::NotAnObject`].
    pub fn push_type(&mut self, spec: &str) -> Result<(), CtxError> {
        let ty = match self.core.load_for_ctx(spec) {
            Ok(ty) => ty,
            Err(err) => return Err(self.fail(err.into())),
        };
        if ty.kind() != Kind::Function {
            let fullname = ty.fullname();
            return Err(self.fail(CtxError::NotAnObject(fullname)));
        }
        self.push_value(Value::Fn(ty.id()));
        Ok(())
    }

    /// Stack height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.stack.len()
    }

    /// Pops `n` values.
    pub fn pop(&mut self, n: usize) -> Result<(), CtxError> {
        if self.stack.len() < n {
            let err = CtxError::StackUnderflow {
                needed: n,
                have: self.stack.len(),
            };
            return Err(self.fail(err));
        }
        let keep = self.stack.len() - n;
        self.stack.truncate(keep);
        Ok(())
    }

    fn stack_slot(&self, idx: usize) -> Result<&Value, CtxError> {
        self.stack
            .len()
            .checked_sub(1 + idx)
            .and_then(|i| self.stack.get(i))
            .ok_or(CtxError::BadStackIndex(idx))
    }

    /// Duplicates the value `idx` entries below the top onto the top.
    pub fn dup(&mut self, idx: usize) -> Result<(), CtxError> {
        let v = match self.stack_slot(idx) {
            Ok(v) => *v,
            Err(err) => return Err(self.fail(err)),
        };
        self.push_value(v);
        Ok(())
    }

    /// The runtime kind of the value `idx` entries below the top.
    pub fn kind_at(&self, idx: usize) -> Result<ValueKind, CtxError> {
        self.stack_slot(idx).map(Value::kind)
    }

    /// The value `idx` entries below the top.
    pub fn value_at(&self, idx: usize) -> Result<Value, CtxError> {
        self.stack_slot(idx).copied()
    }

    /// Calls with the top `n_args` values as arguments and the value below
    /// them as callee; all are popped and the return value is pushed.
    pub fn call(&mut self, n_args: usize) -> Result<(), CtxError> {
        self.call_impl(n_args, true)
    }

    /// As [`Context::call`], discarding the return value.
    pub fn call_nr(&mut self, n_args: usize) -> Result<(), CtxError> {
        self.call_impl(n_args, false)
    }

    fn call_impl(&mut self, n_args: usize, keep_ret: bool) -> Result<(), CtxError> {
        let needed = n_args + 1;
        if self.stack.len() < needed {
            let err = CtxError::StackUnderflow {
                needed,
                have: self.stack.len(),
            };
            return Err(self.fail(err));
        }
        dlog!(self.cfg.dbg, DebugCats::CTX_LLCMD, "call n_args={n_args}");
        let args: Vec<Value> = self.stack.split_off(self.stack.len() - n_args);
        let callee = self.stack.pop().unwrap_or(Value::None);

        let entry_depth = self.frames.len();
        let result = match callee {
            Value::Fn(tid) => interp::enter_call(self, tid, args),
            other => Err(Panic::new(
                PanicKind::NotCallable,
                format!("call target is {} value, not a callable", other.kind()),
            )),
        };
        match result {
            Ok(v) => {
                if keep_ret {
                    self.push_value(v);
                }
                Ok(())
            }
            Err(p) => {
                // A panic unwinds everything above (and including) the entry
                // frame; the panic stays latched until cleared.
                self.frames.truncate(entry_depth);
                dlog!(self.cfg.dbg, DebugCats::CTX_PANIC, "{p}");
                self.panic = Some(p.clone());
                Err(self.fail(CtxError::Panic(p)))
            }
        }
    }

    fn current_frame(&self) -> Result<&Frame, CtxError> {
        self.frames.last().ok_or(CtxError::NotInCall)
    }

    /// Number of arguments of the current call.
    pub fn arg_count(&self) -> Result<usize, CtxError> {
        Ok(self.current_frame()?.args.len())
    }

    /// Argument `i` of the current call.
    pub fn arg(&self, i: usize) -> Result<Value, CtxError> {
        self.current_frame()?
            .args
            .get(i)
            .copied()
            .ok_or(CtxError::BadArgIndex(i))
    }

    /// Copies argument `i` of the current call onto the value stack.
    pub fn put_arg(&mut self, i: usize) -> Result<(), CtxError> {
        match self.arg(i) {
            Ok(v) => {
                self.push_value(v);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Pops the stack top into the current call's return slot.
    pub fn put_ret(&mut self) -> Result<(), CtxError> {
        if self.frames.is_empty() {
            return Err(self.fail(CtxError::NotInCall));
        }
        let Some(v) = self.stack.pop() else {
            let err = CtxError::StackUnderflow { needed: 1, have: 0 };
            return Err(self.fail(err));
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.ret = Some(v);
        }
        Ok(())
    }

    /// Resolves a spec through this context's domain.
    pub fn load(&self, spec: &str) -> Result<Type, LoadError> {
        self.core.load_for_ctx(spec)
    }
}
