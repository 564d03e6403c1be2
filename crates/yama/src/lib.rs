#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "sBx shares storage with B by design")]

mod bytecode;
mod callsig;
mod config;
mod consts;
mod context;
mod dbg;
mod domain;
mod gid;
mod interp;
mod intern;
mod module;
mod parcel;
mod spec_parser;
mod typeinfo;
mod value;
mod verifier;

pub use crate::{
    bytecode::{Code, Instr, Opcode, Sym, Syms},
    callsig::{make_callsig, CallSigInfo},
    config::{CtxConfig, DEFAULT_MAX_CALL_FRAMES},
    consts::{ConstEntry, ConstKind, ConstTableInfo},
    context::{CancelHandle, Context, CtxError, Panic, PanicKind},
    dbg::{Dbg, DebugCats, DebugSink, ProxySink, StderrSink},
    domain::{Domain, InstallBatch, InstallError, LoadError, Type, TypeId, SELF_HEAD, YAMA_HEAD},
    gid::{gid, lid_of, pid_of, Gid, Lid, Pid},
    intern::Str,
    module::{ModuleFactory, ModuleInfo},
    parcel::{MemoryParcel, Parcel, ParcelMetadata},
    spec_parser::{QualifiedName, SpecError, SpecEval, SpecParser},
    typeinfo::{
        CallFn, FunctionInfo, Kind, KindInfo, NativeFn, PType, PrimitiveInfo, StructInfo, TypeInfo,
    },
    value::{Value, ValueKind},
    verifier::StaticVerifier,
};
