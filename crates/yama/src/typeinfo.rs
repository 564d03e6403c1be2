//! Type descriptors.
//!
//! A [`TypeInfo`] bundles an unqualified name, a constant table, and
//! kind-specific data. Descriptors are inert data: they become executable
//! only after the static verifier certifies them and the domain links their
//! type constants. Both kind sets below are closed; the assertions fail to
//! compile if a variant is added without revisiting every switch.

use std::{cell::Cell, fmt};

use strum::{EnumCount, IntoStaticStr};

use crate::{
    bytecode::{Code, Syms},
    callsig::CallSigInfo,
    consts::ConstTableInfo,
    context::Context,
    intern::Str,
};

/// The kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
    Primitive,
    Function,
    Struct,
}

const _: () = assert!(Kind::COUNT == 3, "the type kind set is closed at 3");

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// The built-in primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PType {
    Int,
    UInt,
    Float,
    Bool,
    Char,
    None,
}

const _: () = assert!(PType::COUNT == 6, "the primitive set is closed at 6");

impl fmt::Display for PType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// A host function callable from bytecode.
///
/// Natives read their arguments and publish their return value through the
/// context's command interface, and report failure by raising a panic on the
/// context. They must not unwind across this boundary.
pub type NativeFn = fn(&mut Context);

/// How a function type's body runs.
#[derive(Clone, Copy)]
pub enum CallFn {
    /// A host function.
    Native(NativeFn),
    /// The descriptor's own bytecode.
    Bytecode,
}

impl PartialEq for CallFn {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => std::ptr::fn_addr_eq(*a, *b),
            (Self::Bytecode, Self::Bytecode) => true,
            _ => false,
        }
    }
}

impl Eq for CallFn {}

impl fmt::Debug for CallFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(ptr) => write!(f, "Native({:p})", *ptr as *const ()),
            Self::Bytecode => write!(f, "Bytecode"),
        }
    }
}

/// Primitive-kind payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveInfo {
    pub ptype: PType,
}

/// Function-kind payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Parameter/return indices into the owning descriptor's constant table.
    pub callsig: CallSigInfo,
    /// How the body runs. `Bytecode` bodies execute `bcode`.
    pub call_fn: CallFn,
    /// Register file size of a frame running this function.
    pub max_locals: u32,
    /// Body bytecode; empty for natives.
    pub bcode: Code,
    /// Debug origins for `bcode`.
    pub bsyms: Syms,
}

/// Struct-kind payload. Structs carry no extra data in this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StructInfo;

/// Kind-specific data of a type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum KindInfo {
    Primitive(PrimitiveInfo),
    Function(FunctionInfo),
    Struct(StructInfo),
}

impl KindInfo {
    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Primitive(_) => Kind::Primitive,
            Self::Function(_) => Kind::Function,
            Self::Struct(_) => Kind::Struct,
        }
    }
}

/// A type descriptor: name, constants, kind data, and a verification latch.
#[derive(Debug)]
pub struct TypeInfo {
    pub unqualified_name: Str,
    pub consts: ConstTableInfo,
    pub info: KindInfo,
    verified: Cell<bool>,
}

impl TypeInfo {
    #[must_use]
    pub fn new(unqualified_name: impl Into<Str>, consts: ConstTableInfo, info: KindInfo) -> Self {
        Self {
            unqualified_name: unqualified_name.into(),
            consts,
            info,
            verified: Cell::new(false),
        }
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.info.kind()
    }

    /// True once the static verifier has certified this descriptor.
    #[must_use]
    pub fn verified(&self) -> bool {
        self.verified.get()
    }

    pub(crate) fn mark_verified(&self) {
        self.verified.set(true);
    }

    /// The function payload, for function kinds only.
    #[must_use]
    pub fn function_info(&self) -> Option<&FunctionInfo> {
        match &self.info {
            KindInfo::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The signature, for function kinds only.
    #[must_use]
    pub fn callsig(&self) -> Option<&CallSigInfo> {
        self.function_info().map(|f| &f.callsig)
    }

    /// The primitive tag, for primitive kinds only.
    #[must_use]
    pub fn ptype(&self) -> Option<PType> {
        match &self.info {
            KindInfo::Primitive(p) => Some(p.ptype),
            _ => None,
        }
    }
}

impl PartialEq for TypeInfo {
    /// Structural equality; the verification latch is not part of identity.
    fn eq(&self, other: &Self) -> bool {
        self.unqualified_name == other.unqualified_name
            && self.consts == other.consts
            && self.info == other.info
    }
}
