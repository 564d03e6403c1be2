//! Modules and the module factory.
//!
//! A module groups type descriptors by unqualified name. Hosts never build
//! [`ModuleInfo`] directly; they go through [`ModuleFactory`], which owns
//! the uniqueness rule (the first descriptor added under a name wins).

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    bytecode::{Code, Syms},
    callsig::CallSigInfo,
    consts::ConstTableInfo,
    intern::Str,
    typeinfo::{CallFn, FunctionInfo, KindInfo, NativeFn, PType, PrimitiveInfo, StructInfo, TypeInfo},
};

/// A mapping from unqualified type name to owned descriptor, in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    types: IndexMap<Str, Rc<TypeInfo>>,
}

impl ModuleInfo {
    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// True iff the module declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// The descriptor declared under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rc<TypeInfo>> {
        self.types.get(name)
    }

    /// Iterates `(name, descriptor)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Str, &Rc<TypeInfo>)> {
        self.types.iter()
    }
}

impl PartialEq for ModuleInfo {
    fn eq(&self, other: &Self) -> bool {
        self.types.len() == other.types.len()
            && self
                .types
                .iter()
                .all(|(name, info)| other.types.get(name).is_some_and(|o| **o == **info))
    }
}

/// Builds [`ModuleInfo`] values, enforcing name uniqueness.
///
/// [`ModuleFactory::done`] yields the accumulated module and resets the
/// factory for reuse.
#[derive(Debug, Default)]
pub struct ModuleFactory {
    types: IndexMap<Str, Rc<TypeInfo>>,
}

impl ModuleFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, info: TypeInfo) -> &mut Self {
        self.types.entry(info.unqualified_name.clone()).or_insert_with(|| Rc::new(info));
        self
    }

    /// Adds a primitive type.
    pub fn add_primitive_type(&mut self, name: impl Into<Str>, consts: ConstTableInfo, ptype: PType) -> &mut Self {
        self.add(TypeInfo::new(name, consts, KindInfo::Primitive(PrimitiveInfo { ptype })))
    }

    /// Adds a function type with a native body.
    pub fn add_function_type(
        &mut self,
        name: impl Into<Str>,
        consts: ConstTableInfo,
        callsig: CallSigInfo,
        max_locals: u32,
        call_fn: NativeFn,
    ) -> &mut Self {
        self.add(TypeInfo::new(
            name,
            consts,
            KindInfo::Function(FunctionInfo {
                callsig,
                call_fn: CallFn::Native(call_fn),
                max_locals,
                bcode: Code::new(),
                bsyms: Syms::new(),
            }),
        ))
    }

    /// Adds a function type with a bytecode body.
    pub fn add_bcode_function_type(
        &mut self,
        name: impl Into<Str>,
        consts: ConstTableInfo,
        callsig: CallSigInfo,
        max_locals: u32,
        bcode: Code,
        bsyms: Syms,
    ) -> &mut Self {
        self.add(TypeInfo::new(
            name,
            consts,
            KindInfo::Function(FunctionInfo {
                callsig,
                call_fn: CallFn::Bytecode,
                max_locals,
                bcode,
                bsyms,
            }),
        ))
    }

    /// Adds a struct type.
    pub fn add_struct_type(&mut self, name: impl Into<Str>, consts: ConstTableInfo) -> &mut Self {
        self.add(TypeInfo::new(name, consts, KindInfo::Struct(StructInfo)))
    }

    /// Yields the accumulated module and resets the factory.
    pub fn done(&mut self) -> ModuleInfo {
        ModuleInfo {
            types: std::mem::take(&mut self.types),
        }
    }
}
