//! Constant descriptors and the typed constant pool.
//!
//! Every type descriptor owns a [`ConstTableInfo`]: an ordered pool of
//! immediate values and named type references. Bytecode operands, call
//! signatures, and the linker all index into it. The table is built by
//! chained appends and is immutable once the owning descriptor exists.
//!
//! The set of constant kinds is closed at seven; the assertion below fails
//! to compile if a variant is added without revisiting every consumer.

use std::fmt;

use strum::{EnumCount, EnumDiscriminants, IntoStaticStr};

use crate::{callsig::CallSigInfo, intern::Str, typeinfo::Kind};

/// One entry of a constant table.
///
/// Immediate kinds carry their value; type kinds carry the fully-qualified
/// name of the referenced type, and function-type kinds additionally carry
/// the signature the referenced type must have.
#[derive(Debug, Clone, PartialEq, EnumCount, EnumDiscriminants)]
#[strum_discriminants(
    name(ConstKind),
    derive(Hash, EnumCount, IntoStaticStr),
    strum(serialize_all = "snake_case")
)]
pub enum ConstEntry {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Char(char),
    /// Reference to a primitive type by fully-qualified name.
    PrimitiveType(Str),
    /// Reference to a function type by fully-qualified name, with the
    /// signature it is expected to resolve to.
    FunctionType(Str, CallSigInfo),
}

const _: () = assert!(ConstEntry::COUNT == 7, "the constant kind set is closed at 7");
const _: () = assert!(ConstKind::COUNT == 7);

impl ConstEntry {
    /// The kind tag of this entry.
    #[must_use]
    pub fn const_kind(&self) -> ConstKind {
        self.into()
    }

    /// True for entries that `load_const` may materialize into a register.
    ///
    /// Primitive-type references are link symbols only; they name a type but
    /// have no value representation.
    #[must_use]
    pub(crate) fn is_loadable(&self) -> bool {
        !matches!(self, Self::PrimitiveType(_))
    }
}

impl fmt::Display for ConstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

impl fmt::Display for ConstEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "int {v}"),
            Self::UInt(v) => write!(f, "uint {v}"),
            Self::Float(v) => write!(f, "float {v}"),
            Self::Bool(v) => write!(f, "bool {v}"),
            Self::Char(v) => write!(f, "char {v:?}"),
            Self::PrimitiveType(name) => write!(f, "primitive_type {name}"),
            Self::FunctionType(name, _) => write!(f, "function_type {name}"),
        }
    }
}

/// An ordered, append-only pool of [`ConstEntry`] values.
///
/// All accessors are total: out-of-range or wrong-kind access yields `None`,
/// never an error.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstTableInfo {
    consts: Vec<ConstEntry>,
}

impl ConstTableInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consts.is_empty()
    }

    /// The entry at `i`, if in range.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&ConstEntry> {
        self.consts.get(i)
    }

    /// Appends a signed-integer constant.
    #[must_use]
    pub fn add_int(mut self, v: i64) -> Self {
        self.consts.push(ConstEntry::Int(v));
        self
    }

    /// Appends an unsigned-integer constant.
    #[must_use]
    pub fn add_uint(mut self, v: u64) -> Self {
        self.consts.push(ConstEntry::UInt(v));
        self
    }

    /// Appends a float constant.
    #[must_use]
    pub fn add_float(mut self, v: f64) -> Self {
        self.consts.push(ConstEntry::Float(v));
        self
    }

    /// Appends a boolean constant.
    #[must_use]
    pub fn add_bool(mut self, v: bool) -> Self {
        self.consts.push(ConstEntry::Bool(v));
        self
    }

    /// Appends a character constant.
    #[must_use]
    pub fn add_char(mut self, v: char) -> Self {
        self.consts.push(ConstEntry::Char(v));
        self
    }

    /// Appends a primitive-type reference constant.
    #[must_use]
    pub fn add_primitive_type(mut self, fullname: impl Into<Str>) -> Self {
        self.consts.push(ConstEntry::PrimitiveType(fullname.into()));
        self
    }

    /// Appends a function-type reference constant.
    #[must_use]
    pub fn add_function_type(mut self, fullname: impl Into<Str>, callsig: CallSigInfo) -> Self {
        self.consts.push(ConstEntry::FunctionType(fullname.into(), callsig));
        self
    }

    /// The signed integer at `i`, if `i` holds one.
    #[must_use]
    pub fn get_int(&self, i: usize) -> Option<i64> {
        match self.get(i)? {
            ConstEntry::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The unsigned integer at `i`, if `i` holds one.
    #[must_use]
    pub fn get_uint(&self, i: usize) -> Option<u64> {
        match self.get(i)? {
            ConstEntry::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The float at `i`, if `i` holds one.
    #[must_use]
    pub fn get_float(&self, i: usize) -> Option<f64> {
        match self.get(i)? {
            ConstEntry::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean at `i`, if `i` holds one.
    #[must_use]
    pub fn get_bool(&self, i: usize) -> Option<bool> {
        match self.get(i)? {
            ConstEntry::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The character at `i`, if `i` holds one.
    #[must_use]
    pub fn get_char(&self, i: usize) -> Option<char> {
        match self.get(i)? {
            ConstEntry::Char(v) => Some(*v),
            _ => None,
        }
    }

    /// The primitive-type reference at `i`, if `i` holds one.
    #[must_use]
    pub fn get_primitive_type(&self, i: usize) -> Option<&Str> {
        match self.get(i)? {
            ConstEntry::PrimitiveType(name) => Some(name),
            _ => None,
        }
    }

    /// The function-type reference at `i`, if `i` holds one.
    #[must_use]
    pub fn get_function_type(&self, i: usize) -> Option<(&Str, &CallSigInfo)> {
        match self.get(i)? {
            ConstEntry::FunctionType(name, callsig) => Some((name, callsig)),
            _ => None,
        }
    }

    /// The kind tag at `i`, if in range.
    #[must_use]
    pub fn const_kind(&self, i: usize) -> Option<ConstKind> {
        self.get(i).map(ConstEntry::const_kind)
    }

    /// The declared kind of the referenced type, for type constants only.
    #[must_use]
    pub fn kind(&self, i: usize) -> Option<Kind> {
        match self.get(i)? {
            ConstEntry::PrimitiveType(_) => Some(Kind::Primitive),
            ConstEntry::FunctionType(..) => Some(Kind::Function),
            _ => None,
        }
    }

    /// The referenced fullname, for type constants only.
    #[must_use]
    pub fn fullname(&self, i: usize) -> Option<&Str> {
        match self.get(i)? {
            ConstEntry::PrimitiveType(name) | ConstEntry::FunctionType(name, _) => Some(name),
            _ => None,
        }
    }

    /// The embedded signature, for function-type constants only.
    #[must_use]
    pub fn callsig(&self, i: usize) -> Option<&CallSigInfo> {
        match self.get(i)? {
            ConstEntry::FunctionType(_, callsig) => Some(callsig),
            _ => None,
        }
    }

    /// Iterates the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &ConstEntry> {
        self.consts.iter()
    }
}

impl fmt::Display for ConstTableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "const table ({} entries)", self.len())?;
        for (i, entry) in self.consts.iter().enumerate() {
            writeln!(f, "  {i}: {entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::callsig::make_callsig;

    fn one_of_each() -> ConstTableInfo {
        ConstTableInfo::new()
            .add_int(-4)
            .add_uint(301)
            .add_float(3.14159)
            .add_bool(true)
            .add_char('y')
            .add_primitive_type("abc")
            .add_function_type("def", make_callsig([5, 6, 5], 5))
    }

    #[test]
    fn construction_covers_every_kind() {
        let a = one_of_each();
        assert_eq!(a.len(), ConstEntry::COUNT);

        assert_eq!(a.get_int(0), Some(-4));
        assert_eq!(a.get_uint(1), Some(301));
        assert_eq!(a.get_float(2), Some(3.14159));
        assert_eq!(a.get_bool(3), Some(true));
        assert_eq!(a.get_char(4), Some('y'));
        assert_eq!(a.get_primitive_type(5).map(Str::as_str), Some("abc"));
        let (name, callsig) = a.get_function_type(6).unwrap();
        assert_eq!(*name, "def");
        assert_eq!(*callsig, make_callsig([5, 6, 5], 5));
    }

    #[test]
    fn get_is_total_out_of_bounds() {
        let a = ConstTableInfo::new().add_int(-4).add_int(-4).add_int(-4);
        assert_eq!(a.get_int(2), Some(-4));
        assert_eq!(a.get_int(3), None);
        assert_eq!(a.get(3), None);
    }

    #[test]
    fn get_is_total_wrong_kind() {
        let a = ConstTableInfo::new().add_int(-4).add_uint(301).add_float(3.14159);
        assert_eq!(a.get_uint(0), None);
        assert_eq!(a.get_uint(1), Some(301));
        assert_eq!(a.get_uint(2), None);
    }

    #[test]
    fn const_kind_tags() {
        let a = ConstTableInfo::new().add_int(-4).add_primitive_type("abc").add_float(3.14159);
        assert_eq!(a.const_kind(0), Some(ConstKind::Int));
        assert_eq!(a.const_kind(1), Some(ConstKind::PrimitiveType));
        assert_eq!(a.const_kind(2), Some(ConstKind::Float));
        assert_eq!(a.const_kind(3), None);
    }

    #[test]
    fn kind_yields_only_for_type_constants() {
        let a = one_of_each();
        for i in 0..5 {
            assert_eq!(a.kind(i), None);
        }
        assert_eq!(a.kind(5), Some(Kind::Primitive));
        assert_eq!(a.kind(6), Some(Kind::Function));
        assert_eq!(a.kind(7), None);
    }

    #[test]
    fn fullname_yields_only_for_type_constants() {
        let a = one_of_each();
        for i in 0..5 {
            assert_eq!(a.fullname(i), None);
        }
        assert_eq!(a.fullname(5).map(Str::as_str), Some("abc"));
        assert_eq!(a.fullname(6).map(Str::as_str), Some("def"));
        assert_eq!(a.fullname(7), None);
    }

    #[test]
    fn callsig_yields_only_for_function_constants() {
        let a = one_of_each();
        for i in 0..6 {
            assert_eq!(a.callsig(i), None);
        }
        assert_eq!(a.callsig(6), Some(&make_callsig([5, 6, 5], 5)));
        assert_eq!(a.callsig(7), None);
    }

    #[test]
    fn equality_is_structural() {
        let a1 = one_of_each();
        let a2 = one_of_each();
        let b = ConstTableInfo::new()
            .add_int(-4)
            .add_float(3.14159)
            .add_bool(true)
            .add_char('y')
            .add_function_type("def", make_callsig([4, 4, 4], 4));

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }
}
