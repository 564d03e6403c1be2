//! Runtime values.
//!
//! Registers and the host value stack hold [`Value`]s: small immediates
//! tagged at runtime. There is no heap in this core; the only indirection is
//! [`Value::Fn`], a handle to a function type resolved by the domain.

use std::fmt;

use strum::IntoStaticStr;

use crate::{domain::TypeId, typeinfo::PType};

/// A runtime value.
///
/// `None` doubles as the none *state* of a register: a register that has not
/// been written yet holds `None`, which is also the sole value of the
/// `yama:None` type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Char(char),
    /// A callable: a value of some function type resolved by the domain.
    Fn(TypeId),
}

/// The runtime kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    None,
    Int,
    UInt,
    Float,
    Bool,
    Char,
    Fn,
}

impl Value {
    /// The runtime kind tag.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::None => ValueKind::None,
            Self::Int(_) => ValueKind::Int,
            Self::UInt(_) => ValueKind::UInt,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::Char(_) => ValueKind::Char,
            Self::Fn(_) => ValueKind::Fn,
        }
    }

    /// True iff this value inhabits the primitive type `ptype`.
    #[must_use]
    pub(crate) fn is_of_ptype(&self, ptype: PType) -> bool {
        matches!(
            (self, ptype),
            (Self::None, PType::None)
                | (Self::Int(_), PType::Int)
                | (Self::UInt(_), PType::UInt)
                | (Self::Float(_), PType::Float)
                | (Self::Bool(_), PType::Bool)
                | (Self::Char(_), PType::Char)
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}u"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "{v:?}"),
            Self::Fn(id) => write!(f, "<fn #{}>", id.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_track_variants() {
        assert_eq!(Value::None.kind(), ValueKind::None);
        assert_eq!(Value::Int(1).kind(), ValueKind::Int);
        assert_eq!(Value::UInt(1).kind(), ValueKind::UInt);
        assert_eq!(Value::Float(1.0).kind(), ValueKind::Float);
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::Char('y').kind(), ValueKind::Char);
    }

    #[test]
    fn ptype_inhabitance() {
        assert!(Value::Int(3).is_of_ptype(PType::Int));
        assert!(!Value::Int(3).is_of_ptype(PType::UInt));
        assert!(Value::None.is_of_ptype(PType::None));
        assert!(!Value::Bool(false).is_of_ptype(PType::None));
    }
}
