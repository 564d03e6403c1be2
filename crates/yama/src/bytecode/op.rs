//! Opcode definitions.

use strum::{EnumCount, FromRepr, IntoStaticStr};

/// The instruction set, closed at 11 opcodes.
///
/// Operand roles per opcode are documented on [`super::Code`]'s `add_*`
/// methods; the interpreter's dispatch and the verifier both switch
/// exhaustively over this enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    Noop,
    LoadNone,
    LoadConst,
    LoadArg,
    Copy,
    Call,
    CallNr,
    Ret,
    Jump,
    JumpTrue,
    JumpFalse,
}

const _: () = assert!(Opcode::COUNT == 11, "the opcode set is closed at 11");

impl Opcode {
    /// The disassembly mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// True for opcodes whose destination write is governed by the per
    /// instruction reinit flag.
    #[must_use]
    pub fn uses_reinit(self) -> bool {
        matches!(
            self,
            Self::LoadNone | Self::LoadConst | Self::LoadArg | Self::Copy | Self::Call
        )
    }
}
