//! Bytecode buffers and per-instruction debug origins.
//!
//! [`Code`] is an append-only vector of fixed-width instructions built by
//! chained `add_*` calls. The reinit flag of each instruction lives in a
//! side table rather than inside [`Instr`]; it is metadata for the verifier,
//! not an operand.
//!
//! [`Syms`] maps instruction indices to source origins for diagnostics. It
//! is sparse: instructions without a symbol simply have none.

use std::{fmt, ops::Index};

use ahash::AHashMap;

use super::op::Opcode;
use crate::intern::Str;

/// A fixed-width instruction: opcode plus operand fields `A`, `B`, `C`.
///
/// The signed displacement `sbx` of jump opcodes shares storage with `B`;
/// [`Instr::sbx`] reinterprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub opc: Opcode,
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Instr {
    fn new(opc: Opcode) -> Self {
        Self { opc, a: 0, b: 0, c: 0 }
    }

    /// The signed displacement of `jump`, `jump_true`, and `jump_false`.
    #[must_use]
    pub fn sbx(self) -> i32 {
        self.b as i32
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opc.mnemonic())?;
        match self.opc {
            Opcode::Noop => Ok(()),
            Opcode::LoadNone | Opcode::Ret => write!(f, " {}", self.a),
            Opcode::LoadConst | Opcode::LoadArg | Opcode::Copy | Opcode::CallNr => {
                write!(f, " {} {}", self.a, self.b)
            }
            Opcode::Call => write!(f, " {} {} {}", self.a, self.b, self.c),
            Opcode::Jump => write!(f, " {}", self.sbx()),
            Opcode::JumpTrue | Opcode::JumpFalse => write!(f, " {} {}", self.a, self.sbx()),
        }
    }
}

/// An append-only bytecode buffer with per-instruction reinit flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    instrs: Vec<Instr>,
    reinit: Vec<bool>,
}

impl Code {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The instruction at `i`, if in range.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Instr> {
        self.instrs.get(i).copied()
    }

    /// The reinit flag of instruction `i`; false when out of range.
    #[must_use]
    pub fn reinit_flag(&self, i: usize) -> bool {
        self.reinit.get(i).copied().unwrap_or(false)
    }

    fn push(mut self, instr: Instr, reinit: bool) -> Self {
        self.instrs.push(instr);
        self.reinit.push(reinit);
        self
    }

    /// Appends `noop`.
    #[must_use]
    pub fn add_noop(self) -> Self {
        self.push(Instr::new(Opcode::Noop), false)
    }

    /// Appends `load_none A`: set register `A` to the none value.
    #[must_use]
    pub fn add_load_none(self, a: u32, reinit: bool) -> Self {
        self.push(Instr { a, ..Instr::new(Opcode::LoadNone) }, reinit)
    }

    /// Appends `load_const A B`: copy constant `B` into register `A`.
    #[must_use]
    pub fn add_load_const(self, a: u32, b: u32, reinit: bool) -> Self {
        self.push(Instr { a, b, ..Instr::new(Opcode::LoadConst) }, reinit)
    }

    /// Appends `load_arg A B`: copy argument `B` of the current call into
    /// register `A`.
    #[must_use]
    pub fn add_load_arg(self, a: u32, b: u32, reinit: bool) -> Self {
        self.push(Instr { a, b, ..Instr::new(Opcode::LoadArg) }, reinit)
    }

    /// Appends `copy A B`: copy register `B` into register `A`.
    #[must_use]
    pub fn add_copy(self, a: u32, b: u32, reinit: bool) -> Self {
        self.push(Instr { a, b, ..Instr::new(Opcode::Copy) }, reinit)
    }

    /// Appends `call A B C`: call the callable in register `A` with the
    /// `B - 1` registers after it as arguments, placing the return value in
    /// register `C`.
    #[must_use]
    pub fn add_call(self, a: u32, b: u32, c: u32, reinit: bool) -> Self {
        self.push(Instr { a, b, c, opc: Opcode::Call }, reinit)
    }

    /// Appends `call_nr A B`: as `call`, discarding the return value.
    #[must_use]
    pub fn add_call_nr(self, a: u32, b: u32) -> Self {
        self.push(Instr { a, b, ..Instr::new(Opcode::CallNr) }, false)
    }

    /// Appends `ret A`: publish register `A` as the return value and
    /// terminate the frame.
    #[must_use]
    pub fn add_ret(self, a: u32) -> Self {
        self.push(Instr { a, ..Instr::new(Opcode::Ret) }, false)
    }

    /// Appends `jump sBx`: unconditional relative branch.
    #[must_use]
    pub fn add_jump(self, sbx: i32) -> Self {
        self.push(Instr { b: sbx as u32, ..Instr::new(Opcode::Jump) }, false)
    }

    /// Appends `jump_true A sBx`: branch iff register `A` holds true.
    #[must_use]
    pub fn add_jump_true(self, a: u32, sbx: i32) -> Self {
        self.push(Instr { a, b: sbx as u32, ..Instr::new(Opcode::JumpTrue) }, false)
    }

    /// Appends `jump_false A sBx`: branch iff register `A` holds false.
    #[must_use]
    pub fn add_jump_false(self, a: u32, sbx: i32) -> Self {
        self.push(Instr { a, b: sbx as u32, ..Instr::new(Opcode::JumpFalse) }, false)
    }

    /// Renders the whole buffer, one instruction per line.
    #[must_use]
    pub fn fmt_disassembly(&self) -> String {
        use fmt::Write;

        let mut out = String::new();
        for (i, instr) in self.instrs.iter().enumerate() {
            let _ = write!(out, "{i:>4}: {instr}");
            if self.reinit_flag(i) {
                out.push_str(" (reinit)");
            }
            out.push('\n');
        }
        out
    }
}

impl Index<usize> for Code {
    type Output = Instr;

    fn index(&self, i: usize) -> &Instr {
        &self.instrs[i]
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fmt_disassembly())
    }
}

/// Debug origin of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sym {
    /// Where the instruction came from (a file, a chunk name, ...).
    pub origin: Str,
    /// Column within the origin.
    pub ch: u32,
    /// Line within the origin.
    pub ln: u32,
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.ln, self.ch)
    }
}

/// Sparse mapping from instruction index to [`Sym`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Syms {
    map: AHashMap<usize, Sym>,
}

impl Syms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates instruction `index` with an origin. A later add for the
    /// same index overwrites the earlier one.
    #[must_use]
    pub fn add(mut self, index: usize, origin: impl Into<Str>, ch: u32, ln: u32) -> Self {
        self.map.insert(index, Sym { origin: origin.into(), ch, ln });
        self
    }

    /// The symbol of instruction `i`, if any.
    #[must_use]
    pub fn fetch(&self, i: usize) -> Option<&Sym> {
        self.map.get(&i)
    }
}
