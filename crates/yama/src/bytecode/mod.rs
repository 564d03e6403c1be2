//! Bytecode representation.
//!
//! - `op` - the closed opcode set
//! - `code` - instruction buffers, reinit flags, and debug origins

pub use code::{Code, Instr, Sym, Syms};
pub use op::Opcode;

mod code;
mod op;
