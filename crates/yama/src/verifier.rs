//! Static verification of type descriptors.
//!
//! The verifier certifies whole descriptors before the domain links them:
//! constant tables, call signatures, and bytecode bodies. It never runs
//! code; bytecode checks are structural plus a forward dataflow pass over
//! register initialization. Verification is pure over its input aside from
//! diagnostics to the configured sink, and idempotent: a descriptor that
//! already carries the verified latch passes immediately.

use crate::{
    bytecode::{Instr, Opcode},
    callsig::CallSigInfo,
    consts::{ConstEntry, ConstTableInfo},
    dbg::{dlog, Dbg, DebugCats},
    typeinfo::{CallFn, FunctionInfo, KindInfo, TypeInfo},
};

/// Certifies descriptors, reporting failures to a diagnostic sink.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    dbg: Dbg,
}

impl StaticVerifier {
    #[must_use]
    pub fn new(dbg: Dbg) -> Self {
        Self { dbg }
    }

    /// Verifies `info`, latching success onto the descriptor.
    ///
    /// Returns false and emits at least one diagnostic on any violation.
    /// Re-verifying an already-certified descriptor is a no-op returning
    /// true.
    pub fn verify(&self, info: &TypeInfo) -> bool {
        if info.verified() {
            return true;
        }
        let ok = self.check(info);
        if ok {
            info.mark_verified();
        }
        ok
    }

    fn fail(&self, info: &TypeInfo, what: &str) -> bool {
        dlog!(
            self.dbg,
            DebugCats::COMPILE,
            "({}) verification failure: {what}",
            info.unqualified_name
        );
        false
    }

    fn check(&self, info: &TypeInfo) -> bool {
        if !self.check_consts(info) {
            return false;
        }
        match &info.info {
            KindInfo::Function(f) => self.check_function(info, f),
            KindInfo::Primitive(_) | KindInfo::Struct(_) => true,
        }
    }

    /// Checks every embedded signature of the constant table.
    fn check_consts(&self, info: &TypeInfo) -> bool {
        let consts = &info.consts;
        for (i, entry) in consts.iter().enumerate() {
            if let ConstEntry::FunctionType(name, callsig) = entry
                && !self.check_callsig(info, callsig, consts)
            {
                return self.fail(info, &format!("constant {i} ({name}) carries an invalid callsig"));
            }
        }
        true
    }

    /// A signature's indices must be in bounds and refer to type constants.
    fn check_callsig(&self, _info: &TypeInfo, callsig: &CallSigInfo, consts: &ConstTableInfo) -> bool {
        callsig.verify_indices(consts.len())
            && callsig
                .params()
                .iter()
                .chain(std::iter::once(&callsig.ret()))
                .all(|&i| consts.kind(i as usize).is_some())
    }

    fn check_function(&self, info: &TypeInfo, f: &FunctionInfo) -> bool {
        if !self.check_callsig(info, &f.callsig, &info.consts) {
            return self.fail(info, "the type's own callsig has invalid indices");
        }
        let params = u32::try_from(f.callsig.param_count()).unwrap_or(u32::MAX);
        if f.max_locals < params.saturating_add(1) {
            return self.fail(
                info,
                &format!("max_locals {} cannot fit {params} params plus the return slot", f.max_locals),
            );
        }
        match f.call_fn {
            CallFn::Native(_) => true,
            CallFn::Bytecode => self.check_bcode(info, f),
        }
    }

    fn check_bcode(&self, info: &TypeInfo, f: &FunctionInfo) -> bool {
        let code = &f.bcode;
        if code.is_empty() {
            return self.fail(info, "bytecode body is empty");
        }
        for i in 0..code.len() {
            if !self.check_instr(info, f, i, code[i]) {
                return false;
            }
        }
        let last = code[code.len() - 1];
        if !matches!(last.opc, Opcode::Ret | Opcode::Jump) {
            return self.fail(info, "final instruction may fall through (must be ret or jump)");
        }
        self.check_reinit_discipline(info, f)
    }

    /// Structural checks for one instruction: operand bounds and jump
    /// targets.
    fn check_instr(&self, info: &TypeInfo, f: &FunctionInfo, i: usize, instr: Instr) -> bool {
        let max_locals = f.max_locals;
        let reg_ok = |r: u32| r < max_locals;
        let instr_fail = |what: &str| self.fail(info, &format!("instr {i} ({}): {what}", instr.opc.mnemonic()));

        match instr.opc {
            Opcode::Noop => true,
            Opcode::LoadNone | Opcode::Ret => {
                reg_ok(instr.a) || instr_fail("register A out of bounds")
            }
            Opcode::LoadConst => {
                if !reg_ok(instr.a) {
                    return instr_fail("register A out of bounds");
                }
                match info.consts.get(instr.b as usize) {
                    None => instr_fail("constant B out of bounds"),
                    Some(entry) if !entry.is_loadable() => instr_fail("constant B is not loadable"),
                    Some(_) => true,
                }
            }
            Opcode::LoadArg => {
                if !reg_ok(instr.a) {
                    return instr_fail("register A out of bounds");
                }
                (instr.b as usize) < f.callsig.param_count() || instr_fail("argument B out of bounds")
            }
            Opcode::Copy => {
                (reg_ok(instr.a) || instr_fail("register A out of bounds"))
                    && (reg_ok(instr.b) || instr_fail("register B out of bounds"))
            }
            Opcode::Call | Opcode::CallNr => {
                if instr.b == 0 {
                    return instr_fail("operand window must include the callee (B >= 1)");
                }
                if instr.a.checked_add(instr.b).is_none_or(|end| end > max_locals) {
                    return instr_fail("operand window out of bounds");
                }
                instr.opc != Opcode::Call || reg_ok(instr.c) || instr_fail("register C out of bounds")
            }
            Opcode::Jump => {
                Self::jump_target(i, instr, f.bcode.len()).is_some() || instr_fail("jump target out of bounds")
            }
            Opcode::JumpTrue | Opcode::JumpFalse => {
                if !reg_ok(instr.a) {
                    return instr_fail("register A out of bounds");
                }
                Self::jump_target(i, instr, f.bcode.len()).is_some() || instr_fail("jump target out of bounds")
            }
        }
    }

    /// The branch destination of the jump at `i`, if it lands in bounds.
    fn jump_target(i: usize, instr: Instr, len: usize) -> Option<usize> {
        let target = i64::try_from(i).ok()? + 1 + i64::from(instr.sbx());
        let target = usize::try_from(target).ok()?;
        (target < len).then_some(target)
    }

    /// Forward may-initialized dataflow enforcing the reinit discipline:
    /// writing a register that may already hold a value requires the
    /// instruction's reinit flag.
    fn check_reinit_discipline(&self, info: &TypeInfo, f: &FunctionInfo) -> bool {
        let code = &f.bcode;
        let max_locals = f.max_locals as usize;
        let params = f.callsig.param_count();

        // Per-instruction entry state; None = not yet reached.
        let mut states: Vec<Option<Vec<bool>>> = vec![None; code.len()];
        let mut entry = vec![false; max_locals];
        for slot in entry.iter_mut().take(params) {
            *slot = true;
        }
        states[0] = Some(entry);
        let mut worklist = vec![0usize];

        while let Some(i) = worklist.pop() {
            let Some(state) = states[i].clone() else { continue };
            let mut state = state;
            let instr = code[i];
            let reinit = code.reinit_flag(i);

            let mut write = |state: &mut Vec<bool>, reg: u32| -> bool {
                let reg = reg as usize;
                if state[reg] && !reinit {
                    return self.fail(
                        info,
                        &format!(
                            "instr {i} ({}) overwrites initialized register {reg} without reinit",
                            instr.opc.mnemonic()
                        ),
                    );
                }
                state[reg] = true;
                true
            };

            let mut succs: Vec<usize> = Vec::with_capacity(2);
            match instr.opc {
                Opcode::Noop | Opcode::CallNr => succs.push(i + 1),
                Opcode::LoadNone | Opcode::LoadConst | Opcode::LoadArg | Opcode::Copy => {
                    if !write(&mut state, instr.a) {
                        return false;
                    }
                    succs.push(i + 1);
                }
                Opcode::Call => {
                    if !write(&mut state, instr.c) {
                        return false;
                    }
                    succs.push(i + 1);
                }
                Opcode::Ret => {}
                Opcode::Jump => {
                    if let Some(t) = Self::jump_target(i, instr, code.len()) {
                        succs.push(t);
                    }
                }
                Opcode::JumpTrue | Opcode::JumpFalse => {
                    if let Some(t) = Self::jump_target(i, instr, code.len()) {
                        succs.push(t);
                    }
                    succs.push(i + 1);
                }
            }

            for succ in succs {
                // The final-instruction rule guarantees fall-throughs stay in
                // bounds; guard anyway so a malformed buffer cannot index out.
                if succ >= code.len() {
                    return self.fail(info, &format!("instr {i} falls through the end of the buffer"));
                }
                let changed = match &mut states[succ] {
                    Some(existing) => {
                        let mut changed = false;
                        for (e, s) in existing.iter_mut().zip(&state) {
                            if *s && !*e {
                                *e = true;
                                changed = true;
                            }
                        }
                        changed
                    }
                    slot @ None => {
                        *slot = Some(state.clone());
                        true
                    }
                };
                if changed {
                    worklist.push(succ);
                }
            }
        }
        true
    }
}
