//! Call-signature descriptors.
//!
//! A [`CallSigInfo`] names its parameter and return types indirectly, as
//! indices into the constant table of the descriptor that owns it. Equality
//! is structural. Rendering quotes each index by the fullname of the
//! referenced constant, which is what makes rendered signatures comparable
//! across tables during linking.

use smallvec::SmallVec;

use crate::consts::ConstTableInfo;

/// Parameter and return indices into a constant table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CallSigInfo {
    params: SmallVec<[u32; 4]>,
    ret: u32,
}

/// Builds a [`CallSigInfo`] from parameter indices and a return index.
pub fn make_callsig(params: impl IntoIterator<Item = u32>, ret: u32) -> CallSigInfo {
    CallSigInfo {
        params: params.into_iter().collect(),
        ret,
    }
}

impl CallSigInfo {
    /// Parameter type indices, in declaration order.
    #[must_use]
    pub fn params(&self) -> &[u32] {
        &self.params
    }

    /// Number of parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Return type index.
    #[must_use]
    pub fn ret(&self) -> u32 {
        self.ret
    }

    /// True iff every parameter index and the return index is strictly less
    /// than `len`.
    #[must_use]
    pub fn verify_indices(&self, len: usize) -> bool {
        self.params.iter().all(|&i| (i as usize) < len) && (self.ret as usize) < len
    }

    /// Renders `fn(a, b, c) -> r`, quoting indices by the fullnames of the
    /// entries of `consts`. Out-of-bounds or non-type indices render as
    /// `<out-of-bounds(N)>`; a legal formatting outcome, but an illegal
    /// verified state.
    #[must_use]
    pub fn fmt_with(&self, consts: &ConstTableInfo) -> String {
        let quote = |i: u32| match consts.fullname(i as usize) {
            Some(name) => name.to_string(),
            None => format!("<out-of-bounds({i})>"),
        };
        let params = self.params.iter().map(|&i| quote(i)).collect::<Vec<_>>().join(", ");
        format!("fn({params}) -> {}", quote(self.ret))
    }
}
