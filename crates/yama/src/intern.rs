//! Interned immutable strings.
//!
//! [`Str`] is the canonical text type of the runtime: cheaply clonable,
//! immutable, with a content hash computed once at construction. Equality is
//! by content; the cached hash makes the common not-equal case a single
//! integer comparison. Every name-keyed map in the crate uses `Str` keys.

use std::{
    borrow::Borrow,
    fmt,
    hash::{BuildHasher, Hash},
    ops::Deref,
    rc::Rc,
    sync::LazyLock,
};

use ahash::RandomState;

/// Fixed-seed hasher state so that hashes agree across all `Str` instances
/// in a process.
static HASH_STATE: LazyLock<RandomState> = LazyLock::new(|| RandomState::with_seeds(11, 19, 105, 230));

/// An immutable, content-addressed string with a precomputed hash.
///
/// Cloning shares the underlying buffer. Two `Str` values compare equal iff
/// their byte sequences are equal.
#[derive(Clone)]
pub struct Str {
    text: Rc<str>,
    hash: u64,
}

impl Str {
    /// Returns the string contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the precomputed content hash.
    #[must_use]
    pub fn cached_hash(&self) -> u64 {
        self.hash
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self {
            text: Rc::from(s),
            hash: HASH_STATE.hash_one(s),
        }
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        let hash = HASH_STATE.hash_one(s.as_str());
        Self {
            text: Rc::from(s),
            hash,
        }
    }
}

impl From<&Str> for Str {
    fn from(s: &Str) -> Self {
        s.clone()
    }
}

impl Deref for Str {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for Str {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl Borrow<str> for Str {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        // Hash mismatch settles inequality without touching the bytes.
        self.hash == other.hash && (Rc::ptr_eq(&self.text, &other.text) || self.text == other.text)
    }
}

impl Eq for Str {}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        &*self.text == other
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        &*self.text == *other
    }
}

impl Hash for Str {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Delegate to the contents so `Borrow<str>` map lookups stay valid.
        self.text.hash(state);
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.text, f)
    }
}

impl Default for Str {
    fn default() -> Self {
        Self::from("")
    }
}
