//! Categorized diagnostic sinks.
//!
//! The runtime reports verifier failures, low-level context commands, and
//! panics through a [`DebugSink`]. Sinks are shared handles; a [`Dbg`] with
//! no sink discards everything. [`ProxySink`] narrows an existing sink to a
//! subset of categories, so one backing stream can serve several components
//! at different verbosities.

use std::{fmt, rc::Rc};

use bitflags::bitflags;

bitflags! {
    /// Bitmask of diagnostic categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugCats: u32 {
        /// Uncategorized runtime chatter.
        const GENERAL = 1 << 0;
        /// Descriptor verification and linking.
        const COMPILE = 1 << 1;
        /// Low-level context commands (push/pop/call traffic).
        const CTX_LLCMD = 1 << 2;
        /// Context panics.
        const CTX_PANIC = 1 << 3;
        /// Everything, including categories added later.
        const ALL = u32::MAX;
    }
}

impl fmt::Display for DebugCats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// A stream of categorized diagnostic messages.
///
/// `cats` advertises which categories the sink wants; [`Dbg::post`] consults
/// it before formatting, so messages nobody listens to cost nothing beyond
/// the mask test.
pub trait DebugSink: fmt::Debug {
    /// The categories this sink accepts.
    fn cats(&self) -> DebugCats {
        DebugCats::ALL
    }

    /// Delivers one message. `cat` is the single category it was posted under.
    fn post(&self, cat: DebugCats, msg: &str);
}

/// A shared, possibly absent debug sink. Absent means discard.
#[derive(Debug, Clone, Default)]
pub struct Dbg(Option<Rc<dyn DebugSink>>);

impl Dbg {
    /// A handle that discards all messages.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps a sink in a shared handle.
    #[must_use]
    pub fn new(sink: Rc<dyn DebugSink>) -> Self {
        Self(Some(sink))
    }

    /// True if a message posted under `cat` would be delivered.
    #[must_use]
    pub fn wants(&self, cat: DebugCats) -> bool {
        self.0.as_ref().is_some_and(|s| s.cats().intersects(cat))
    }

    /// Posts a formatted message under `cat` if the sink accepts it.
    pub fn post(&self, cat: DebugCats, args: fmt::Arguments<'_>) {
        if let Some(sink) = &self.0
            && sink.cats().intersects(cat)
        {
            sink.post(cat, &args.to_string());
        }
    }
}

/// Posts a formatted diagnostic to a [`Dbg`] handle.
macro_rules! dlog {
    ($dbg:expr, $cat:expr, $($arg:tt)*) => {
        $dbg.post($cat, format_args!($($arg)*))
    };
}

pub(crate) use dlog;

/// A sink writing to stderr, one line per message, prefixed by category.
#[derive(Debug)]
pub struct StderrSink {
    cats: DebugCats,
}

impl StderrSink {
    /// A stderr sink accepting only the given categories.
    #[must_use]
    pub fn new(cats: DebugCats) -> Self {
        Self { cats }
    }

    /// A stderr sink accepting everything.
    #[must_use]
    pub fn all() -> Self {
        Self::new(DebugCats::ALL)
    }
}

impl DebugSink for StderrSink {
    fn cats(&self) -> DebugCats {
        self.cats
    }

    fn post(&self, cat: DebugCats, msg: &str) {
        eprintln!("[{cat}] {msg}");
    }
}

/// A sink forwarding to a base sink through a category mask.
///
/// The proxy's accepted set is the intersection of the base's categories and
/// the mask; messages outside it are dropped before reaching the base.
#[derive(Debug)]
pub struct ProxySink {
    base: Rc<dyn DebugSink>,
    cats: DebugCats,
}

impl ProxySink {
    #[must_use]
    pub fn new(base: Rc<dyn DebugSink>, mask: DebugCats) -> Self {
        let cats = base.cats() & mask;
        Self { base, cats }
    }

    /// The base sink this proxy forwards to.
    #[must_use]
    pub fn base(&self) -> &Rc<dyn DebugSink> {
        &self.base
    }
}

impl DebugSink for ProxySink {
    fn cats(&self) -> DebugCats {
        self.cats
    }

    fn post(&self, cat: DebugCats, msg: &str) {
        if self.cats.intersects(cat) {
            self.base.post(cat, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Debug)]
    struct CollectSink {
        cats: DebugCats,
        seen: RefCell<Vec<(DebugCats, String)>>,
    }

    impl CollectSink {
        fn new(cats: DebugCats) -> Self {
            Self {
                cats,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl DebugSink for CollectSink {
        fn cats(&self) -> DebugCats {
            self.cats
        }

        fn post(&self, cat: DebugCats, msg: &str) {
            self.seen.borrow_mut().push((cat, msg.to_owned()));
        }
    }

    #[test]
    fn absent_sink_discards() {
        let dbg = Dbg::none();
        assert!(!dbg.wants(DebugCats::GENERAL));
        dlog!(dbg, DebugCats::GENERAL, "dropped {}", 1);
    }

    #[test]
    fn proxy_intersects_base_categories() {
        let base = Rc::new(CollectSink::new(
            DebugCats::COMPILE | DebugCats::CTX_LLCMD | DebugCats::CTX_PANIC,
        ));
        let proxy = ProxySink::new(base.clone(), !DebugCats::CTX_PANIC);

        assert_eq!(proxy.cats(), DebugCats::COMPILE | DebugCats::CTX_LLCMD);
    }

    #[test]
    fn proxy_drops_masked_messages() {
        let base = Rc::new(CollectSink::new(DebugCats::ALL));
        let dbg = Dbg::new(Rc::new(ProxySink::new(base.clone(), DebugCats::COMPILE)));

        dlog!(dbg, DebugCats::COMPILE, "kept");
        dlog!(dbg, DebugCats::CTX_PANIC, "dropped");

        let seen = base.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "kept");
    }
}
