//! Parcels: the unit of installation.
//!
//! A parcel exposes modules by relative path and declares the dependency
//! names its own descriptors refer to. The domain maps those names onto
//! other installed parcels at install time, so parcels themselves never
//! know their neighbours' real heads.

use ahash::{AHashMap, AHashSet};

use crate::{intern::Str, module::ModuleInfo};

/// A parcel's self-description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParcelMetadata {
    /// The parcel's own head name.
    pub self_name: Str,
    /// Dependency names used by the parcel's descriptors.
    pub dep_names: AHashSet<Str>,
}

impl ParcelMetadata {
    #[must_use]
    pub fn new(self_name: impl Into<Str>, dep_names: impl IntoIterator<Item = impl Into<Str>>) -> Self {
        Self {
            self_name: self_name.into(),
            dep_names: dep_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A named unit exposing modules and declaring dependencies.
///
/// `import` is pure: importing the same path twice must yield structurally
/// equal modules. The domain caches imports, so impure parcels would go
/// unnoticed at best.
pub trait Parcel {
    /// The parcel's self-description.
    fn metadata(&self) -> &ParcelMetadata;

    /// The module at `relative_path`, or `None` if the parcel has none
    /// there. The root module lives at the empty path.
    fn import(&self, relative_path: &str) -> Option<ModuleInfo>;
}

/// An in-memory parcel: a fixed path-to-module map.
///
/// The standard way for hosts to hand modules built with
/// [`ModuleFactory`](crate::module::ModuleFactory) to a domain.
#[derive(Debug, Default)]
pub struct MemoryParcel {
    metadata: ParcelMetadata,
    modules: AHashMap<Str, ModuleInfo>,
}

impl Default for ParcelMetadata {
    fn default() -> Self {
        Self::new("", [] as [&str; 0])
    }
}

impl MemoryParcel {
    #[must_use]
    pub fn new(self_name: impl Into<Str>, dep_names: impl IntoIterator<Item = impl Into<Str>>) -> Self {
        Self {
            metadata: ParcelMetadata::new(self_name, dep_names),
            modules: AHashMap::new(),
        }
    }

    /// Adds the module at `relative_path`, chaining.
    #[must_use]
    pub fn with_module(mut self, relative_path: impl Into<Str>, module: ModuleInfo) -> Self {
        self.modules.insert(relative_path.into(), module);
        self
    }
}

impl Parcel for MemoryParcel {
    fn metadata(&self) -> &ParcelMetadata {
        &self.metadata
    }

    fn import(&self, relative_path: &str) -> Option<ModuleInfo> {
        self.modules.get(relative_path).cloned()
    }
}
