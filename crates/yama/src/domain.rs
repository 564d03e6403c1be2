//! Domains: installed parcels, the dependency graph, and the resolved-type
//! registry.
//!
//! A domain owns everything code-shaped: parcels admitted by [`Domain::install`],
//! modules imported on demand, and type descriptors certified by the static
//! verifier. Resolution turns fully-qualified names into [`Type`] handles and
//! caches them; loading the same name twice yields the same handle.
//!
//! Installation is atomic: a batch is admitted wholesale or rejected with the
//! domain unchanged. Parcels are never removed.

use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashMap;

use crate::{
    callsig::CallSigInfo,
    consts::{ConstEntry, ConstTableInfo},
    dbg::{dlog, Dbg, DebugCats},
    intern::Str,
    module::ModuleInfo,
    parcel::Parcel,
    spec_parser::{QualifiedName, SpecError},
    typeinfo::{Kind, KindInfo, PType, PrimitiveInfo, TypeInfo},
    value::Value,
    verifier::StaticVerifier,
};

/// The reserved head of the built-in parcel.
pub const YAMA_HEAD: &str = "yama";

/// The reserved head referring to a descriptor's own parcel.
pub const SELF_HEAD: &str = "self";

/// Index of a resolved type in its domain's arena.
///
/// Opaque; only meaningful together with the domain that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A resolved, verified, linked type in the arena.
#[derive(Debug)]
pub(crate) struct LoadedType {
    pub(crate) fullname: Str,
    /// Head of the owning parcel (post dep mapping).
    pub(crate) head: Str,
    pub(crate) info: Rc<TypeInfo>,
    /// Per-constant resolved links; `None` for non-type constants.
    pub(crate) links: Rc<Vec<Option<TypeId>>>,
}

/// Why an install batch was rejected. The domain is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    /// A batch head collides with an installed parcel, the built-in parcel,
    /// or another batch entry.
    DuplicateHead(Str),
    /// A dependency mapping names a consumer that is not in the batch.
    UnknownConsumer { head: Str },
    /// Two mappings cover the same `(consumer, dep)` pair.
    DuplicateDepMapping { head: Str, dep: Str },
    /// A parcel declares a dependency the batch does not map.
    MissingDepMapping { head: Str, dep: Str },
    /// A mapping's producer is neither installed nor in the batch.
    UnknownProducer { head: Str, dep: Str, producer: Str },
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateHead(head) => write!(f, "parcel head {head} is already taken"),
            Self::UnknownConsumer { head } => {
                write!(f, "dep mapping consumer {head} is not in the batch")
            }
            Self::DuplicateDepMapping { head, dep } => {
                write!(f, "dep {dep} of {head} is mapped twice")
            }
            Self::MissingDepMapping { head, dep } => {
                write!(f, "dep {dep} of {head} has no mapping")
            }
            Self::UnknownProducer { head, dep, producer } => {
                write!(f, "dep {dep} of {head} maps to unknown parcel {producer}")
            }
        }
    }
}

impl std::error::Error for InstallError {}

/// Why a name failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The spec string itself is unusable.
    Spec(SpecError),
    /// No parcel under that head (after dep mapping, where applicable).
    UnknownParcel(Str),
    /// The parcel has no module at that path.
    UnknownModule { head: Str, path: Str },
    /// The module declares no type of that name.
    UnknownName(Str),
    /// Members are not resolvable in this core.
    UnknownMember(Str),
    /// The descriptor failed static verification.
    VerifyFailed(Str),
    /// A type constant resolved to a type of the wrong shape.
    LinkMismatch { fullname: Str, index: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(err) => write!(f, "bad spec: {err}"),
            Self::UnknownParcel(head) => write!(f, "unknown parcel {head}"),
            Self::UnknownModule { head, path } => write!(f, "parcel {head} has no module at '{path}'"),
            Self::UnknownName(fullname) => write!(f, "unknown type {fullname}"),
            Self::UnknownMember(fullname) => write!(f, "members are not resolvable: {fullname}"),
            Self::VerifyFailed(fullname) => write!(f, "type {fullname} failed verification"),
            Self::LinkMismatch { fullname, index } => {
                write!(f, "type {fullname}: constant {index} links to an incompatible type")
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl From<SpecError> for LoadError {
    fn from(err: SpecError) -> Self {
        Self::Spec(err)
    }
}

/// An atomic set of parcel additions plus their dependency mappings.
#[derive(Default)]
pub struct InstallBatch {
    parcels: Vec<Rc<dyn Parcel>>,
    deps: Vec<(Str, Str, Str)>,
}

impl InstallBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parcel under the head its metadata declares.
    #[must_use]
    pub fn add_parcel(mut self, parcel: Rc<dyn Parcel>) -> Self {
        self.parcels.push(parcel);
        self
    }

    /// Maps `dep_name` of `consumer_head` onto `producer_head`.
    #[must_use]
    pub fn map_dep(
        mut self,
        consumer_head: impl Into<Str>,
        dep_name: impl Into<Str>,
        producer_head: impl Into<Str>,
    ) -> Self {
        self.deps.push((consumer_head.into(), dep_name.into(), producer_head.into()));
        self
    }
}

pub(crate) struct DomainCore {
    dbg: Dbg,
    verifier: StaticVerifier,
    /// (P) installed parcels by head.
    parcels: RefCell<AHashMap<Str, Rc<dyn Parcel>>>,
    /// (D) `(consumer head, dep name) -> producer head`.
    deps: RefCell<AHashMap<(Str, Str), Str>>,
    /// Import cache: `(head, path) -> module`.
    modules: RefCell<AHashMap<(Str, Str), ModuleInfo>>,
    /// Arena of resolved types.
    types: RefCell<Vec<LoadedType>>,
    /// (R) fullname -> arena index.
    registry: RefCell<AHashMap<Str, TypeId>>,
}

impl fmt::Debug for DomainCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainCore")
            .field("parcels", &self.parcels.borrow().len())
            .field("types", &self.types.borrow().len())
            .finish_non_exhaustive()
    }
}

/// The built-in primitives, in arena order.
const BUILTINS: [(&str, PType); 6] = [
    ("Int", PType::Int),
    ("UInt", PType::UInt),
    ("Float", PType::Float),
    ("Bool", PType::Bool),
    ("Char", PType::Char),
    ("None", PType::None),
];

impl DomainCore {
    fn new(dbg: Dbg) -> Self {
        let core = Self {
            verifier: StaticVerifier::new(dbg.clone()),
            dbg,
            parcels: RefCell::new(AHashMap::new()),
            deps: RefCell::new(AHashMap::new()),
            modules: RefCell::new(AHashMap::new()),
            types: RefCell::new(Vec::new()),
            registry: RefCell::new(AHashMap::new()),
        };
        for (name, ptype) in BUILTINS {
            let info = TypeInfo::new(
                name,
                ConstTableInfo::new(),
                KindInfo::Primitive(PrimitiveInfo { ptype }),
            );
            info.mark_verified();
            let fullname = Str::from(format!("{YAMA_HEAD}:{name}"));
            let id = TypeId(u32::try_from(core.types.borrow().len()).unwrap_or(u32::MAX));
            core.types.borrow_mut().push(LoadedType {
                fullname: fullname.clone(),
                head: Str::from(YAMA_HEAD),
                info: Rc::new(info),
                links: Rc::new(Vec::new()),
            });
            core.registry.borrow_mut().insert(fullname, id);
        }
        core
    }

    pub(crate) fn fullname_of(&self, id: TypeId) -> Str {
        self.types.borrow()[id.index()].fullname.clone()
    }

    pub(crate) fn info_of(&self, id: TypeId) -> Rc<TypeInfo> {
        self.types.borrow()[id.index()].info.clone()
    }

    pub(crate) fn links_of(&self, id: TypeId) -> Rc<Vec<Option<TypeId>>> {
        self.types.borrow()[id.index()].links.clone()
    }

    /// True iff `value` inhabits the type at `id`.
    pub(crate) fn value_matches(&self, value: &Value, id: TypeId) -> bool {
        match value {
            Value::Fn(tid) => *tid == id,
            _ => {
                let info = self.info_of(id);
                info.ptype().is_some_and(|p| value.is_of_ptype(p))
            }
        }
    }

    /// Maps a spec head to a real parcel head.
    ///
    /// Inside a parcel (`owner` present), `self` names the parcel itself and
    /// every other head goes through the dependency mapping; the built-in
    /// head is an implicit dependency of every parcel. At the host level the
    /// head is taken as-is.
    fn map_head(&self, owner: Option<&Str>, head: &Str) -> Result<Str, LoadError> {
        let Some(owner) = owner else {
            return Ok(head.clone());
        };
        if *head == SELF_HEAD {
            return Ok(owner.clone());
        }
        if let Some(producer) = self.deps.borrow().get(&(owner.clone(), head.clone())) {
            return Ok(producer.clone());
        }
        if *head == YAMA_HEAD {
            return Ok(head.clone());
        }
        Err(LoadError::UnknownParcel(head.clone()))
    }

    /// Canonical fullnames of a signature's parameter and return types,
    /// resolved relative to `owner_head`. Used to compare signatures across
    /// constant tables without touching resolved links.
    fn canonical_callsig(
        &self,
        owner_head: &Str,
        consts: &ConstTableInfo,
        sig: &CallSigInfo,
    ) -> Result<Vec<String>, LoadError> {
        sig.params()
            .iter()
            .chain(std::iter::once(&sig.ret()))
            .map(|&i| {
                let name = consts
                    .fullname(i as usize)
                    .ok_or(LoadError::Spec(SpecError::MissingTypeName))?;
                let qn = QualifiedName::parse(name.as_str())?;
                let head = self.map_head(Some(owner_head), qn.head())?;
                Ok(qn.with_head(head).to_string())
            })
            .collect()
    }

    /// Resolves a qualified name to an arena slot, loading and linking on
    /// demand. `owner` is the head of the parcel whose descriptor mentions
    /// the name, or `None` at the host boundary.
    fn resolve(&self, owner: Option<&Str>, qn: &QualifiedName) -> Result<TypeId, LoadError> {
        let head = self.map_head(owner, qn.head())?;
        let canonical = qn.with_head(head.clone());
        let fullname = Str::from(canonical.to_string());

        if let Some(&id) = self.registry.borrow().get(fullname.as_str()) {
            return Ok(id);
        }
        if head == YAMA_HEAD {
            // Builtins are pre-registered; anything else under the built-in
            // head does not exist.
            return Err(LoadError::UnknownName(fullname));
        }

        let path = Str::from(canonical.path_string());
        let module = self.import_module(&head, &path)?;
        let Some(info) = module.get(canonical.name().as_str()).cloned() else {
            return Err(LoadError::UnknownName(fullname));
        };

        if !self.verifier.verify(&info) {
            return Err(LoadError::VerifyFailed(fullname));
        }

        // Register before linking so cyclic references resolve to this slot.
        let id = TypeId(u32::try_from(self.types.borrow().len()).unwrap_or(u32::MAX));
        self.types.borrow_mut().push(LoadedType {
            fullname: fullname.clone(),
            head: head.clone(),
            info: info.clone(),
            links: Rc::new(Vec::new()),
        });
        self.registry.borrow_mut().insert(fullname.clone(), id);

        match self.link_consts(&head, &fullname, &info) {
            Ok(links) => {
                self.types.borrow_mut()[id.index()].links = Rc::new(links);
                dlog!(self.dbg, DebugCats::COMPILE, "loaded {fullname}");
                Ok(id)
            }
            Err(err) => {
                // Withdraw the provisional registration. The arena slot
                // stays (cyclic neighbours may already point at it) but is
                // unreachable by name.
                self.registry.borrow_mut().remove(fullname.as_str());
                Err(err)
            }
        }
    }

    /// Resolves every type constant of `info`, checking each against its
    /// declared kind and (for function constants) declared signature.
    fn link_consts(&self, head: &Str, fullname: &Str, info: &TypeInfo) -> Result<Vec<Option<TypeId>>, LoadError> {
        let mut links = Vec::with_capacity(info.consts.len());
        for (i, entry) in info.consts.iter().enumerate() {
            let link = match entry {
                ConstEntry::PrimitiveType(name) | ConstEntry::FunctionType(name, _) => {
                    let qn = QualifiedName::parse(name.as_str())?;
                    let target = self.resolve(Some(head), &qn)?;
                    let target_entry = {
                        let types = self.types.borrow();
                        let t = &types[target.index()];
                        (t.info.clone(), t.head.clone())
                    };
                    let mismatch = || LoadError::LinkMismatch {
                        fullname: fullname.clone(),
                        index: i,
                    };
                    match entry {
                        ConstEntry::PrimitiveType(_) => {
                            if target_entry.0.kind() != Kind::Primitive {
                                return Err(mismatch());
                            }
                        }
                        ConstEntry::FunctionType(_, declared_sig) => {
                            let Some(target_sig) = target_entry.0.callsig() else {
                                return Err(mismatch());
                            };
                            let declared = self.canonical_callsig(head, &info.consts, declared_sig)?;
                            let actual =
                                self.canonical_callsig(&target_entry.1, &target_entry.0.consts, target_sig)?;
                            if declared != actual {
                                return Err(mismatch());
                            }
                        }
                        _ => {}
                    }
                    Some(target)
                }
                _ => None,
            };
            links.push(link);
        }
        Ok(links)
    }

    /// [`Domain::load`] reachable from a context holding only the core.
    pub(crate) fn load_for_ctx(self: &Rc<Self>, spec: &str) -> Result<Type, LoadError> {
        let qn = QualifiedName::parse(spec)?;
        if qn.member().is_some() {
            return Err(LoadError::UnknownMember(Str::from(qn.to_string())));
        }
        let id = self.resolve(None, &qn)?;
        Ok(Type {
            core: self.clone(),
            id,
        })
    }

    /// Imports (with caching) the module of `head` at `path`.
    fn import_module(&self, head: &Str, path: &Str) -> Result<ModuleInfo, LoadError> {
        if let Some(module) = self.modules.borrow().get(&(head.clone(), path.clone())) {
            return Ok(module.clone());
        }
        let parcel = self
            .parcels
            .borrow()
            .get(head.as_str())
            .cloned()
            .ok_or_else(|| LoadError::UnknownParcel(head.clone()))?;
        let module = parcel.import(path.as_str()).ok_or_else(|| LoadError::UnknownModule {
            head: head.clone(),
            path: path.clone(),
        })?;
        self.modules
            .borrow_mut()
            .insert((head.clone(), path.clone()), module.clone());
        Ok(module)
    }
}

/// Owner of parcels, modules, and resolved types.
///
/// Cheap to clone (shared handle). Not thread-safe; a single context at a
/// time may drive resolution.
#[derive(Debug, Clone)]
pub struct Domain {
    core: Rc<DomainCore>,
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Domain {
    /// A domain with the built-in primitives and no diagnostics.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with(Dbg::none())
    }

    /// A domain reporting diagnostics to `dbg`.
    #[must_use]
    pub fn new_with(dbg: Dbg) -> Self {
        Self {
            core: Rc::new(DomainCore::new(dbg)),
        }
    }

    pub(crate) fn core(&self) -> &Rc<DomainCore> {
        &self.core
    }

    /// Admits a batch of parcels and dependency mappings, atomically.
    ///
    /// On any validation failure the domain is structurally unchanged and
    /// the error names the first offending entry.
    pub fn install(&self, batch: InstallBatch) -> Result<(), InstallError> {
        let core = &self.core;

        // Validate heads.
        let mut batch_heads: Vec<Str> = Vec::with_capacity(batch.parcels.len());
        {
            let installed = core.parcels.borrow();
            for parcel in &batch.parcels {
                let head = parcel.metadata().self_name.clone();
                if head == YAMA_HEAD
                    || head == SELF_HEAD
                    || installed.contains_key(head.as_str())
                    || batch_heads.contains(&head)
                {
                    return Err(InstallError::DuplicateHead(head));
                }
                batch_heads.push(head);
            }
        }

        // Validate dependency mappings.
        let mut new_deps: AHashMap<(Str, Str), Str> = AHashMap::new();
        for (consumer, dep, producer) in &batch.deps {
            if !batch_heads.contains(consumer) {
                return Err(InstallError::UnknownConsumer { head: consumer.clone() });
            }
            let known = *producer == YAMA_HEAD
                || batch_heads.contains(producer)
                || core.parcels.borrow().contains_key(producer.as_str());
            if !known {
                return Err(InstallError::UnknownProducer {
                    head: consumer.clone(),
                    dep: dep.clone(),
                    producer: producer.clone(),
                });
            }
            if new_deps
                .insert((consumer.clone(), dep.clone()), producer.clone())
                .is_some()
            {
                return Err(InstallError::DuplicateDepMapping {
                    head: consumer.clone(),
                    dep: dep.clone(),
                });
            }
        }

        // Every declared dependency must be mapped.
        for (parcel, head) in batch.parcels.iter().zip(&batch_heads) {
            for dep in &parcel.metadata().dep_names {
                if !new_deps.contains_key(&(head.clone(), dep.clone())) {
                    return Err(InstallError::MissingDepMapping {
                        head: head.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        // Commit.
        {
            let mut parcels = core.parcels.borrow_mut();
            for (parcel, head) in batch.parcels.into_iter().zip(batch_heads) {
                parcels.insert(head, parcel);
            }
        }
        core.deps.borrow_mut().extend(new_deps);
        dlog!(core.dbg, DebugCats::GENERAL, "install batch admitted");
        Ok(())
    }

    /// Resolves a spec string to a type handle, loading on demand.
    pub fn load(&self, spec: &str) -> Result<Type, LoadError> {
        self.core.load_for_ctx(spec)
    }

    /// Number of resolved types, builtins included.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.core.types.borrow().len()
    }
}

/// A non-owning view of a resolved type. Keeps its domain alive.
#[derive(Debug, Clone)]
pub struct Type {
    core: Rc<DomainCore>,
    id: TypeId,
}

impl Type {
    /// The fully-qualified name.
    #[must_use]
    pub fn fullname(&self) -> Str {
        self.core.fullname_of(self.id)
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.core.info_of(self.id).kind()
    }

    /// The arena id, valid within the issuing domain.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core) && self.id == other.id
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}
