//! Domain behavior: install atomicity, dependency mapping, resolution, and
//! linking.

use std::rc::Rc;

use yama::{
    make_callsig, ConstTableInfo, Context, Domain, InstallBatch, InstallError, Kind, LoadError,
    MemoryParcel, ModuleFactory, PType, SpecError, Str,
};

fn noop_native(_: &mut Context) {}

/// A parcel whose root module holds one native function named `name` with
/// the given constants and signature.
fn fn_parcel(
    head: &str,
    deps: &[&str],
    name: &str,
    consts: ConstTableInfo,
    callsig: yama::CallSigInfo,
    max_locals: u32,
) -> Rc<MemoryParcel> {
    let mut f = ModuleFactory::new();
    f.add_function_type(name, consts, callsig, max_locals, noop_native);
    Rc::new(MemoryParcel::new(head, deps.iter().copied()).with_module("", f.done()))
}

/// All six builtins resolve without any parcel installed.
#[test]
fn builtins_resolve() {
    let dm = Domain::new();
    for name in ["yama:Int", "yama:UInt", "yama:Float", "yama:Bool", "yama:Char", "yama:None"] {
        let ty = dm.load(name).unwrap();
        assert_eq!(ty.kind(), Kind::Primitive);
        assert_eq!(ty.fullname(), Str::from(name));
    }
    assert_eq!(
        dm.load("yama:Nope"),
        Err(LoadError::UnknownName(Str::from("yama:Nope")))
    );
}

/// Loading the same fully-qualified name twice yields the same handle.
#[test]
fn load_is_idempotent() {
    let dm = Domain::new();
    let first = dm.load("yama:Int").unwrap();
    let second = dm.load("yama:Int").unwrap();
    assert_eq!(first, second);
    assert_ne!(first, dm.load("yama:Bool").unwrap());
}

/// An empty batch installs trivially.
#[test]
fn empty_batch_installs() {
    let dm = Domain::new();
    dm.install(InstallBatch::new()).unwrap();
}

/// Duplicate heads are rejected: within a batch, against installed parcels,
/// and against the reserved built-in head.
#[test]
fn install_rejects_duplicate_heads() {
    let dm = Domain::new();
    let consts = ConstTableInfo::new().add_primitive_type("yama:Int");

    let batch = InstallBatch::new()
        .add_parcel(fn_parcel("p", &[], "F", consts.clone(), make_callsig([], 0), 1))
        .add_parcel(fn_parcel("p", &[], "G", consts.clone(), make_callsig([], 0), 1));
    assert_eq!(dm.install(batch), Err(InstallError::DuplicateHead(Str::from("p"))));

    dm.install(InstallBatch::new().add_parcel(fn_parcel(
        "p",
        &[],
        "F",
        consts.clone(),
        make_callsig([], 0),
        1,
    )))
    .unwrap();
    let again = InstallBatch::new().add_parcel(fn_parcel("p", &[], "F", consts.clone(), make_callsig([], 0), 1));
    assert_eq!(dm.install(again), Err(InstallError::DuplicateHead(Str::from("p"))));

    let yama = InstallBatch::new().add_parcel(fn_parcel("yama", &[], "F", consts, make_callsig([], 0), 1));
    assert_eq!(dm.install(yama), Err(InstallError::DuplicateHead(Str::from("yama"))));
}

/// Every declared dependency needs a mapping; rejection leaves the domain
/// structurally unchanged.
#[test]
fn install_is_atomic_on_missing_dep_mapping() {
    let dm = Domain::new();
    let before = dm.resolved_count();
    let consts = ConstTableInfo::new().add_primitive_type("yama:Int");

    let batch = InstallBatch::new().add_parcel(fn_parcel("p", &["util"], "F", consts.clone(), make_callsig([], 0), 1));
    assert_eq!(
        dm.install(batch),
        Err(InstallError::MissingDepMapping {
            head: Str::from("p"),
            dep: Str::from("util"),
        })
    );

    assert_eq!(dm.resolved_count(), before);
    assert_eq!(dm.load("p:F"), Err(LoadError::UnknownParcel(Str::from("p"))));

    // The same head installs fine once the batch is complete.
    let batch = InstallBatch::new()
        .add_parcel(fn_parcel("p", &["util"], "F", consts.clone(), make_callsig([], 0), 1))
        .add_parcel(fn_parcel("u", &[], "G", consts, make_callsig([], 0), 1))
        .map_dep("p", "util", "u");
    dm.install(batch).unwrap();
    dm.load("p:F").unwrap();
}

/// A mapping whose producer is nowhere to be found is rejected.
#[test]
fn install_rejects_unknown_producer() {
    let dm = Domain::new();
    let consts = ConstTableInfo::new().add_primitive_type("yama:Int");
    let batch = InstallBatch::new()
        .add_parcel(fn_parcel("p", &["util"], "F", consts, make_callsig([], 0), 1))
        .map_dep("p", "util", "ghost");

    assert_eq!(
        dm.install(batch),
        Err(InstallError::UnknownProducer {
            head: Str::from("p"),
            dep: Str::from("util"),
            producer: Str::from("ghost"),
        })
    );
}

/// A mapping whose consumer is not part of the batch is rejected.
#[test]
fn install_rejects_unknown_consumer() {
    let dm = Domain::new();
    let batch = InstallBatch::new().map_dep("ghost", "util", "ghost");
    assert_eq!(
        dm.install(batch),
        Err(InstallError::UnknownConsumer { head: Str::from("ghost") })
    );
}

/// Two mappings for the same `(consumer, dep)` pair are rejected.
#[test]
fn install_rejects_duplicate_dep_mapping() {
    let dm = Domain::new();
    let consts = ConstTableInfo::new().add_primitive_type("yama:Int");
    let batch = InstallBatch::new()
        .add_parcel(fn_parcel("p", &["util"], "F", consts.clone(), make_callsig([], 0), 1))
        .add_parcel(fn_parcel("u", &[], "G", consts, make_callsig([], 0), 1))
        .map_dep("p", "util", "u")
        .map_dep("p", "util", "u");

    assert_eq!(
        dm.install(batch),
        Err(InstallError::DuplicateDepMapping {
            head: Str::from("p"),
            dep: Str::from("util"),
        })
    );
}

/// Modules are found by relative path; the root module lives at the empty
/// path.
#[test]
fn load_resolves_module_paths() {
    let dm = Domain::new();

    let mut f = ModuleFactory::new();
    f.add_struct_type("Vec3", ConstTableInfo::new());
    let parcel = Rc::new(MemoryParcel::new("math", [] as [&str; 0]).with_module("vec", f.done()));
    dm.install(InstallBatch::new().add_parcel(parcel)).unwrap();

    let ty = dm.load("math/vec:Vec3").unwrap();
    assert_eq!(ty.kind(), Kind::Struct);
    assert_eq!(ty.fullname(), Str::from("math/vec:Vec3"));

    assert_eq!(
        dm.load("math/nope:X"),
        Err(LoadError::UnknownModule {
            head: Str::from("math"),
            path: Str::from("nope"),
        })
    );
    assert_eq!(
        dm.load("math/vec:Nope"),
        Err(LoadError::UnknownName(Str::from("math/vec:Nope")))
    );
}

/// Member segments parse but are not resolvable in this core.
#[test]
fn load_rejects_members_and_bad_specs() {
    let dm = Domain::new();
    assert_eq!(
        dm.load("yama:Int::parse"),
        Err(LoadError::UnknownMember(Str::from("yama:Int::parse")))
    );
    assert_eq!(dm.load("yama:L$ist"), Err(LoadError::Spec(SpecError::Syntax)));
    assert_eq!(dm.load("yama"), Err(LoadError::Spec(SpecError::MissingTypeName)));
}

/// Type constants resolve through the consuming parcel's dependency names,
/// `self`, and the implicit built-in head.
#[test]
fn links_resolve_through_dep_names() {
    let dm = Domain::new();

    // Parcel "b" exposes a primitive; parcel "a" refers to it as "ints".
    let mut bf = ModuleFactory::new();
    bf.add_primitive_type("Int2", ConstTableInfo::new(), PType::Int);
    let b = Rc::new(MemoryParcel::new("b", [] as [&str; 0]).with_module("", bf.done()));

    let a_consts = ConstTableInfo::new()
        .add_primitive_type("ints:Int2")
        .add_primitive_type("self:Own")
        .add_primitive_type("yama:Int");
    let mut af = ModuleFactory::new();
    af.add_primitive_type("Own", ConstTableInfo::new(), PType::Bool);
    af.add_function_type("F", a_consts, make_callsig([0, 1], 2), 3, noop_native);
    let a = Rc::new(MemoryParcel::new("a", ["ints"]).with_module("", af.done()));

    dm.install(InstallBatch::new().add_parcel(a).add_parcel(b).map_dep("a", "ints", "b"))
        .unwrap();

    dm.load("a:F").unwrap();
    // Linking registered the referenced types under their canonical names.
    dm.load("b:Int2").unwrap();
    dm.load("a:Own").unwrap();
}

/// Mutually referencing function types across two parcels resolve; cycles
/// are legal once both parcels are installed.
#[test]
fn links_tolerate_cycles() {
    let dm = Domain::new();

    let f_consts = ConstTableInfo::new()
        .add_primitive_type("yama:Int")
        .add_function_type("bb:G", make_callsig([], 0));
    let g_consts = ConstTableInfo::new()
        .add_primitive_type("yama:Int")
        .add_function_type("aa:F", make_callsig([], 0));

    let a = fn_parcel("a", &["bb"], "F", f_consts, make_callsig([], 0), 1);
    let b = fn_parcel("b", &["aa"], "G", g_consts, make_callsig([], 0), 1);

    dm.install(
        InstallBatch::new()
            .add_parcel(a)
            .add_parcel(b)
            .map_dep("a", "bb", "b")
            .map_dep("b", "aa", "a"),
    )
    .unwrap();

    dm.load("a:F").unwrap();
    dm.load("b:G").unwrap();
}

/// A primitive-type constant resolving to a function type is a link error.
#[test]
fn link_rejects_kind_mismatch() {
    let dm = Domain::new();

    let mut f = ModuleFactory::new();
    f.add_function_type(
        "G",
        ConstTableInfo::new().add_primitive_type("yama:Int"),
        make_callsig([], 0),
        1,
        noop_native,
    );
    // F's constant claims self:G is a primitive.
    f.add_function_type(
        "F",
        ConstTableInfo::new().add_primitive_type("self:G"),
        make_callsig([0], 0),
        2,
        noop_native,
    );
    let parcel = Rc::new(MemoryParcel::new("p", [] as [&str; 0]).with_module("", f.done()));
    dm.install(InstallBatch::new().add_parcel(parcel)).unwrap();

    assert_eq!(
        dm.load("p:F"),
        Err(LoadError::LinkMismatch {
            fullname: Str::from("p:F"),
            index: 0,
        })
    );
}

/// A function-type constant whose declared signature disagrees with the
/// resolved type's actual signature is a link error.
#[test]
fn link_rejects_callsig_mismatch() {
    let dm = Domain::new();

    let mut f = ModuleFactory::new();
    // G actually takes no parameters.
    f.add_function_type(
        "G",
        ConstTableInfo::new().add_primitive_type("yama:Int"),
        make_callsig([], 0),
        1,
        noop_native,
    );
    // F declares self:G as fn(yama:Int) -> yama:Int.
    f.add_function_type(
        "F",
        ConstTableInfo::new()
            .add_primitive_type("yama:Int")
            .add_function_type("self:G", make_callsig([0], 0)),
        make_callsig([], 0),
        1,
        noop_native,
    );
    let parcel = Rc::new(MemoryParcel::new("p", [] as [&str; 0]).with_module("", f.done()));
    dm.install(InstallBatch::new().add_parcel(parcel)).unwrap();

    assert_eq!(
        dm.load("p:F"),
        Err(LoadError::LinkMismatch {
            fullname: Str::from("p:F"),
            index: 1,
        })
    );
}

/// A descriptor that fails static verification fails to load.
#[test]
fn load_surfaces_verification_failure() {
    let dm = Domain::new();
    // max_locals 0 cannot fit the return slot.
    let parcel = fn_parcel(
        "p",
        &[],
        "F",
        ConstTableInfo::new().add_primitive_type("yama:Int"),
        make_callsig([], 0),
        0,
    );
    dm.install(InstallBatch::new().add_parcel(parcel)).unwrap();

    assert_eq!(dm.load("p:F"), Err(LoadError::VerifyFailed(Str::from("p:F"))));
}
