//! Bytecode execution end-to-end: dispatch, calls between functions,
//! branches, overflow, and cancellation.

use std::{
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use yama::{
    make_callsig, Code, ConstTableInfo, Context, CtxConfig, CtxError, Domain, InstallBatch,
    MemoryParcel, ModuleFactory, PanicKind, Syms, Value,
};

static BUMPS: AtomicUsize = AtomicUsize::new(0);

/// Side-effecting native: counts invocations, returns none.
fn bump_native(ctx: &mut Context) {
    BUMPS.fetch_add(1, Ordering::Relaxed);
    ctx.push_none();
    let _ = ctx.put_ret();
}

fn test_domain() -> Domain {
    let dm = Domain::new();
    let mut f = ModuleFactory::new();

    // answer() -> Int, straight-line constants.
    f.add_bcode_function_type(
        "answer",
        ConstTableInfo::new().add_int(1).add_int(2).add_primitive_type("yama:Int"),
        make_callsig([], 2),
        3,
        Code::new()
            .add_load_const(0, 0, false)
            .add_load_const(1, 1, false)
            .add_copy(2, 0, true)
            .add_ret(2),
        Syms::new(),
    );

    // pick(Bool) -> Int: 10 when true, 20 when false.
    f.add_bcode_function_type(
        "pick",
        ConstTableInfo::new()
            .add_primitive_type("yama:Bool")
            .add_primitive_type("yama:Int")
            .add_int(10)
            .add_int(20),
        make_callsig([0], 1),
        2,
        Code::new()
            .add_jump_true(0, 2)
            .add_load_const(1, 3, false)
            .add_jump(1)
            .add_load_const(1, 2, false)
            .add_ret(1),
        Syms::new(),
    );

    // second(Int, Int) -> Int: returns its second argument via load_arg.
    f.add_bcode_function_type(
        "second",
        ConstTableInfo::new().add_primitive_type("yama:Int"),
        make_callsig([0, 0], 0),
        3,
        Code::new().add_load_arg(2, 1, false).add_ret(2),
        Syms::new(),
    );

    // wrap() -> Int: calls self:answer and returns its result.
    f.add_bcode_function_type(
        "wrap",
        ConstTableInfo::new()
            .add_primitive_type("yama:Int")
            .add_function_type("self:answer", make_callsig([], 0)),
        make_callsig([], 0),
        2,
        Code::new()
            .add_load_const(0, 1, false)
            .add_call(0, 1, 1, false)
            .add_ret(1),
        Syms::new(),
    );

    // runner() -> None: calls self:bump for its effect only.
    f.add_bcode_function_type(
        "runner",
        ConstTableInfo::new()
            .add_primitive_type("yama:None")
            .add_function_type("self:bump", make_callsig([], 0)),
        make_callsig([], 0),
        2,
        Code::new()
            .add_load_const(0, 1, false)
            .add_call_nr(0, 1)
            .add_load_none(1, false)
            .add_ret(1),
        Syms::new(),
    );
    f.add_function_type(
        "bump",
        ConstTableInfo::new().add_primitive_type("yama:None"),
        make_callsig([], 0),
        1,
        bump_native,
    );

    // rec() -> None: calls itself forever.
    f.add_bcode_function_type(
        "rec",
        ConstTableInfo::new()
            .add_primitive_type("yama:None")
            .add_function_type("self:rec", make_callsig([], 0)),
        make_callsig([], 0),
        2,
        Code::new()
            .add_load_const(0, 1, false)
            .add_call(0, 1, 1, false)
            .add_ret(1),
        Syms::new(),
    );

    // spin() -> None: a tight loop, only ever exited by cancellation.
    f.add_bcode_function_type(
        "spin",
        ConstTableInfo::new().add_primitive_type("yama:None"),
        make_callsig([], 0),
        1,
        Code::new().add_jump(-1),
        Syms::new(),
    );

    // none_fn() -> None.
    f.add_bcode_function_type(
        "none_fn",
        ConstTableInfo::new().add_primitive_type("yama:None"),
        make_callsig([], 0),
        1,
        Code::new().add_load_none(0, false).add_ret(0),
        Syms::new(),
    );

    // pi() -> Float.
    f.add_bcode_function_type(
        "pi",
        ConstTableInfo::new().add_float(3.25).add_primitive_type("yama:Float"),
        make_callsig([], 1),
        1,
        Code::new().add_load_const(0, 0, false).add_ret(0),
        Syms::new(),
    );

    let parcel = Rc::new(MemoryParcel::new("t", [] as [&str; 0]).with_module("", f.done()));
    dm.install(InstallBatch::new().add_parcel(parcel)).unwrap();
    dm
}

fn call0(ctx: &mut Context, spec: &str) -> Result<Value, CtxError> {
    ctx.push_type(spec)?;
    ctx.call(0)?;
    let v = ctx.value_at(0)?;
    ctx.pop(1)?;
    Ok(v)
}

/// Straight-line constants: `load_const`, `copy` with reinit, `ret`.
#[test]
fn straight_line_function_returns_first_constant() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    assert_eq!(call0(&mut ctx, "t:answer").unwrap(), Value::Int(1));
}

/// The same program over the same inputs yields the same observable result.
#[test]
fn execution_is_deterministic() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    let first = call0(&mut ctx, "t:answer").unwrap();
    let second = call0(&mut ctx, "t:answer").unwrap();
    assert_eq!(first, second);
}

/// Conditional branches select per the boolean argument.
#[test]
fn conditional_branches() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);

    ctx.push_type("t:pick").unwrap();
    ctx.push_bool(true);
    ctx.call(1).unwrap();
    assert_eq!(ctx.value_at(0).unwrap(), Value::Int(10));
    ctx.pop(1).unwrap();

    ctx.push_type("t:pick").unwrap();
    ctx.push_bool(false);
    ctx.call(1).unwrap();
    assert_eq!(ctx.value_at(0).unwrap(), Value::Int(20));
}

/// `load_arg` reads the argument copy of the current call.
#[test]
fn load_arg_reads_arguments() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);

    ctx.push_type("t:second").unwrap();
    ctx.push_int(7);
    ctx.push_int(9);
    ctx.call(2).unwrap();
    assert_eq!(ctx.value_at(0).unwrap(), Value::Int(9));
}

/// Bytecode calling bytecode: the callee's return value lands in the
/// caller's destination register.
#[test]
fn nested_bytecode_call() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    assert_eq!(call0(&mut ctx, "t:wrap").unwrap(), Value::Int(1));
}

/// `call_nr` runs the callee for effect and discards its return value.
#[test]
fn call_nr_runs_native_for_effect() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);

    let before = BUMPS.load(Ordering::Relaxed);
    assert_eq!(call0(&mut ctx, "t:runner").unwrap(), Value::None);
    assert_eq!(BUMPS.load(Ordering::Relaxed), before + 1);
}

/// `load_none` materializes the none value; it satisfies `yama:None`.
#[test]
fn none_round_trip() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    assert_eq!(call0(&mut ctx, "t:none_fn").unwrap(), Value::None);
}

/// Float constants survive the trip through registers.
#[test]
fn float_round_trip() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    assert_eq!(call0(&mut ctx, "t:pi").unwrap(), Value::Float(3.25));
}

/// Unbounded recursion hits the configured frame bound and panics.
#[test]
fn recursion_overflows_the_frame_stack() {
    let dm = test_domain();
    let mut ctx = Context::new_with(&dm, CtxConfig::new().with_max_call_frames(16));

    ctx.push_type("t:rec").unwrap();
    let CtxError::Panic(p) = ctx.call(0).unwrap_err() else {
        panic!("expected a panic");
    };
    assert_eq!(p.kind, PanicKind::StackOverflow);

    // The context recovers after clearing the latch.
    ctx.clear_panic();
    assert_eq!(call0(&mut ctx, "t:answer").unwrap(), Value::Int(1));
}

/// A pending cancellation request turns into a `cancelled` panic at the
/// next call boundary, and the flag re-arms.
#[test]
fn cancellation_raises_a_synthetic_panic() {
    let dm = test_domain();
    let mut ctx = Context::new(&dm);
    let handle = ctx.cancel_handle();

    handle.cancel();
    assert!(handle.is_cancelled());

    ctx.push_type("t:spin").unwrap();
    let CtxError::Panic(p) = ctx.call(0).unwrap_err() else {
        panic!("expected a panic");
    };
    assert_eq!(p.kind, PanicKind::Cancelled);
    assert!(!handle.is_cancelled());

    ctx.clear_panic();
    assert_eq!(call0(&mut ctx, "t:answer").unwrap(), Value::Int(1));
}

/// A panic deep inside nested calls unwinds every frame of the context.
#[test]
fn deep_panic_unwinds_all_frames() {
    let dm = test_domain();
    let mut ctx = Context::new_with(&dm, CtxConfig::new().with_max_call_frames(8));

    ctx.push_type("t:rec").unwrap();
    assert!(ctx.call(0).is_err());
    ctx.clear_panic();

    // Native-side commands see no active call: everything unwound.
    assert_eq!(ctx.arg_count(), Err(CtxError::NotInCall));
}
