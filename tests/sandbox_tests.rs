//! End-to-end tests for the memory-access sandboxing pass
//!
//! Each test builds a small module through the IR API, runs the pass and
//! inspects the rewritten instruction stream.

use minsfi::ir::{
    format_inst, BinOp, CastOp, DebugLoc, Function, Global, InstId, InstKind, Intrinsic, Linkage,
    Module, Type, Value,
};
use minsfi::sfi::{MEMORY_BASE_SYMBOL, POINTER_SIZE_SYMBOL, SANDBOXED_FLAG};
use minsfi::{
    verify_confinement, Error, SandboxMemoryAccesses, SandboxOptions, SubspaceConfig,
    SubspaceWidth,
};

// =============================================================================
// HELPERS
// =============================================================================

fn pass(bits: u32) -> SandboxMemoryAccesses {
    SandboxMemoryAccesses::new(SandboxOptions {
        pointer_size_bits: bits,
        ..SandboxOptions::default()
    })
    .unwrap()
}

fn kind(func: &Function, id: InstId) -> &InstKind {
    &func.inst(id).unwrap().kind
}

fn producer<'a>(func: &'a Function, value: &Value) -> &'a InstKind {
    kind(func, value.as_inst().expect("operand is not an instruction"))
}

fn base_global(module: &Module) -> Value {
    Value::Global(module.global_by_name(MEMORY_BASE_SYMBOL).unwrap())
}

fn is_base_load(module: &Module, func: &Function, id: InstId) -> bool {
    *kind(func, id)
        == InstKind::Load {
            ptr: base_global(module),
        }
}

fn config_of(module: &Module, bits: u32) -> SubspaceConfig {
    SubspaceConfig {
        width: SubspaceWidth::new(bits).unwrap(),
        memory_base: module.global_by_name(MEMORY_BASE_SYMBOL).unwrap(),
        pointer_size: module.global_by_name(POINTER_SIZE_SYMBOL).unwrap(),
    }
}

/// `load i32, inttoptr(add i32 %arg0, offset)` followed by `ret`
fn folded_load_module(offset: i64) -> (Module, InstId, InstId, InstId) {
    let mut module = Module::new("fold");
    let mut func = Function::new("f", vec![Type::i32()], Type::i32());
    let entry = func.add_block("entry");
    let add = func
        .append(
            entry,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Arg(0),
                rhs: Value::i32(offset),
            },
            Type::i32(),
        )
        .unwrap();
    let cast = func
        .append(
            entry,
            InstKind::Cast {
                op: CastOp::IntToPtr,
                value: Value::Inst(add),
            },
            Type::i32().ptr_to(),
        )
        .unwrap();
    let load = func
        .append(entry, InstKind::Load { ptr: Value::Inst(cast) }, Type::i32())
        .unwrap();
    func.append(
        entry,
        InstKind::Ret {
            value: Some(Value::Inst(load)),
        },
        Type::Void,
    )
    .unwrap();
    module.add_function(func);
    (module, add, cast, load)
}

// =============================================================================
// REWRITE SHAPES
// =============================================================================

#[test]
fn test_folded_load_full_width() {
    let (mut module, add, cast, load) = folded_load_module(16);
    let report = pass(32).run(&mut module).unwrap();

    assert_eq!(report.sandboxed_pointers, 1);
    assert_eq!(report.folded_accesses, 1);
    assert_eq!(report.removed_instructions, 2);
    assert_eq!(report.masked_lengths, 0);

    let func = &module.functions[0];
    assert!(func.inst(add).is_none());
    assert!(func.inst(cast).is_none());

    // base, zext, add base, add 16, inttoptr, load, ret
    let order = func.program_order();
    assert_eq!(order.len(), 7);
    assert!(is_base_load(&module, func, order[0]));
    assert_eq!(
        *kind(func, order[1]),
        InstKind::Cast {
            op: CastOp::ZExt,
            value: Value::Arg(0)
        }
    );
    assert_eq!(
        *kind(func, order[2]),
        InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Inst(order[0]),
            rhs: Value::Inst(order[1])
        }
    );
    assert_eq!(
        *kind(func, order[3]),
        InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Inst(order[2]),
            rhs: Value::i64(16)
        }
    );
    assert_eq!(
        *kind(func, order[4]),
        InstKind::Cast {
            op: CastOp::IntToPtr,
            value: Value::Inst(order[3])
        }
    );
    assert_eq!(order[5], load);
    assert_eq!(
        *kind(func, load),
        InstKind::Load {
            ptr: Value::Inst(order[4])
        }
    );
    assert!(order.iter().all(|&id| !matches!(
        kind(func, id),
        InstKind::Binary { op: BinOp::And, .. }
    )));
}

#[test]
fn test_store_general_path_masked() {
    let mut module = Module::new("store");
    let mut func = Function::new("f", vec![Type::i32().ptr_to(), Type::i32()], Type::Void);
    let entry = func.add_block("entry");
    let store = func
        .append(
            entry,
            InstKind::Store {
                value: Value::Arg(1),
                ptr: Value::Arg(0),
            },
            Type::Void,
        )
        .unwrap();
    func.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(func);

    let report = pass(16).run(&mut module).unwrap();
    assert_eq!(report.sandboxed_pointers, 1);
    assert_eq!(report.folded_accesses, 0);

    let func = &module.functions[0];
    let InstKind::Store { value, ptr } = kind(func, store) else {
        panic!("store was replaced");
    };
    assert_eq!(*value, Value::Arg(1));

    let InstKind::Cast {
        op: CastOp::IntToPtr,
        value: address,
    } = producer(func, ptr)
    else {
        panic!("pointer is not an inttoptr");
    };
    let InstKind::Binary {
        op: BinOp::Add,
        lhs: base,
        rhs: offset,
    } = producer(func, address)
    else {
        panic!("address is not an add");
    };
    assert!(is_base_load(&module, func, base.as_inst().unwrap()));
    let InstKind::Cast {
        op: CastOp::ZExt,
        value: masked,
    } = producer(func, offset)
    else {
        panic!("offset is not zero-extended");
    };
    let InstKind::Binary {
        op: BinOp::And,
        lhs: truncated,
        rhs: mask,
    } = producer(func, masked)
    else {
        panic!("offset is not masked");
    };
    assert_eq!(*mask, Value::i32(0xFFFF));
    assert_eq!(
        *producer(func, truncated),
        InstKind::Cast {
            op: CastOp::PtrToInt,
            value: Value::Arg(0)
        }
    );
}

#[test]
fn test_memset_masks_length_and_destination() {
    let mut module = Module::new("memset");
    let mut func = Function::new("f", vec![Type::i8().ptr_to(), Type::i32()], Type::Void);
    let entry = func.add_block("entry");
    let memset = func
        .append(
            entry,
            InstKind::Intrinsic {
                id: Intrinsic::Memset,
                args: vec![
                    Value::Arg(0),
                    Value::int(8, 0),
                    Value::Arg(1),
                    Value::i32(1),
                    Value::int(1, 0),
                ],
            },
            Type::Void,
        )
        .unwrap();
    func.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(func);

    let report = pass(16).run(&mut module).unwrap();
    assert_eq!(report.sandboxed_pointers, 1);
    assert_eq!(report.masked_lengths, 1);

    let func = &module.functions[0];
    let InstKind::Intrinsic { args, .. } = kind(func, memset) else {
        panic!("memset was replaced");
    };
    assert!(matches!(
        producer(func, &args[0]),
        InstKind::Cast {
            op: CastOp::IntToPtr,
            ..
        }
    ));
    assert_eq!(args[1], Value::int(8, 0));
    assert_eq!(
        *producer(func, &args[2]),
        InstKind::Binary {
            op: BinOp::And,
            lhs: Value::Arg(1),
            rhs: Value::i32(0xFFFF)
        }
    );

    // the length mask sits right before the memset
    let order = func.program_order();
    let at = order.iter().position(|&id| id == memset).unwrap();
    assert_eq!(Value::Inst(order[at - 1]), args[2]);
}

#[test]
fn test_memcpy_never_folds_and_skips_length_at_full_width() {
    let (mut module, add, cast, load) = folded_load_module(8);
    {
        let func = &mut module.functions[0];
        let ptr = func
            .insert_before(
                load,
                InstKind::Cast {
                    op: CastOp::BitCast,
                    value: Value::Inst(cast),
                },
                Type::i8().ptr_to(),
            )
            .unwrap();
        func.insert_before(
            load,
            InstKind::Intrinsic {
                id: Intrinsic::Memcpy,
                args: vec![
                    Value::Inst(ptr),
                    Value::Inst(ptr),
                    Value::i32(4),
                    Value::i32(1),
                    Value::int(1, 0),
                ],
            },
            Type::Void,
        )
        .unwrap();
    }

    let report = pass(32).run(&mut module).unwrap();
    // two memcpy pointers plus the load
    assert_eq!(report.sandboxed_pointers, 3);
    assert_eq!(report.masked_lengths, 0);
    // the load still folds, but the bitcast keeps the cast alive
    assert_eq!(report.folded_accesses, 1);
    assert_eq!(report.removed_instructions, 0);
    let func = &module.functions[0];
    assert!(func.inst(cast).is_some());
    assert!(func.inst(add).is_some());
}

#[test]
fn test_atomic_operand_positions() {
    let mut module = Module::new("atomics");
    let mut func = Function::new(
        "f",
        vec![Type::i32().ptr_to(), Type::i32().ptr_to(), Type::i32()],
        Type::Void,
    );
    let entry = func.add_block("entry");
    let cmpxchg = func
        .append(
            entry,
            InstKind::Intrinsic {
                id: Intrinsic::AtomicCmpxchg,
                args: vec![
                    Value::Arg(0),
                    Value::Arg(2),
                    Value::i32(1),
                    Value::i32(6),
                    Value::i32(6),
                ],
            },
            Type::i32(),
        )
        .unwrap();
    let rmw = func
        .append(
            entry,
            InstKind::Intrinsic {
                id: Intrinsic::AtomicRmw,
                args: vec![Value::i32(1), Value::Arg(1), Value::Arg(2), Value::i32(6)],
            },
            Type::i32(),
        )
        .unwrap();
    let store = func
        .append(
            entry,
            InstKind::Intrinsic {
                id: Intrinsic::AtomicStore,
                args: vec![Value::Arg(2), Value::Arg(0), Value::i32(6)],
            },
            Type::Void,
        )
        .unwrap();
    func.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(func);

    let report = pass(24).run(&mut module).unwrap();
    assert_eq!(report.sandboxed_pointers, 3);

    let func = &module.functions[0];
    let sandboxed = |id: InstId, index: usize| {
        let op = kind(func, id).operand(index).unwrap();
        matches!(
            producer(func, op),
            InstKind::Cast {
                op: CastOp::IntToPtr,
                ..
            }
        )
    };
    assert!(sandboxed(cmpxchg, 0));
    assert_eq!(kind(func, cmpxchg).operand(1), Some(&Value::Arg(2)));
    assert!(sandboxed(rmw, 1));
    assert_eq!(kind(func, rmw).operand(0), Some(&Value::i32(1)));
    assert_eq!(kind(func, rmw).operand(2), Some(&Value::Arg(2)));
    assert!(sandboxed(store, 1));
    assert_eq!(kind(func, store).operand(0), Some(&Value::Arg(2)));
}

// =============================================================================
// FOLDING
// =============================================================================

#[test]
fn test_fold_bound_is_inclusive() {
    // 2^16 - 4 is the last offset an i32 access may use
    let (mut module, ..) = folded_load_module(65532);
    assert_eq!(pass(16).run(&mut module).unwrap().folded_accesses, 1);

    let (mut module, add, cast, _) = folded_load_module(65533);
    let report = pass(16).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 0);
    assert_eq!(report.removed_instructions, 0);
    assert!(module.functions[0].inst(add).is_some());
    assert!(module.functions[0].inst(cast).is_some());
}

/// `load [len x elem], inttoptr(add i32 %arg0, offset)`
fn array_load_module(elem: Type, len: u64, offset: i64) -> Module {
    let array = Type::Array {
        elem: Box::new(elem),
        len,
    };
    let mut module = Module::new("array");
    let mut func = Function::new("f", vec![Type::i32()], Type::Void);
    let entry = func.add_block("entry");
    let add = func
        .append(
            entry,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Arg(0),
                rhs: Value::i32(offset),
            },
            Type::i32(),
        )
        .unwrap();
    let cast = func
        .append(
            entry,
            InstKind::Cast {
                op: CastOp::IntToPtr,
                value: Value::Inst(add),
            },
            array.clone().ptr_to(),
        )
        .unwrap();
    func.append(entry, InstKind::Load { ptr: Value::Inst(cast) }, array)
        .unwrap();
    func.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(func);
    module
}

#[test]
fn test_oversized_pointee_never_folds() {
    // store size saturates to u64::MAX
    let mut module = array_load_module(Type::i32(), u64::MAX, 65537);
    let report = pass(16).run(&mut module).unwrap();
    assert_eq!(report.sandboxed_pointers, 1);
    assert_eq!(report.folded_accesses, 0);

    // store size above i64::MAX
    let mut module = array_load_module(Type::i8(), (1 << 63) + (1 << 32), 0);
    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 0);
    assert_eq!(report.removed_instructions, 0);
}

#[test]
fn test_negative_offset_takes_general_path() {
    let (mut module, _, cast, load) = folded_load_module(-4);
    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 0);

    let func = &module.functions[0];
    let InstKind::Load { ptr } = kind(func, load) else {
        panic!("load was replaced");
    };
    let InstKind::Cast { value: address, .. } = producer(func, ptr) else {
        panic!("pointer is not a cast");
    };
    let InstKind::Binary { rhs: offset, .. } = producer(func, address) else {
        panic!("address is not an add");
    };
    let InstKind::Cast { value: narrow, .. } = producer(func, offset) else {
        panic!("offset is not a cast");
    };
    assert_eq!(
        *producer(func, narrow),
        InstKind::Cast {
            op: CastOp::PtrToInt,
            value: Value::Inst(cast)
        }
    );
}

#[test]
fn test_fold_masks_index_below_full_width() {
    let (mut module, ..) = folded_load_module(16);
    let report = pass(20).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 1);

    let func = &module.functions[0];
    let masked = func
        .program_order()
        .into_iter()
        .find(|&id| matches!(kind(func, id), InstKind::Binary { op: BinOp::And, .. }))
        .unwrap();
    assert_eq!(
        *kind(func, masked),
        InstKind::Binary {
            op: BinOp::And,
            lhs: Value::Arg(0),
            rhs: Value::i32(0xF_FFFF)
        }
    );
}

#[test]
fn test_fold_keeps_add_with_other_uses() {
    let (mut module, add, cast, _) = folded_load_module(4);
    {
        let func = &mut module.functions[0];
        let ret = *func.program_order().last().unwrap();
        func.replace_operand(ret, 0, Value::Inst(add)).unwrap();
    }

    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 1);
    assert_eq!(report.removed_instructions, 1);
    let func = &module.functions[0];
    assert!(func.inst(cast).is_none());
    assert!(func.inst(add).is_some());
}

#[test]
fn test_fold_shared_cast_removed_after_last_use() {
    let (mut module, add, cast, load) = folded_load_module(4);
    {
        let func = &mut module.functions[0];
        func.insert_before(
            load,
            InstKind::Store {
                value: Value::Arg(0),
                ptr: Value::Inst(cast),
            },
            Type::Void,
        )
        .unwrap();
    }

    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.folded_accesses, 2);
    assert_eq!(report.removed_instructions, 2);
    let func = &module.functions[0];
    assert!(func.inst(cast).is_none());
    assert!(func.inst(add).is_none());
}

#[test]
fn test_fold_transfers_debug_locations() {
    let (mut module, add, cast, load) = folded_load_module(12);
    let add_loc = DebugLoc { line: 10, col: 3 };
    let cast_loc = DebugLoc { line: 10, col: 5 };
    {
        let func = &mut module.functions[0];
        func.set_debug_loc(add, Some(add_loc)).unwrap();
        func.set_debug_loc(cast, Some(cast_loc)).unwrap();
    }

    pass(32).run(&mut module).unwrap();
    let func = &module.functions[0];
    let InstKind::Load { ptr } = kind(func, load) else {
        panic!("load was replaced");
    };
    let ptr_id = ptr.as_inst().unwrap();
    assert_eq!(func.inst(ptr_id).unwrap().debug_loc, Some(cast_loc));
    let InstKind::Cast { value: offset, .. } = kind(func, ptr_id) else {
        panic!("pointer is not a cast");
    };
    assert_eq!(
        func.inst(offset.as_inst().unwrap()).unwrap().debug_loc,
        Some(add_loc)
    );
}

// =============================================================================
// BASE LOAD AND MODULE STATE
// =============================================================================

#[test]
fn test_single_base_load_at_entry() {
    let mut module = Module::new("blocks");
    let mut func = Function::new("f", vec![Type::i8().ptr_to()], Type::Void);
    let entry = func.add_block("entry");
    let body = func.add_block("body");
    func.append(entry, InstKind::Br { target: body }, Type::Void)
        .unwrap();
    for _ in 0..3 {
        func.append(body, InstKind::Load { ptr: Value::Arg(0) }, Type::i8())
            .unwrap();
    }
    func.append(body, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(func);

    let mut idle = Function::new("idle", vec![], Type::Void);
    let idle_entry = idle.add_block("entry");
    idle.append(idle_entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(idle);

    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.functions, 2);
    assert_eq!(report.base_loads, 1);
    assert_eq!(report.sandboxed_pointers, 3);

    let func = &module.functions[0];
    let loads: Vec<_> = func
        .program_order()
        .into_iter()
        .filter(|&id| is_base_load(&module, func, id))
        .collect();
    assert_eq!(loads.len(), 1);
    let head = func.block(entry).unwrap().insts()[0];
    assert_eq!(head, loads[0]);
    assert_eq!(func.inst(head).unwrap().ty, Type::i64());

    assert_eq!(module.functions[1].inst_count(), 1);
}

#[test]
fn test_runtime_symbols_installed() {
    let (mut module, ..) = folded_load_module(0);
    pass(24).run(&mut module).unwrap();

    let base = module
        .global(module.global_by_name(MEMORY_BASE_SYMBOL).unwrap())
        .unwrap();
    assert_eq!(base.ty, Type::i64());
    assert_eq!(base.linkage, Linkage::External);
    assert!(!base.is_constant);
    assert!(base.initializer.is_none());

    let size = module
        .global(module.global_by_name(POINTER_SIZE_SYMBOL).unwrap())
        .unwrap();
    assert_eq!(size.ty, Type::i32());
    assert!(size.is_constant);
    assert_eq!(size.initializer.as_ref().and_then(|c| c.sext_value()), Some(24));
    assert!(module.has_flag(SANDBOXED_FLAG));
}

#[test]
fn test_existing_base_declaration_reused() {
    let (mut module, ..) = folded_load_module(0);
    module
        .add_global(Global {
            name: MEMORY_BASE_SYMBOL.to_string(),
            ty: Type::i64(),
            linkage: Linkage::External,
            is_constant: false,
            initializer: None,
        })
        .unwrap();
    pass(32).run(&mut module).unwrap();
    assert_eq!(module.globals.len(), 2);
}

#[test]
fn test_pointer_size_conflict_leaves_module_untouched() {
    let (mut module, ..) = folded_load_module(0);
    module
        .add_global(Global {
            name: POINTER_SIZE_SYMBOL.to_string(),
            ty: Type::i32(),
            linkage: Linkage::Internal,
            is_constant: false,
            initializer: None,
        })
        .unwrap();
    let before = module.clone();

    let err = pass(32).run(&mut module).unwrap_err();
    assert!(matches!(err, Error::SymbolConflict { ref name, .. } if name == POINTER_SIZE_SYMBOL));
    assert_eq!(module, before);
}

#[test]
fn test_second_run_rejected() {
    let (mut module, ..) = folded_load_module(0);
    pass(32).run(&mut module).unwrap();
    let once = module.clone();

    let err = pass(32).run(&mut module).unwrap_err();
    assert_eq!(
        err,
        Error::AlreadySandboxed {
            module: "fold".to_string()
        }
    );
    assert_eq!(module, once);
}

#[test]
fn test_declarations_skipped() {
    let (mut module, ..) = folded_load_module(0);
    module.add_function(Function::new(
        "external",
        vec![Type::i8().ptr_to()],
        Type::Void,
    ));
    let report = pass(32).run(&mut module).unwrap();
    assert_eq!(report.functions, 1);
    assert!(module.functions[1].is_declaration());
}

#[test]
fn test_parallel_matches_sequential() {
    let build = || {
        let mut module = Module::new("many");
        for i in 0..16 {
            let mut func = Function::new(
                &format!("f{}", i),
                vec![Type::i32().ptr_to(), Type::i32()],
                Type::Void,
            );
            let entry = func.add_block("entry");
            let value = func
                .append(entry, InstKind::Load { ptr: Value::Arg(0) }, Type::i32())
                .unwrap();
            func.append(
                entry,
                InstKind::Store {
                    value: Value::Inst(value),
                    ptr: Value::Arg(0),
                },
                Type::Void,
            )
            .unwrap();
            func.append(entry, InstKind::Ret { value: None }, Type::Void)
                .unwrap();
            module.add_function(func);
        }
        module
    };

    let mut sequential = build();
    let mut parallel = build();
    let seq_report = pass(28).run(&mut sequential).unwrap();
    let par_report = SandboxMemoryAccesses::new(SandboxOptions {
        pointer_size_bits: 28,
        parallel: true,
        verify: true,
    })
    .unwrap()
    .run(&mut parallel)
    .unwrap();

    assert_eq!(seq_report, par_report);
    assert_eq!(seq_report.sandboxed_pointers, 32);
    assert_eq!(sequential, parallel);
}

#[test]
fn test_options_from_json_drive_the_pass() -> anyhow::Result<()> {
    let options = SandboxOptions::from_json(r#"{ "pointer_size_bits": 24, "parallel": true }"#)?;
    assert!(options.verify);
    let (mut module, ..) = folded_load_module(8);
    let report = SandboxMemoryAccesses::new(options)?.run(&mut module)?;
    assert_eq!(report.pointer_size_bits, 24);
    Ok(())
}

#[test]
fn test_invalid_width_rejected() {
    for bits in [0, 33, 64] {
        let err = SandboxMemoryAccesses::new(SandboxOptions {
            pointer_size_bits: bits,
            ..SandboxOptions::default()
        })
        .unwrap_err();
        assert_eq!(err, Error::InvalidPointerSize { bits });
    }
}

// =============================================================================
// UNCOVERED POINTER OPERANDS
// =============================================================================

#[test]
fn test_select_of_pointers_rejected() {
    let mut module = Module::new("select");
    let mut func = Function::new(
        "f",
        vec![Type::i1(), Type::i32().ptr_to(), Type::i32().ptr_to()],
        Type::i32(),
    );
    let entry = func.add_block("entry");
    let select = func
        .append(
            entry,
            InstKind::Select {
                cond: Value::Arg(0),
                on_true: Value::Arg(1),
                on_false: Value::Arg(2),
            },
            Type::i32().ptr_to(),
        )
        .unwrap();
    let load = func
        .append(entry, InstKind::Load { ptr: Value::Inst(select) }, Type::i32())
        .unwrap();
    func.append(
        entry,
        InstKind::Ret {
            value: Some(Value::Inst(load)),
        },
        Type::Void,
    )
    .unwrap();
    module.add_function(func);
    let before = module.clone();

    let err = pass(32).run(&mut module).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unexpected instruction with pointer-type operands in @f: \
         %0 = select i1 %arg0, i32* %arg1, i32* %arg2"
    );
    assert_eq!(module, before);
    assert!(!module.has_flag(SANDBOXED_FLAG));
}

#[test]
fn test_mistyped_access_operand_leaves_module_untouched() {
    let mut module = Module::new("mistyped");
    let mut good = Function::new("good", vec![Type::i32().ptr_to()], Type::Void);
    let entry = good.add_block("entry");
    good.append(entry, InstKind::Load { ptr: Value::Arg(0) }, Type::i32())
        .unwrap();
    good.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(good);

    let mut bad = Function::new("bad", vec![Type::i32()], Type::Void);
    let entry = bad.add_block("entry");
    bad.append(entry, InstKind::Load { ptr: Value::Arg(0) }, Type::i32())
        .unwrap();
    bad.append(entry, InstKind::Ret { value: None }, Type::Void)
        .unwrap();
    module.add_function(bad);
    let before = module.clone();

    for parallel in [false, true] {
        let err = SandboxMemoryAccesses::new(SandboxOptions {
            pointer_size_bits: 16,
            parallel,
            verify: true,
        })
        .unwrap()
        .run(&mut module)
        .unwrap_err();
        assert_eq!(
            err,
            Error::Ir("operand 0 of %0 in @bad is not a pointer".to_string())
        );
        assert_eq!(module, before);
        assert!(module.globals.is_empty());
    }
}

#[test]
fn test_mistyped_length_leaves_module_untouched() {
    let mut module = Module::new("mistyped");
    let mut func = Function::new("f", vec![Type::i8().ptr_to()], Type::Void);
    let entry = func.add_block("entry");
    func.append(
        entry,
        InstKind::Intrinsic {
            id: Intrinsic::Memset,
            args: vec![
                Value::Arg(0),
                Value::int(8, 0),
                Value::Arg(0),
                Value::i32(1),
                Value::int(1, 0),
            ],
        },
        Type::Void,
    )
    .unwrap();
    module.add_function(func);
    let before = module.clone();

    let err = pass(16).run(&mut module).unwrap_err();
    assert!(matches!(err, Error::Ir(_)));
    assert_eq!(module, before);
}

/// Builds `f(i8* %arg0, i32 %arg1)` holding `kind` and reports the pass result
fn run_with(kind: InstKind, ty: Type) -> Result<(), Error> {
    let mut module = Module::new("uncovered");
    let callee = module.add_function(Function::new("g", vec![Type::i8().ptr_to()], Type::Void));
    let kind = match kind {
        InstKind::Call { args, .. } => InstKind::Call {
            callee: Value::Function(callee),
            args,
        },
        other => other,
    };
    let mut func = Function::new("f", vec![Type::i8().ptr_to(), Type::i32()], Type::Void);
    let entry = func.add_block("entry");
    func.append(entry, kind, ty).unwrap();
    func.append(entry, InstKind::Unreachable, Type::Void)
        .unwrap();
    module.add_function(func);
    let before = module.clone();

    let result = pass(32).run(&mut module).map(|_| ());
    if result.is_err() {
        assert_eq!(module, before);
    }
    result
}

#[test]
fn test_uncovered_kinds_rejected() {
    let cases = vec![
        (
            InstKind::GetElementPtr {
                base: Value::Arg(0),
                indices: vec![Value::Arg(1)],
            },
            Type::i8().ptr_to(),
        ),
        (
            InstKind::Phi {
                incoming: vec![(Value::Arg(0), minsfi::ir::BlockId(0))],
            },
            Type::i8().ptr_to(),
        ),
        (
            InstKind::Ret {
                value: Some(Value::Arg(0)),
            },
            Type::Void,
        ),
        (
            InstKind::Call {
                callee: Value::Arg(1),
                args: vec![Value::Arg(0)],
            },
            Type::Void,
        ),
        (
            InstKind::Intrinsic {
                id: Intrinsic::StackRestore,
                args: vec![Value::Arg(0)],
            },
            Type::Void,
        ),
        (
            InstKind::ICmp {
                pred: minsfi::ir::IntPredicate::Eq,
                lhs: Value::Arg(0),
                rhs: Value::Arg(0),
            },
            Type::i1(),
        ),
    ];
    for (kind, ty) in cases {
        let printed = format!("{:?}", kind);
        let err = run_with(kind, ty).unwrap_err();
        assert!(
            matches!(err, Error::UncoveredPointerOperand { ref function, .. } if function == "f"),
            "{} gave {}",
            printed,
            err
        );
    }
}

#[test]
fn test_whitelisted_and_pointer_free_kinds_accepted() {
    let cases = vec![
        (
            InstKind::Cast {
                op: CastOp::PtrToInt,
                value: Value::Arg(0),
            },
            Type::i32(),
        ),
        (
            InstKind::Cast {
                op: CastOp::BitCast,
                value: Value::Arg(0),
            },
            Type::i32().ptr_to(),
        ),
        (
            InstKind::Cast {
                op: CastOp::IntToPtr,
                value: Value::Arg(1),
            },
            Type::i8().ptr_to(),
        ),
        (
            InstKind::Call {
                callee: Value::Arg(1),
                args: vec![Value::Arg(1)],
            },
            Type::Void,
        ),
        (
            InstKind::Intrinsic {
                id: Intrinsic::StackSave,
                args: vec![],
            },
            Type::i8().ptr_to(),
        ),
    ];
    for (kind, ty) in cases {
        let printed = format!("{:?}", kind);
        assert!(run_with(kind, ty).is_ok(), "{} was rejected", printed);
    }
}

#[test]
fn test_first_offender_in_program_order_reported() {
    let mut module = Module::new("order");
    for name in ["a", "b"] {
        let mut func = Function::new(name, vec![Type::i8().ptr_to()], Type::Void);
        let entry = func.add_block("entry");
        func.append(
            entry,
            InstKind::Ret {
                value: Some(Value::Arg(0)),
            },
            Type::Void,
        )
        .unwrap();
        module.add_function(func);
    }
    let err = pass(32).run(&mut module).unwrap_err();
    assert_eq!(
        err,
        Error::UncoveredPointerOperand {
            function: "a".to_string(),
            instruction: "ret i8* %arg0".to_string(),
        }
    );
}

// =============================================================================
// VERIFIER
// =============================================================================

#[test]
fn test_verifier_accepts_rewritten_module() {
    let (mut module, ..) = folded_load_module(16);
    SandboxMemoryAccesses::new(SandboxOptions {
        pointer_size_bits: 16,
        verify: false,
        ..SandboxOptions::default()
    })
    .unwrap()
    .run(&mut module)
    .unwrap();
    assert!(verify_confinement(&module, &config_of(&module, 16)).is_empty());
}

#[test]
fn test_verifier_flags_tampered_access() {
    let mut module = Module::new("tamper");
    let mut func = Function::new("f", vec![Type::i32().ptr_to()], Type::i32());
    let entry = func.add_block("entry");
    let load = func
        .append(entry, InstKind::Load { ptr: Value::Arg(0) }, Type::i32())
        .unwrap();
    func.append(
        entry,
        InstKind::Ret {
            value: Some(Value::Inst(load)),
        },
        Type::Void,
    )
    .unwrap();
    module.add_function(func);
    pass(16).run(&mut module).unwrap();

    module.functions[0]
        .replace_operand(load, 0, Value::Arg(0))
        .unwrap();
    let violations = verify_confinement(&module, &config_of(&module, 16));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].function, "f");
    assert_eq!(
        violations[0].instruction,
        format_inst(&module.functions[0], &module.symbols(), load)
    );
    assert_eq!(
        violations[0].reason,
        "pointer is not rebuilt from a sandboxed address"
    );
}

#[test]
fn test_verifier_flags_missing_mask() {
    let (mut module, ..) = folded_load_module(16);
    pass(32).run(&mut module).unwrap();
    // rewritten for 32 bits, checked as if 16 were required
    let violations = verify_confinement(&module, &config_of(&module, 16));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].reason, "offset is not masked");
}
