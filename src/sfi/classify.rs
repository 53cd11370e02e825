//! Instruction classification and the fail-closed pointer-operand check.
//!
//! Every [`InstKind`] is matched explicitly, without a wildcard arm: adding
//! an instruction kind to the IR does not compile until it is routed here.

use crate::ir::{CastOp, Function, InstId, InstKind, Intrinsic, SymbolTable, Type};
use crate::{Error, Result};

/// A pointer operand slot to confine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSlot {
    /// Operand index
    pub index: usize,
    /// Single-value access (eligible for the folded fast path)
    pub first_class: bool,
}

/// Operand slots a memory-touching instruction needs rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPlan {
    /// Pointer operands, in the order they are rewritten
    pub pointers: &'static [PointerSlot],
    /// Length operand of a bulk operation
    pub length: Option<usize>,
}

const fn first_class(index: usize) -> PointerSlot {
    PointerSlot {
        index,
        first_class: true,
    }
}

const fn bulk(index: usize) -> PointerSlot {
    PointerSlot {
        index,
        first_class: false,
    }
}

const LOAD: AccessPlan = AccessPlan {
    pointers: &[first_class(0)],
    length: None,
};

const STORE: AccessPlan = AccessPlan {
    pointers: &[first_class(1)],
    length: None,
};

const COPY: AccessPlan = AccessPlan {
    pointers: &[bulk(0), bulk(1)],
    length: Some(2),
};

const FILL: AccessPlan = AccessPlan {
    pointers: &[bulk(0)],
    length: Some(2),
};

/// How the pass treats an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Confine the listed operands
    Sandbox(AccessPlan),
    /// Has pointer operands but never dereferences them
    Whitelisted,
    /// Must not carry pointer operands at all
    Validate,
}

/// Routes an instruction by kind
pub fn route(kind: &InstKind) -> Route {
    match kind {
        InstKind::Load { .. } => Route::Sandbox(LOAD),
        InstKind::Store { .. } => Route::Sandbox(STORE),
        InstKind::Intrinsic { id, .. } => match id {
            Intrinsic::Memcpy | Intrinsic::Memmove => Route::Sandbox(COPY),
            Intrinsic::Memset => Route::Sandbox(FILL),
            Intrinsic::AtomicLoad | Intrinsic::AtomicCmpxchg => Route::Sandbox(LOAD),
            Intrinsic::AtomicStore | Intrinsic::AtomicRmw | Intrinsic::AtomicIsLockFree => {
                Route::Sandbox(STORE)
            }
            Intrinsic::AtomicFence
            | Intrinsic::Trap
            | Intrinsic::StackSave
            | Intrinsic::StackRestore => Route::Validate,
        },
        InstKind::Cast { op, .. } => match op {
            CastOp::PtrToInt | CastOp::BitCast => Route::Whitelisted,
            CastOp::Trunc | CastOp::ZExt | CastOp::SExt | CastOp::IntToPtr => Route::Validate,
        },
        InstKind::Binary { .. }
        | InstKind::ICmp { .. }
        | InstKind::Select { .. }
        | InstKind::Phi { .. }
        | InstKind::GetElementPtr { .. }
        | InstKind::Call { .. }
        | InstKind::Ret { .. }
        | InstKind::Br { .. }
        | InstKind::CondBr { .. }
        | InstKind::Unreachable => Route::Validate,
    }
}

/// Fails with [`Error::UncoveredPointerOperand`] if `inst` reads a pointer.
///
/// Calls are checked on their arguments only; the callee is a code
/// pointer whose integrity is left to control-flow integrity.
pub fn check_no_pointer_operands(
    func: &Function,
    symbols: &SymbolTable,
    inst: InstId,
) -> Result<()> {
    let data = func
        .inst(inst)
        .ok_or_else(|| Error::Ir(format!("stale instruction %{} in @{}", inst.0, func.name)))?;

    let operands: Vec<_> = match data.kind.call_args() {
        Some(args) => args.iter().collect(),
        None => data.kind.operands(),
    };
    for operand in operands {
        if func.value_type(operand, symbols)?.is_pointer() {
            return Err(Error::UncoveredPointerOperand {
                function: func.name.clone(),
                instruction: crate::ir::format_inst(func, symbols, inst),
            });
        }
    }
    Ok(())
}

/// Fails with [`Error::Ir`] unless every slot of `access` holds an operand
/// of the type the rewrite expects: a pointer, or an integer length.
pub fn check_access_operands(
    func: &Function,
    symbols: &SymbolTable,
    inst: InstId,
    access: &AccessPlan,
) -> Result<()> {
    let data = func
        .inst(inst)
        .ok_or_else(|| Error::Ir(format!("stale instruction %{} in @{}", inst.0, func.name)))?;
    let operand_type = |index: usize| -> Result<Type> {
        let operand = data.kind.operand(index).ok_or_else(|| {
            Error::Ir(format!(
                "instruction %{} in @{} has no operand {}",
                inst.0, func.name, index
            ))
        })?;
        func.value_type(operand, symbols)
    };

    for slot in access.pointers {
        if !operand_type(slot.index)?.is_pointer() {
            return Err(Error::Ir(format!(
                "operand {} of %{} in @{} is not a pointer",
                slot.index, inst.0, func.name
            )));
        }
    }
    if let Some(index) = access.length {
        if operand_type(index)?.int_bits().is_none() {
            return Err(Error::Ir(format!(
                "length operand of %{} in @{} is not an integer",
                inst.0, func.name
            )));
        }
    }
    Ok(())
}

/// Classifies every instruction of `func` without touching it.
///
/// Returns the accesses to rewrite in program order, or the first
/// instruction that carries an unaccounted pointer operand or an access
/// operand of the wrong type.
pub fn plan_function(func: &Function, symbols: &SymbolTable) -> Result<Vec<(InstId, AccessPlan)>> {
    let mut plan = Vec::new();
    for inst in func.program_order() {
        let Some(data) = func.inst(inst) else {
            continue;
        };
        match route(&data.kind) {
            Route::Sandbox(access) => {
                check_access_operands(func, symbols, inst, &access)?;
                plan.push((inst, access));
            }
            Route::Whitelisted => {}
            Route::Validate => check_no_pointer_operands(func, symbols, inst)?,
        }
    }
    Ok(plan)
}
