//! Pointer operand confinement
//!
//! General rewrite of a pointer `p` used by instruction `I`:
//!
//! ```text
//! %t = ptrtoint T* p to i32
//! %m = and i32 %t, MASK            ; only when W < 32
//! %z = zext i32 %m to i64
//! %a = add i64 %base, %z
//! %q = inttoptr i64 %a to T*       ; replaces p in I
//! ```
//!
//! Folded rewrite of `p = inttoptr(add i32 x, C)`:
//!
//! ```text
//! %m = and i32 x, MASK             ; only when W < 32
//! %z = zext i32 %m to i64
//! %a = add i64 %base, %z
//! %o = add i64 %a, C
//! %q = inttoptr i64 %o to T*
//! ```

use super::base_cache::BaseCache;
use super::fold::{match_fold, FoldCandidate};
use super::SandboxContext;
use crate::ir::{BinOp, CastOp, Function, InstId, InstKind, Type, Value};
use crate::{Error, Result};

/// What a single pointer rewrite did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerRewrite {
    /// The folded fast path was taken
    pub folded: bool,
    /// Instructions erased because the fold left them dead
    pub removed: usize,
}

/// Replaces operand `index` of `inst` with a pointer confined to the
/// sandbox region. `first_class` enables the folded fast path; it is set
/// for single-value accesses and cleared for bulk memory operations.
pub fn sandbox_pointer(
    cx: &SandboxContext,
    func: &mut Function,
    base: &mut BaseCache,
    inst: InstId,
    index: usize,
    first_class: bool,
) -> Result<PointerRewrite> {
    let mem_base = base.get_or_create(func)?;

    let ptr = func
        .inst(inst)
        .and_then(|data| data.kind.operand(index))
        .cloned()
        .ok_or_else(|| {
            Error::Ir(format!(
                "instruction %{} in @{} has no operand {}",
                inst.0, func.name, index
            ))
        })?;
    let ptr_ty = func.value_type(&ptr, &cx.symbols)?;
    let pointee = ptr_ty.pointee().ok_or_else(|| {
        Error::Ir(format!(
            "operand {} of %{} in @{} is not a pointer",
            index, inst.0, func.name
        ))
    })?;
    let access_size = cx.data_layout.store_size(pointee);

    let fold = if first_class {
        match_fold(func, &ptr, access_size, cx.config.subspace_size())
    } else {
        None
    };

    let mut truncated = match &fold {
        Some(candidate) => candidate.index.clone(),
        None => Value::Inst(func.insert_before(
            inst,
            InstKind::Cast {
                op: CastOp::PtrToInt,
                value: ptr.clone(),
            },
            Type::i32(),
        )?),
    };

    if let Some(mask) = cx.config.mask() {
        truncated = Value::Inst(func.insert_before(
            inst,
            InstKind::Binary {
                op: BinOp::And,
                lhs: truncated,
                rhs: Value::i32(i64::from(mask)),
            },
            Type::i32(),
        )?);
    }

    let extended = func.insert_before(
        inst,
        InstKind::Cast {
            op: CastOp::ZExt,
            value: truncated,
        },
        Type::i64(),
    )?;
    let add_base = func.insert_before(
        inst,
        InstKind::Binary {
            op: BinOp::Add,
            lhs: Value::Inst(mem_base),
            rhs: Value::Inst(extended),
        },
        Type::i64(),
    )?;
    let address = match &fold {
        Some(candidate) => func.insert_before(
            inst,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: Value::Inst(add_base),
                rhs: Value::i64(candidate.offset as i64),
            },
            Type::i64(),
        )?,
        None => add_base,
    };
    let sandboxed = func.insert_before(
        inst,
        InstKind::Cast {
            op: CastOp::IntToPtr,
            value: Value::Inst(address),
        },
        ptr_ty,
    )?;

    func.replace_operand(inst, index, Value::Inst(sandboxed))?;

    let Some(candidate) = fold else {
        tracing::trace!(function = %func.name, inst = inst.0, index, "sandboxed pointer");
        return Ok(PointerRewrite::default());
    };

    let removed = retire_folded(func, &candidate, address, sandboxed)?;
    tracing::trace!(
        function = %func.name,
        inst = inst.0,
        index,
        offset = candidate.offset,
        removed,
        "sandboxed pointer via folded offset"
    );
    Ok(PointerRewrite {
        folded: true,
        removed,
    })
}

/// Moves source positions from the matched `add`/`inttoptr` onto their
/// replacements and erases them if nothing else reads them. The cast goes
/// first: it is the only reader of the `add` the pattern guarantees.
fn retire_folded(
    func: &mut Function,
    candidate: &FoldCandidate,
    address: InstId,
    sandboxed: InstId,
) -> Result<usize> {
    let add_loc = func.inst(candidate.add).and_then(|d| d.debug_loc);
    let cast_loc = func.inst(candidate.cast).and_then(|d| d.debug_loc);
    func.set_debug_loc(address, add_loc)?;
    func.set_debug_loc(sandboxed, cast_loc)?;

    let mut removed = 0;
    if !func.has_uses(candidate.cast) {
        func.erase(candidate.cast)?;
        removed += 1;
    }
    if func.inst(candidate.add).is_some() && !func.has_uses(candidate.add) {
        func.erase(candidate.add)?;
        removed += 1;
    }
    Ok(removed)
}
