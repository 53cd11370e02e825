//! Length operands of bulk memory operations.
//!
//! A length is a bound, not an address: it only needs truncating to the
//! subspace. Together with the guard region this keeps `dst + len` inside
//! reserved memory.

use super::SandboxContext;
use crate::ir::{BinOp, Function, InstId, InstKind, Value};
use crate::{Error, Result};

/// Masks integer operand `index` of `inst` with `2^W - 1`.
///
/// Returns false (and emits nothing) for 32-bit subspaces.
pub fn sandbox_length(
    cx: &SandboxContext,
    func: &mut Function,
    inst: InstId,
    index: usize,
) -> Result<bool> {
    let Some(mask) = cx.config.mask() else {
        return Ok(false);
    };

    let len = func
        .inst(inst)
        .and_then(|data| data.kind.operand(index))
        .cloned()
        .ok_or_else(|| {
            Error::Ir(format!(
                "instruction %{} in @{} has no operand {}",
                inst.0, func.name, index
            ))
        })?;
    let len_ty = func.value_type(&len, &cx.symbols)?;
    let bits = len_ty.int_bits().ok_or_else(|| {
        Error::Ir(format!(
            "length operand of %{} in @{} is not an integer",
            inst.0, func.name
        ))
    })?;

    let masked = func.insert_before(
        inst,
        InstKind::Binary {
            op: BinOp::And,
            lhs: len,
            rhs: Value::int(bits, i64::from(mask)),
        },
        len_ty,
    )?;
    func.replace_operand(inst, index, Value::Inst(masked))?;
    tracing::trace!(function = %func.name, inst = inst.0, index, mask, "masked length");
    Ok(true)
}
