//! Recognition of pre-lowered `index + constant` address arithmetic.
//!
//! Address lowering turns structured addressing into
//!
//! ```text
//! %sum = add i32 %x, C
//! %ptr = inttoptr i32 %sum to T*
//! ```
//!
//! When `0 <= C <= 2^W - size_of(T)`, the access can be confined as
//! `base + zext(%x) + C` instead of truncating `%ptr` again. This relies on
//! the runtime placing a guard region of `2^W` bytes right after the sandbox.
//!
//! Matching is side-effect free; the rewrite happens in
//! [`sandbox_pointer`](super::pointer::sandbox_pointer).

use crate::ir::{BinOp, CastOp, Function, InstId, InstKind, Value};

/// Matched `inttoptr(add i32 index, offset)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldCandidate {
    /// 32-bit index the constant was added to
    pub index: Value,
    /// Non-negative constant offset, re-added in 64 bits
    pub offset: u64,
    /// The `inttoptr` producing the original pointer
    pub cast: InstId,
    /// The `add` feeding the cast
    pub add: InstId,
}

/// Returns true if a folded `offset` keeps an access of `access_size` bytes
/// within the subspace plus its guard region.
///
/// An access wider than the subspace never fits, whatever the offset.
pub fn offset_in_bounds(offset: i64, access_size: u64, subspace_size: u64) -> bool {
    u64::try_from(offset).is_ok_and(|offset| {
        subspace_size
            .checked_sub(access_size)
            .is_some_and(|max_offset| offset <= max_offset)
    })
}

/// Matches the fast-path shape on a pointer operand.
///
/// Only the constant in the second `add` slot is considered, read as a
/// signed 32-bit value.
pub fn match_fold(
    func: &Function,
    ptr: &Value,
    access_size: u64,
    subspace_size: u64,
) -> Option<FoldCandidate> {
    let cast_id = ptr.as_inst()?;
    let InstKind::Cast {
        op: CastOp::IntToPtr,
        value,
    } = &func.inst(cast_id)?.kind
    else {
        return None;
    };

    let add_id = value.as_inst()?;
    let add = func.inst(add_id)?;
    if !add.ty.is_int(32) {
        return None;
    }
    let InstKind::Binary {
        op: BinOp::Add,
        lhs,
        rhs,
    } = &add.kind
    else {
        return None;
    };

    let offset = rhs.as_const()?.sext_value()?;
    if !offset_in_bounds(offset, access_size, subspace_size) {
        return None;
    }

    Some(FoldCandidate {
        index: lhs.clone(),
        offset: offset as u64,
        cast: cast_id,
        add: add_id,
    })
}
