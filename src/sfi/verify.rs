//! # Confinement Verifier
//!
//! Re-checks a sandboxed module: every memory access must read its address
//! from the confinement sequence, every length from a mask, and each
//! function must load the sandbox base exactly once, first thing in its
//! entry block.

use super::classify::{route, Route};
use super::config::SubspaceConfig;
use super::fold::offset_in_bounds;
use crate::ir::{
    format_inst, BinOp, CastOp, DataLayout, Function, GlobalId, InstId, InstKind, Module,
    SymbolTable, Value,
};

/// A rewritten access whose shape does not prove confinement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfinementViolation {
    /// Function containing the access
    pub function: String,
    /// Offending instruction, printed
    pub instruction: String,
    /// What is wrong with it
    pub reason: String,
}

impl std::fmt::Display for ConfinementViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}: {}: {}", self.function, self.instruction, self.reason)
    }
}

struct FunctionVerifier<'a> {
    func: &'a Function,
    symbols: &'a SymbolTable,
    config: &'a SubspaceConfig,
    data_layout: DataLayout,
    base: Option<InstId>,
}

impl FunctionVerifier<'_> {
    fn producer(&self, value: &Value) -> Option<&InstKind> {
        value
            .as_inst()
            .and_then(|id| self.func.inst(id))
            .map(|data| &data.kind)
    }

    fn is_base(&self, value: &Value) -> bool {
        self.base.is_some() && value.as_inst() == self.base
    }

    fn is_mask(&self, value: &Value) -> bool {
        let expected = self.config.mask().map(i64::from);
        value.as_const().and_then(|c| c.zext_value()).map(|v| v as i64) == expected
    }

    /// `zext i32 (and x, MASK)` when masking, any `zext i32` otherwise
    fn check_offset(&self, value: &Value) -> Result<(), String> {
        let Some(InstKind::Cast {
            op: CastOp::ZExt,
            value: narrow,
        }) = self.producer(value)
        else {
            return Err("offset is not zero-extended".to_string());
        };
        let narrow_ty = self
            .func
            .value_type(narrow, self.symbols)
            .map_err(|e| e.to_string())?;
        if !narrow_ty.is_int(32) {
            return Err(format!("offset extended from {} instead of i32", narrow_ty));
        }
        if self.config.mask().is_none() {
            return Ok(());
        }
        match self.producer(narrow) {
            Some(InstKind::Binary {
                op: BinOp::And,
                rhs,
                ..
            }) if self.is_mask(rhs) => Ok(()),
            _ => Err("offset is not masked".to_string()),
        }
    }

    /// `add base, zext(..)`
    fn check_base_add(&self, value: &Value) -> Result<(), String> {
        match self.producer(value) {
            Some(InstKind::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
            }) if self.is_base(lhs) => self.check_offset(rhs),
            _ => Err("address does not add the sandbox base".to_string()),
        }
    }

    fn check_pointer(&self, ptr: &Value, first_class: bool) -> Result<(), String> {
        let Some(InstKind::Cast {
            op: CastOp::IntToPtr,
            value: address,
        }) = self.producer(ptr)
        else {
            return Err("pointer is not rebuilt from a sandboxed address".to_string());
        };
        match self.producer(address) {
            Some(InstKind::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
            }) if !self.is_base(lhs) => {
                let offset = rhs
                    .as_const()
                    .and_then(|c| c.sext_value())
                    .ok_or_else(|| "folded offset is not a constant".to_string())?;
                if !first_class {
                    return Err("bulk access uses a folded offset".to_string());
                }
                let size = self.pointee_size(ptr)?;
                if !offset_in_bounds(offset, size, self.config.subspace_size()) {
                    return Err(format!("folded offset {} exceeds the guard region", offset));
                }
                self.check_base_add(lhs)
            }
            _ => self.check_base_add(address),
        }
    }

    fn pointee_size(&self, ptr: &Value) -> Result<u64, String> {
        let ty = self
            .func
            .value_type(ptr, self.symbols)
            .map_err(|e| e.to_string())?;
        ty.pointee()
            .map(|pointee| self.data_layout.store_size(pointee))
            .ok_or_else(|| "address is not a pointer".to_string())
    }

    fn check_length(&self, len: &Value) -> Result<(), String> {
        if self.config.mask().is_none() {
            return Ok(());
        }
        match self.producer(len) {
            Some(InstKind::Binary {
                op: BinOp::And,
                rhs,
                ..
            }) if self.is_mask(rhs) => Ok(()),
            _ => Err("length is not masked".to_string()),
        }
    }
}

fn base_loads(func: &Function, memory_base: GlobalId) -> Vec<InstId> {
    func.program_order()
        .into_iter()
        .filter(|&id| {
            matches!(
                func.inst(id).map(|d| &d.kind),
                Some(InstKind::Load { ptr: Value::Global(g) }) if *g == memory_base
            )
        })
        .collect()
}

/// Checks every function body of a module rewritten with `config`
pub fn verify_confinement(module: &Module, config: &SubspaceConfig) -> Vec<ConfinementViolation> {
    let symbols = module.symbols();
    let mut violations = Vec::new();

    for func in module.functions.iter().filter(|f| !f.is_declaration()) {
        let loads = base_loads(func, config.memory_base);
        let mut report = |inst: InstId, reason: String| {
            violations.push(ConfinementViolation {
                function: func.name.clone(),
                instruction: format_inst(func, &symbols, inst),
                reason,
            });
        };

        if loads.len() > 1 {
            report(loads[1], "sandbox base loaded more than once".to_string());
        }
        let base = loads.first().copied();
        if let Some(base) = base {
            let entry_head = func
                .entry_block()
                .and_then(|b| func.block(b))
                .and_then(|b| b.insts().first().copied());
            if entry_head != Some(base) {
                report(base, "sandbox base is not loaded at function entry".to_string());
            }
        }

        let verifier = FunctionVerifier {
            func,
            symbols: &symbols,
            config,
            data_layout: module.data_layout,
            base,
        };

        for inst in func.program_order() {
            if Some(inst) == base || loads.contains(&inst) {
                continue;
            }
            let Some(data) = func.inst(inst) else {
                continue;
            };
            let Route::Sandbox(plan) = route(&data.kind) else {
                continue;
            };
            for slot in plan.pointers {
                let checked = match data.kind.operand(slot.index) {
                    Some(ptr) => verifier.check_pointer(ptr, slot.first_class),
                    None => Err(format!("missing operand {}", slot.index)),
                };
                if let Err(reason) = checked {
                    report(inst, reason);
                }
            }
            if let Some(index) = plan.length {
                let checked = match data.kind.operand(index) {
                    Some(len) => verifier.check_length(len),
                    None => Err(format!("missing operand {}", index)),
                };
                if let Err(reason) = checked {
                    report(inst, reason);
                }
            }
        }
    }

    violations
}
