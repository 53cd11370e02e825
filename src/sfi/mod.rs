//! # Software Fault Isolation: memory access sandboxing
//!
//! [`SandboxMemoryAccesses`] rewrites every memory-touching instruction of a
//! module so the only addresses ever dereferenced lie in
//! `[base, base + 2 * 2^W)`: a `2^W`-byte region owned by the runtime,
//! followed by an equally sized guard region.
//!
//! ## Pipeline
//!
//! ```text
//! classify (pure, fail closed) → install runtime symbols → rewrite functions → verify
//! ```
//!
//! | Step | Module |
//! |------|--------|
//! | Route each instruction; reject uncovered pointer operands | `classify` |
//! | Declare `__sfi_memory_base`, define `__sfi_pointer_size` | `config` |
//! | One base load per function, at entry | `base_cache` |
//! | Confine pointer operands, fold `inttoptr(add x, C)` | `pointer`, `fold` |
//! | Mask bulk-operation lengths | `length` |
//! | Re-check the result | `verify` |
//!
//! ## Sandboxed instructions
//!
//! - `load`, `store`
//! - `memcpy`, `memmove`, `memset`
//! - atomic load, store, rmw, cmpxchg and is-lock-free
//!
//! `ptrtoint` and `bitcast` are let through since they never dereference.
//! Any other instruction reading a pointer aborts the pass with
//! [`Error::UncoveredPointerOperand`] before the module is modified.
//!
//! The emitted arithmetic is always 64-bit; 32-bit targets rely on the code
//! generator to drop the high half at the final `inttoptr`.

mod base_cache;
mod classify;
mod config;
mod fold;
mod length;
mod pointer;
mod verify;

pub use base_cache::BaseCache;
pub use classify::{
    check_access_operands, check_no_pointer_operands, plan_function, route, AccessPlan,
    PointerSlot, Route,
};
pub use config::{
    SandboxOptions, SubspaceConfig, SubspaceWidth, MEMORY_BASE_SYMBOL, POINTER_SIZE_SYMBOL,
    SANDBOXED_FLAG,
};
pub use fold::{match_fold, offset_in_bounds, FoldCandidate};
pub use length::sandbox_length;
pub use pointer::{sandbox_pointer, PointerRewrite};
pub use verify::{verify_confinement, ConfinementViolation};

use crate::ir::{DataLayout, Function, InstId, Module, SymbolTable};
use crate::{Error, Result};
use rayon::prelude::*;

/// Read-only state shared by every function rewrite
#[derive(Debug, Clone)]
pub struct SandboxContext {
    /// Installed subspace configuration
    pub config: SubspaceConfig,
    /// Symbol names and types, including the runtime symbols
    pub symbols: SymbolTable,
    /// Target data layout
    pub data_layout: DataLayout,
}

impl SandboxContext {
    /// Snapshots `module` after `config` was installed into it
    pub fn new(module: &Module, config: SubspaceConfig) -> Self {
        Self {
            config,
            symbols: module.symbols(),
            data_layout: module.data_layout,
        }
    }
}

/// Counters for one function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionStats {
    /// Pointer operands confined
    pub sandboxed_pointers: usize,
    /// Length operands masked
    pub masked_lengths: usize,
    /// Pointer operands confined through the folded fast path
    pub folded_accesses: usize,
    /// Instructions erased after folding
    pub removed_instructions: usize,
    /// Whether the base load was inserted
    pub loaded_base: bool,
}

/// Summary of a module rewrite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SandboxReport {
    /// Subspace width used
    pub pointer_size_bits: u32,
    /// Function bodies visited
    pub functions: usize,
    /// Functions that received a base load
    pub base_loads: usize,
    /// Pointer operands confined
    pub sandboxed_pointers: usize,
    /// Length operands masked
    pub masked_lengths: usize,
    /// Pointer operands confined through the folded fast path
    pub folded_accesses: usize,
    /// Instructions erased after folding
    pub removed_instructions: usize,
}

impl SandboxReport {
    fn add(&mut self, stats: &FunctionStats) {
        self.functions += 1;
        self.base_loads += usize::from(stats.loaded_base);
        self.sandboxed_pointers += stats.sandboxed_pointers;
        self.masked_lengths += stats.masked_lengths;
        self.folded_accesses += stats.folded_accesses;
        self.removed_instructions += stats.removed_instructions;
    }
}

/// Applies the planned rewrites to one function body
pub fn sandbox_function(
    cx: &SandboxContext,
    func: &mut Function,
    plan: &[(InstId, AccessPlan)],
) -> Result<FunctionStats> {
    let mut stats = FunctionStats::default();
    let mut base = BaseCache::new(cx.config.memory_base);

    for &(inst, access) in plan {
        if func.inst(inst).is_none() {
            continue;
        }
        for slot in access.pointers {
            let rewrite = sandbox_pointer(cx, func, &mut base, inst, slot.index, slot.first_class)?;
            stats.sandboxed_pointers += 1;
            stats.folded_accesses += usize::from(rewrite.folded);
            stats.removed_instructions += rewrite.removed;
        }
        if let Some(index) = access.length {
            if sandbox_length(cx, func, inst, index)? {
                stats.masked_lengths += 1;
            }
        }
    }

    stats.loaded_base = base.get().is_some();
    if stats.sandboxed_pointers > 0 {
        tracing::debug!(
            function = %func.name,
            pointers = stats.sandboxed_pointers,
            folded = stats.folded_accesses,
            lengths = stats.masked_lengths,
            "sandboxed function"
        );
    }
    Ok(stats)
}

/// The memory-access sandboxing pass.
///
/// Meant to run once per module, after global data has been moved into the
/// sandbox and before control-flow integrity instrumentation.
#[derive(Debug, Clone)]
pub struct SandboxMemoryAccesses {
    width: SubspaceWidth,
    options: SandboxOptions,
}

impl SandboxMemoryAccesses {
    /// Creates the pass, validating the subspace width
    pub fn new(options: SandboxOptions) -> Result<Self> {
        let width = options.width()?;
        Ok(Self { width, options })
    }

    /// Subspace width the pass confines to
    pub fn width(&self) -> SubspaceWidth {
        self.width
    }

    /// Rewrites `module` in place.
    ///
    /// On error the module is left as it was, except for
    /// [`Error::Ir`] raised by the post-rewrite verifier.
    pub fn run(&self, module: &mut Module) -> Result<SandboxReport> {
        if module.has_flag(SANDBOXED_FLAG) {
            return Err(Error::AlreadySandboxed {
                module: module.name.clone(),
            });
        }

        let symbols = module.symbols();
        let plans = module
            .functions
            .iter()
            .map(|func| plan_function(func, &symbols))
            .collect::<Result<Vec<_>>>()?;

        let config = SubspaceConfig::install(module, self.width)?;
        let cx = SandboxContext::new(module, config);

        let stats = if self.options.parallel {
            module
                .functions
                .par_iter_mut()
                .zip(plans.par_iter())
                .filter(|(func, _)| !func.is_declaration())
                .map(|(func, plan)| sandbox_function(&cx, func, plan))
                .collect::<Result<Vec<_>>>()?
        } else {
            module
                .functions
                .iter_mut()
                .zip(plans.iter())
                .filter(|(func, _)| !func.is_declaration())
                .map(|(func, plan)| sandbox_function(&cx, func, plan))
                .collect::<Result<Vec<_>>>()?
        };

        let mut report = SandboxReport {
            pointer_size_bits: self.width.bits(),
            ..SandboxReport::default()
        };
        for function_stats in &stats {
            report.add(function_stats);
        }
        module.set_flag(SANDBOXED_FLAG);

        if self.options.verify {
            let violations = verify_confinement(module, &config);
            if let Some(first) = violations.first() {
                return Err(Error::Ir(format!(
                    "sandboxed module failed confinement check ({} violations): {}",
                    violations.len(),
                    first
                )));
            }
        }

        tracing::info!(
            module = %module.name,
            bits = report.pointer_size_bits,
            functions = report.functions,
            pointers = report.sandboxed_pointers,
            folded = report.folded_accesses,
            lengths = report.masked_lengths,
            "sandboxed memory accesses"
        );
        Ok(report)
    }
}

impl Default for SandboxMemoryAccesses {
    fn default() -> Self {
        Self {
            width: SubspaceWidth::default(),
            options: SandboxOptions::default(),
        }
    }
}
