//! Subspace configuration and the runtime symbol contract
//!
//! The runtime reads the subspace width from [`POINTER_SIZE_SYMBOL`] and
//! stores the base of a `2^W`-byte region (followed by an equally sized guard
//! region) into [`MEMORY_BASE_SYMBOL`] before any sandboxed code runs.

use crate::ir::{Constant, Global, GlobalId, Linkage, Module, Type};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// 64-bit base address of the sandbox region, defined by the runtime
pub const MEMORY_BASE_SYMBOL: &str = "__sfi_memory_base";

/// Exported 32-bit constant holding the subspace width in bits
pub const POINTER_SIZE_SYMBOL: &str = "__sfi_pointer_size";

/// Module flag set once a module has been sandboxed
pub const SANDBOXED_FLAG: &str = "minsfi.sandboxed";

/// Number of significant low address bits inside the sandbox (`1..=32`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubspaceWidth(u32);

impl SubspaceWidth {
    /// Widest supported subspace
    pub const MAX_BITS: u32 = 32;

    /// Validates a width in bits
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 || bits > Self::MAX_BITS {
            return Err(Error::InvalidPointerSize { bits });
        }
        Ok(Self(bits))
    }

    /// Width in bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Size of the addressable subspace, `2^W` bytes
    pub fn subspace_size(&self) -> u64 {
        1u64 << self.0
    }

    /// Bit mask `2^W - 1`, or `None` for full 32-bit subspaces
    pub fn mask(&self) -> Option<u32> {
        if self.0 < Self::MAX_BITS {
            Some((1u32 << self.0) - 1)
        } else {
            None
        }
    }

    /// Offset inside the region that the sandboxed code computes for a
    /// 32-bit address
    pub fn confine(&self, addr: u32) -> u32 {
        match self.mask() {
            Some(mask) => addr & mask,
            None => addr,
        }
    }
}

impl Default for SubspaceWidth {
    fn default() -> Self {
        Self(Self::MAX_BITS)
    }
}

impl TryFrom<u32> for SubspaceWidth {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self> {
        Self::new(bits)
    }
}

/// Options for [`SandboxMemoryAccesses`](super::SandboxMemoryAccesses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxOptions {
    /// Subspace width `W` in bits (1-32)
    pub pointer_size_bits: u32,
    /// Rewrite functions on the rayon thread pool
    pub parallel: bool,
    /// Re-check every rewritten access after the pass
    pub verify: bool,
}

impl SandboxOptions {
    /// Parses options from a JSON document; absent fields take defaults
    pub fn from_json(source: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(source).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        options.width()?;
        Ok(options)
    }

    /// Validated subspace width
    pub fn width(&self) -> Result<SubspaceWidth> {
        SubspaceWidth::new(self.pointer_size_bits)
    }
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            pointer_size_bits: SubspaceWidth::MAX_BITS,
            parallel: false,
            verify: true,
        }
    }
}

/// Module-level configuration shared by every function rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubspaceConfig {
    /// Subspace width
    pub width: SubspaceWidth,
    /// Declared `i64` holding the region base
    pub memory_base: GlobalId,
    /// Exported `i32` constant holding the width
    pub pointer_size: GlobalId,
}

impl SubspaceConfig {
    /// Declares the base symbol (reusing a compatible declaration) and
    /// defines the exported width constant.
    ///
    /// All conflicts are detected before the module is touched.
    pub fn install(module: &mut Module, width: SubspaceWidth) -> Result<Self> {
        if module.global_by_name(POINTER_SIZE_SYMBOL).is_some() {
            return Err(Error::SymbolConflict {
                name: POINTER_SIZE_SYMBOL.to_string(),
                reason: "pointer size constant is already defined".to_string(),
            });
        }
        if let Some(existing) = module
            .global_by_name(MEMORY_BASE_SYMBOL)
            .and_then(|id| module.global(id))
        {
            let compatible = existing.ty == Type::i64()
                && existing.linkage == Linkage::External
                && !existing.is_constant
                && existing.initializer.is_none();
            if !compatible {
                return Err(Error::SymbolConflict {
                    name: MEMORY_BASE_SYMBOL.to_string(),
                    reason: "memory base must be an external, mutable, uninitialized i64"
                        .to_string(),
                });
            }
        }

        let memory_base = module.get_or_insert_global(MEMORY_BASE_SYMBOL, Type::i64())?;
        let pointer_size = module.add_global(Global {
            name: POINTER_SIZE_SYMBOL.to_string(),
            ty: Type::i32(),
            linkage: Linkage::External,
            is_constant: true,
            initializer: Some(Constant::int(32, i64::from(width.bits()))),
        })?;

        Ok(Self {
            width,
            memory_base,
            pointer_size,
        })
    }

    /// See [`SubspaceWidth::mask`]
    pub fn mask(&self) -> Option<u32> {
        self.width.mask()
    }

    /// See [`SubspaceWidth::subspace_size`]
    pub fn subspace_size(&self) -> u64 {
        self.width.subspace_size()
    }
}
