//! # MinSFI - Software Fault Isolation for SSA IR
//!
//! Instruments a compiled module so that, at runtime, every dereferenced
//! address lies inside a memory region owned by the sandbox runtime. The
//! untrusted code needs no hardware memory protection: confinement comes
//! from the arithmetic the pass inserts in front of each access.
//!
//! ## Quick Start
//!
//! ```rust
//! use minsfi::ir::{Function, InstKind, Module, Type, Value};
//! use minsfi::{SandboxMemoryAccesses, SandboxOptions};
//!
//! # fn main() -> minsfi::Result<()> {
//! let mut module = Module::new("guest");
//! let mut func = Function::new("read", vec![Type::i32().ptr_to()], Type::i32());
//! let entry = func.add_block("entry");
//! let value = func.append(entry, InstKind::Load { ptr: Value::Arg(0) }, Type::i32())?;
//! func.append(entry, InstKind::Ret { value: Some(Value::Inst(value)) }, Type::Void)?;
//! module.add_function(func);
//!
//! let pass = SandboxMemoryAccesses::new(SandboxOptions {
//!     pointer_size_bits: 24,
//!     ..SandboxOptions::default()
//! })?;
//! let report = pass.run(&mut module)?;
//! assert_eq!(report.sandboxed_pointers, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Runtime Contract
//!
//! - `__sfi_memory_base` (`i64`): declared by the pass, defined and
//!   initialized by the runtime before sandboxed code runs.
//! - `__sfi_pointer_size` (`i32`, exported constant): the subspace width `W`.
//! - The runtime maps `2^W` bytes at the base, immediately followed by a
//!   guard region of the same size.
//!
//! ## Architecture
//!
//! ```text
//! ir/   typed SSA IR: modules, functions, closed instruction set, printer
//! sfi/  the sandboxing pass: classification, configuration, rewriting, verification
//! ```

pub mod error;
pub mod ir;
pub mod sfi;

pub use error::{Error, ErrorSeverity, Result};
pub use sfi::{
    verify_confinement, ConfinementViolation, SandboxMemoryAccesses, SandboxOptions,
    SandboxReport, SubspaceConfig, SubspaceWidth,
};
