//! # Intermediate Representation (IR)
//!
//! A small typed SSA IR: just enough surface for whole-module memory
//! instrumentation passes.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # Type, DataLayout
//! ├── value.rs        # InstId/BlockId/GlobalId/FuncId, Value, Constant
//! ├── instruction.rs  # InstKind (closed opcode set), InstData, Intrinsic
//! ├── function.rs     # Function, Block, instruction arena and splicing
//! ├── module.rs       # Module, Global, SymbolTable
//! └── display.rs      # One-line instruction printer for diagnostics
//! ```
//!
//! ## Key Types
//!
//! - [`Module`] - functions, globals, data layout, module flags
//! - [`Function`] - blocks over an arena of [`InstData`] with stable [`InstId`]s
//! - [`InstKind`] - closed instruction set; operand slots are indexable
//! - [`Value`] - instruction result, argument, constant or symbol address
//!
//! Values are never mutated in place: rewriting code means building new
//! instructions and retargeting an operand slot with
//! [`Function::replace_operand`], then erasing what became dead with
//! [`Function::erase`].

mod display;
mod function;
mod instruction;
mod module;
mod types;
mod value;

pub use display::{format_function, format_inst, InstDisplay};
pub use function::{Block, Function};
pub use instruction::{BinOp, CastOp, DebugLoc, InstData, InstKind, IntPredicate, Intrinsic};
pub use module::{Global, Linkage, Module, SymbolTable};
pub use types::{DataLayout, Type};
pub use value::{BlockId, Constant, FuncId, GlobalId, InstId, Value};
