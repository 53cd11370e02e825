//! IR instruction definitions

use super::types::Type;
use super::value::{BlockId, Value};

/// Two-operand integer arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Wrapping multiplication
    Mul,
    /// Bitwise AND
    And,
    /// Bitwise OR
    Or,
    /// Bitwise XOR
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    LShr,
}

impl BinOp {
    /// Textual mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
        }
    }
}

/// Integer comparison predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Unsigned less than
    Ult,
    /// Signed less than
    Slt,
}

impl IntPredicate {
    /// Textual mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ult => "ult",
            IntPredicate::Slt => "slt",
        }
    }
}

/// Conversion operators; the destination type is the instruction's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Integer truncation
    Trunc,
    /// Zero extension
    ZExt,
    /// Sign extension
    SExt,
    /// Pointer to integer
    PtrToInt,
    /// Integer to pointer
    IntToPtr,
    /// Reinterpretation between types of equal size (pointer to pointer)
    BitCast,
}

impl CastOp {
    /// Textual mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::BitCast => "bitcast",
        }
    }
}

/// Platform intrinsics reachable through [`InstKind::Intrinsic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `memcpy(dst, src, len, align, volatile)`
    Memcpy,
    /// `memmove(dst, src, len, align, volatile)`
    Memmove,
    /// `memset(dst, val, len, align, volatile)`
    Memset,
    /// `atomic.load(ptr, order)`
    AtomicLoad,
    /// `atomic.store(value, ptr, order)`
    AtomicStore,
    /// `atomic.rmw(op, ptr, value, order)`
    AtomicRmw,
    /// `atomic.cmpxchg(ptr, expected, desired, success_order, failure_order)`
    AtomicCmpxchg,
    /// `atomic.is.lock.free(size, ptr)`
    AtomicIsLockFree,
    /// `atomic.fence(order)`
    AtomicFence,
    /// `trap()`
    Trap,
    /// `stacksave() -> i8*`
    StackSave,
    /// `stackrestore(i8*)`
    StackRestore,
}

impl Intrinsic {
    /// Symbol the intrinsic is printed as
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Memcpy => "llvm.memcpy",
            Intrinsic::Memmove => "llvm.memmove",
            Intrinsic::Memset => "llvm.memset",
            Intrinsic::AtomicLoad => "llvm.nacl.atomic.load",
            Intrinsic::AtomicStore => "llvm.nacl.atomic.store",
            Intrinsic::AtomicRmw => "llvm.nacl.atomic.rmw",
            Intrinsic::AtomicCmpxchg => "llvm.nacl.atomic.cmpxchg",
            Intrinsic::AtomicIsLockFree => "llvm.nacl.atomic.is.lock.free",
            Intrinsic::AtomicFence => "llvm.nacl.atomic.fence",
            Intrinsic::Trap => "llvm.trap",
            Intrinsic::StackSave => "llvm.stacksave",
            Intrinsic::StackRestore => "llvm.stackrestore",
        }
    }
}

/// Instruction opcode and operands.
///
/// The set of kinds is closed: passes that must account for every
/// pointer-carrying construct match on it without a wildcard arm.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// `*ptr`
    Load {
        /// Source address
        ptr: Value,
    },
    /// `*ptr = value`
    Store {
        /// Stored value
        value: Value,
        /// Destination address
        ptr: Value,
    },
    /// Integer arithmetic
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Integer comparison producing `i1`
    ICmp {
        /// Predicate
        pred: IntPredicate,
        /// Left operand
        lhs: Value,
        /// Right operand
        rhs: Value,
    },
    /// Type conversion
    Cast {
        /// Operator
        op: CastOp,
        /// Converted value
        value: Value,
    },
    /// `cond ? on_true : on_false`
    Select {
        /// `i1` condition
        cond: Value,
        /// Value when the condition holds
        on_true: Value,
        /// Value otherwise
        on_false: Value,
    },
    /// SSA join
    Phi {
        /// Incoming value per predecessor block
        incoming: Vec<(Value, BlockId)>,
    },
    /// Structured address computation
    GetElementPtr {
        /// Base address
        base: Value,
        /// Index operands
        indices: Vec<Value>,
    },
    /// Direct or indirect call
    Call {
        /// Called function address
        callee: Value,
        /// Arguments
        args: Vec<Value>,
    },
    /// Intrinsic call
    Intrinsic {
        /// Which intrinsic
        id: Intrinsic,
        /// Arguments
        args: Vec<Value>,
    },
    /// Function return
    Ret {
        /// Returned value
        value: Option<Value>,
    },
    /// Unconditional branch
    Br {
        /// Successor
        target: BlockId,
    },
    /// Two-way branch
    CondBr {
        /// `i1` condition
        cond: Value,
        /// Successor when the condition holds
        then_block: BlockId,
        /// Successor otherwise
        else_block: BlockId,
    },
    /// Control never reaches this point
    Unreachable,
}

impl InstKind {
    /// Operands in slot order. Calls list arguments first and the callee last.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            InstKind::Phi { incoming } => incoming.iter().map(|(v, _)| v).collect(),
            InstKind::GetElementPtr { base, indices } => {
                std::iter::once(base).chain(indices.iter()).collect()
            }
            InstKind::Call { callee, args } => {
                args.iter().chain(std::iter::once(callee)).collect()
            }
            InstKind::Intrinsic { args, .. } => args.iter().collect(),
            InstKind::Ret { value } => value.iter().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
        }
    }

    /// Mutable operands in the same slot order as [`InstKind::operands`]
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Load { ptr } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            InstKind::Phi { incoming } => incoming.iter_mut().map(|(v, _)| v).collect(),
            InstKind::GetElementPtr { base, indices } => {
                std::iter::once(base).chain(indices.iter_mut()).collect()
            }
            InstKind::Call { callee, args } => {
                args.iter_mut().chain(std::iter::once(callee)).collect()
            }
            InstKind::Intrinsic { args, .. } => args.iter_mut().collect(),
            InstKind::Ret { value } => value.iter_mut().collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Br { .. } | InstKind::Unreachable => Vec::new(),
        }
    }

    /// Operand in slot `index`
    pub fn operand(&self, index: usize) -> Option<&Value> {
        self.operands().get(index).copied()
    }

    /// Number of operand slots
    pub fn num_operands(&self) -> usize {
        self.operands().len()
    }

    /// Argument operands of a call; `None` for non-call instructions
    pub fn call_args(&self) -> Option<&[Value]> {
        match self {
            InstKind::Call { args, .. } => Some(args),
            _ => None,
        }
    }

    /// Returns true for block terminators
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Ret { .. } | InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Unreachable
        )
    }
}

/// Source position attached to an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugLoc {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub col: u32,
}

/// Instruction stored in a function's arena
#[derive(Debug, Clone, PartialEq)]
pub struct InstData {
    /// Opcode and operands
    pub kind: InstKind,
    /// Result type (`void` when the instruction produces no value)
    pub ty: Type,
    /// Block the instruction lives in
    pub block: BlockId,
    /// Source position, if known
    pub debug_loc: Option<DebugLoc>,
}
