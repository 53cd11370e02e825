//! SSA values and constants

use super::types::Type;

/// Instruction handle, stable for the lifetime of its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// Basic block handle within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Global symbol handle within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

/// Function handle within a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Compile-time constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Integer constant; `value` holds the low `bits` sign-extended to 64 bits
    Int {
        /// Bit width
        bits: u32,
        /// Sign-extended value
        value: i64,
    },
    /// Null pointer of the given pointer type
    Null(Type),
    /// Undefined value of the given type
    Undef(Type),
}

impl Constant {
    /// Integer constant of width `bits`, normalized to its sign-extended form
    pub fn int(bits: u32, value: i64) -> Self {
        let value = if bits == 0 || bits >= 64 {
            value
        } else {
            let shift = 64 - bits;
            (value << shift) >> shift
        };
        Constant::Int { bits, value }
    }

    /// Type of the constant
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { bits, .. } => Type::Int(*bits),
            Constant::Null(ty) | Constant::Undef(ty) => ty.clone(),
        }
    }

    /// Value read as a signed integer
    pub fn sext_value(&self) -> Option<i64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Value read as an unsigned integer of its own width
    pub fn zext_value(&self) -> Option<u64> {
        match self {
            Constant::Int { bits, value } if *bits < 64 => {
                Some((*value as u64) & ((1u64 << bits) - 1))
            }
            Constant::Int { value, .. } => Some(*value as u64),
            _ => None,
        }
    }
}

/// Operand of an instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Result of an instruction in the same function
    Inst(InstId),
    /// Function parameter by position
    Arg(u32),
    /// Constant
    Const(Constant),
    /// Address of a global symbol
    Global(GlobalId),
    /// Address of a function
    Function(FuncId),
}

impl Value {
    /// Integer constant operand
    pub fn int(bits: u32, value: i64) -> Self {
        Value::Const(Constant::int(bits, value))
    }

    /// `i32` constant operand
    pub fn i32(value: i64) -> Self {
        Self::int(32, value)
    }

    /// `i64` constant operand
    pub fn i64(value: i64) -> Self {
        Self::int(64, value)
    }

    /// Producing instruction, if any
    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    /// Constant payload, if any
    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}
