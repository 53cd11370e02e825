//! IR type definitions and the data layout used to size them

use std::fmt;

/// First-class and aggregate types of the IR.
///
/// Pointers are typed, so the size of the pointee is always known to the
/// memory-access passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value (return type of procedures, result of stores)
    Void,
    /// Integer of the given bit width (`i1`, `i8`, `i32`, ...)
    Int(u32),
    /// Pointer to a value of the pointee type
    Ptr(Box<Type>),
    /// Fixed-length array
    Array {
        /// Element type
        elem: Box<Type>,
        /// Number of elements
        len: u64,
    },
    /// Function signature (only ever appears as a pointee)
    Func {
        /// Return type
        ret: Box<Type>,
        /// Parameter types
        params: Vec<Type>,
    },
}

impl Type {
    /// 1-bit integer (booleans, comparison results)
    pub fn i1() -> Self {
        Type::Int(1)
    }

    /// 8-bit integer
    pub fn i8() -> Self {
        Type::Int(8)
    }

    /// 32-bit integer
    pub fn i32() -> Self {
        Type::Int(32)
    }

    /// 64-bit integer
    pub fn i64() -> Self {
        Type::Int(64)
    }

    /// Pointer to `self`
    pub fn ptr_to(self) -> Self {
        Type::Ptr(Box::new(self))
    }

    /// Returns true for pointer types
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// Returns true for integer types of exactly `bits` width
    pub fn is_int(&self, bits: u32) -> bool {
        matches!(self, Type::Int(b) if *b == bits)
    }

    /// Returns the bit width of an integer type
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Returns the pointee of a pointer type
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(pointee) => Some(pointee),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Ptr(pointee) => write!(f, "{}*", pointee),
            Type::Array { elem, len } => write!(f, "[{} x {}]", len, elem),
            Type::Func { ret, params } => {
                write!(f, "{} (", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Target data layout: answers size queries for types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    /// Size of a native pointer in bytes (4 or 8)
    pub pointer_bytes: u64,
}

impl DataLayout {
    /// Layout for a 64-bit target
    pub fn lp64() -> Self {
        Self { pointer_bytes: 8 }
    }

    /// Layout for a 32-bit target
    pub fn ilp32() -> Self {
        Self { pointer_bytes: 4 }
    }

    /// Number of bytes written by a store of `ty`.
    ///
    /// Integers round up to whole bytes. Unsized types (`void`, functions)
    /// occupy zero bytes.
    pub fn store_size(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void | Type::Func { .. } => 0,
            Type::Int(bits) => u64::from(*bits).div_ceil(8),
            Type::Ptr(_) => self.pointer_bytes,
            Type::Array { elem, len } => self.store_size(elem).saturating_mul(*len),
        }
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::lp64()
    }
}
