use crate::error::ShmemError;

/// Number of a processing element in the job (0-indexed).
pub type Pe = u32;

/// Byte offset into the symmetric heap.
///
/// The same offset names the same logical object on every PE; the PE is
/// supplied separately at each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SymAddr(u64);

impl SymAddr {
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Address `bytes` past this one.
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// Address of element `i` of a `T` array starting here.
    pub const fn index<T>(self, i: usize) -> Self {
        Self(self.0 + (i * std::mem::size_of::<T>()) as u64)
    }

    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 % align as u64 == 0
    }
}

impl std::fmt::Display for SymAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym+{:#x}", self.0)
    }
}

/// Element types supported by typed RMA, atomics and reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduction operators for `to_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReduceOp {
    Sum = 0,
    Prod = 1,
    Min = 2,
    Max = 3,
    /// Bitwise; integer types only.
    And = 4,
    /// Bitwise; integer types only.
    Or = 5,
    /// Bitwise; integer types only.
    Xor = 6,
}

impl ReduceOp {
    pub const fn is_bitwise(self) -> bool {
        matches!(self, ReduceOp::And | ReduceOp::Or | ReduceOp::Xor)
    }
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
            ReduceOp::And => f.write_str("and"),
            ReduceOp::Or => f.write_str("or"),
            ReduceOp::Xor => f.write_str("xor"),
        }
    }
}

/// Comparison operators for the `wait_until` / `test` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Cmp {
    Eq = 0,
    Ne = 1,
    Gt = 2,
    Ge = 3,
    Lt = 4,
    Le = 5,
}

impl Cmp {
    /// `observed <cmp> expected`.
    #[inline]
    pub fn holds<T: PartialOrd>(self, observed: T, expected: T) -> bool {
        match self {
            Cmp::Eq => observed == expected,
            Cmp::Ne => observed != expected,
            Cmp::Gt => observed > expected,
            Cmp::Ge => observed >= expected,
            Cmp::Lt => observed < expected,
            Cmp::Le => observed <= expected,
        }
    }
}

impl TryFrom<i32> for Cmp {
    type Error = ShmemError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Cmp::Eq),
            1 => Ok(Cmp::Ne),
            2 => Ok(Cmp::Gt),
            3 => Ok(Cmp::Ge),
            4 => Ok(Cmp::Lt),
            5 => Ok(Cmp::Le),
            other => Err(ShmemError::InvalidComparison(other)),
        }
    }
}

/// Kind of an outstanding one-sided operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Put,
    Get,
    Atomic,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Put => f.write_str("put"),
            OpKind::Get => f.write_str("get"),
            OpKind::Atomic => f.write_str("atomic"),
        }
    }
}
