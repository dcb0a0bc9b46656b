use core::fmt::Display;

/// Data type of tensor elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    /// 16 bit float
    F16,
    /// 32 bit float
    F32,
    /// 8 bit signed integer
    I8,
    /// 8 bit unsigned integer
    U8,
    /// 32 bit signed integer
    I32,
    /// 64 bit signed integer
    I64,
}

impl DType {
    /// All data types, in bit index order
    pub const ALL: [DType; 6] = [DType::F16, DType::F32, DType::I8, DType::U8, DType::I32, DType::I64];

    /// Size of one element in bytes
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::I8 | DType::U8 => 1,
            DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    /// Is this a floating point type?
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    /// Position of this dtype inside capability dtype fields
    #[must_use]
    pub const fn bit(&self) -> u32 {
        match self {
            DType::F16 => 0,
            DType::F32 => 1,
            DType::I8 => 2,
            DType::U8 => 3,
            DType::I32 => 4,
            DType::I64 => 5,
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
        })
    }
}
