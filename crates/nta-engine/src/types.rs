//! Element type tags shared by outputs, inputs and arrays.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of an [`crate::Array`], [`crate::Output`] or [`crate::Input`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicType {
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Real32,
    Real64,
}

impl BasicType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Real32 => 4,
            Self::Int64 | Self::UInt64 | Self::Real64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Real32 => "Real32",
            Self::Real64 => "Real64",
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust scalar types that can live in an [`crate::Array`].
pub trait Element: bytemuck::Pod + Default + Send + Sync + 'static {
    const TYPE: BasicType;
}

macro_rules! element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl Element for $ty {
            const TYPE: BasicType = BasicType::$tag;
        })*
    };
}

element!(
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Real32,
    f64 => Real64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_rust_types() {
        assert_eq!(BasicType::Byte.size(), std::mem::size_of::<u8>());
        assert_eq!(BasicType::Int16.size(), std::mem::size_of::<i16>());
        assert_eq!(BasicType::UInt32.size(), std::mem::size_of::<u32>());
        assert_eq!(BasicType::Real32.size(), std::mem::size_of::<f32>());
        assert_eq!(BasicType::Real64.size(), std::mem::size_of::<f64>());
        assert_eq!(<i64 as Element>::TYPE.size(), 8);
    }

    #[test]
    fn display_uses_type_name() {
        assert_eq!(BasicType::Real64.to_string(), "Real64");
        assert_eq!(<u16 as Element>::TYPE, BasicType::UInt16);
    }
}
