// Scalar and vector types carried by IR expressions. A Type is a (code, bits, lanes) triple in
// the usual pipeline-compiler sense: signed and unsigned integers, IEEE floats and opaque
// handles (pointer-sized values such as buffer descriptors or runtime state). The byte width
// of a type is what the call-site synthesizer reports as a scalar argument's size, and the
// textual names produced by Display are the ones the text parser accepts.

use std::fmt;

/// Kind of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Int,
    UInt,
    Float,
    /// Opaque pointer-sized value.
    Handle,
}

/// An IR type: `lanes` elements of `bits` bits each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub code: TypeCode,
    pub bits: u8,
    pub lanes: u16,
}

impl Type {
    pub const fn new(code: TypeCode, bits: u8, lanes: u16) -> Self {
        Self { code, bits, lanes }
    }

    pub const fn int(bits: u8) -> Self {
        Self::new(TypeCode::Int, bits, 1)
    }

    pub const fn uint(bits: u8) -> Self {
        Self::new(TypeCode::UInt, bits, 1)
    }

    pub const fn float(bits: u8) -> Self {
        Self::new(TypeCode::Float, bits, 1)
    }

    pub const fn bool() -> Self {
        Self::uint(1)
    }

    /// Handles are 64 bits regardless of the host they end up on.
    pub const fn handle() -> Self {
        Self::new(TypeCode::Handle, 64, 1)
    }

    pub const fn with_lanes(self, lanes: u16) -> Self {
        Self { lanes, ..self }
    }

    pub fn is_int(&self) -> bool {
        self.code == TypeCode::Int
    }

    /// Storage size in bytes, rounding sub-byte element widths up.
    pub fn bytes(&self) -> usize {
        (self.bits as usize).div_ceil(8) * self.lanes as usize
    }

    /// Parse a scalar type name as printed by `Display`.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "bool" => Self::bool(),
            "handle" => Self::handle(),
            "int8" => Self::int(8),
            "int16" => Self::int(16),
            "int32" => Self::int(32),
            "int64" => Self::int(64),
            "uint8" => Self::uint(8),
            "uint16" => Self::uint(16),
            "uint32" => Self::uint(32),
            "uint64" => Self::uint(64),
            "float16" => Self::float(16),
            "float32" => Self::float(32),
            "float64" => Self::float(64),
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            TypeCode::Handle => write!(f, "handle")?,
            TypeCode::UInt if self.bits == 1 => write!(f, "bool")?,
            TypeCode::Int => write!(f, "int{}", self.bits)?,
            TypeCode::UInt => write!(f, "uint{}", self.bits)?,
            TypeCode::Float => write!(f, "float{}", self.bits)?,
        }
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_widths() {
        assert_eq!(Type::int(32).bytes(), 4);
        assert_eq!(Type::uint(8).bytes(), 1);
        assert_eq!(Type::bool().bytes(), 1);
        assert_eq!(Type::handle().bytes(), 8);
        assert_eq!(Type::float(32).with_lanes(4).bytes(), 16);
    }

    #[test]
    fn names_parse_back() {
        for ty in [Type::int(16), Type::uint(64), Type::float(32), Type::bool(), Type::handle()] {
            assert_eq!(Type::from_name(&ty.to_string()), Some(ty));
        }
        assert_eq!(Type::from_name("int7"), None);
    }
}
