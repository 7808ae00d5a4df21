use serde::{Deserialize, Serialize};

/// Fixed-width primitive types that can occupy a slot in a record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl PrimitiveType {
    /// Size of a single value in bytes.
    pub fn size(&self) -> usize {
        match self {
            PrimitiveType::Bool | PrimitiveType::Int8 | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Float64 => 8,
        }
    }

    /// Natural alignment of the type. Equal to its size for every primitive.
    pub fn align(&self) -> usize {
        self.size()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8 | PrimitiveType::Int16 | PrimitiveType::Int32 | PrimitiveType::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }

    /// Canonical lowercase name, as used in layout reports and exported type trees.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
        }
    }

    /// Resolves a declared scalar type name.
    ///
    /// Accepts the canonical names, their short Rust-like aliases (`i32`, `f64`, ...),
    /// the C spellings (`int`, `unsigned short`, ...) and the `_t` spellings used by
    /// self-describing physics formats (`Int_t`, `Double_t`, ...).
    pub fn from_type_name(name: &str) -> Option<PrimitiveType> {
        let ty = match name {
            "bool" | "Bool_t" => PrimitiveType::Bool,
            "int8" | "i8" | "char" | "signed char" | "Char_t" => PrimitiveType::Int8,
            "uint8" | "u8" | "unsigned char" | "UChar_t" => PrimitiveType::UInt8,
            "int16" | "i16" | "short" | "Short_t" => PrimitiveType::Int16,
            "uint16" | "u16" | "unsigned short" | "UShort_t" => PrimitiveType::UInt16,
            "int32" | "i32" | "int" | "Int_t" => PrimitiveType::Int32,
            "uint32" | "u32" | "unsigned int" | "unsigned" | "UInt_t" => PrimitiveType::UInt32,
            "int64" | "i64" | "long" | "Long_t" | "long long" | "Long64_t" => {
                PrimitiveType::Int64
            }
            "uint64" | "u64" | "unsigned long" | "ULong_t" | "unsigned long long"
            | "ULong64_t" => PrimitiveType::UInt64,
            "float32" | "f32" | "float" | "Float_t" => PrimitiveType::Float32,
            "float64" | "f64" | "double" | "Double_t" => PrimitiveType::Float64,
            _ => return None,
        };
        Some(ty)
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
