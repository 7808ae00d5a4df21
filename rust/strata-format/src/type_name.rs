//! Declared field type names and their structural interpretations.

use serde::{Deserialize, Serialize};

use crate::primitive::PrimitiveType;

/// The type name a leaf declares in the input schema, kept verbatim.
///
/// A type name is interpreted lazily: the same text may be read as a scalar
/// (`Int_t`), a fixed-size array (`float[4]`) or a nested sequence
/// (`vector<vector<double>>`). Which interpretation applies is decided by the
/// conversion strategy that claims it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

/// A fixed-size array of primitive elements, such as `Int_t[3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayType {
    pub element: PrimitiveType,
    pub len: usize,
}

/// A (possibly nested) variable-length sequence of primitive elements.
///
/// `depth` is the number of `vector<...>` levels wrapped around the element type:
/// `vector<float>` has depth 1, `vector<vector<int>>` has depth 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceType {
    pub element: PrimitiveType,
    pub depth: usize,
}

impl TypeName {
    const VECTOR_PREFIXES: [&'static str; 2] = ["std::vector<", "vector<"];

    pub fn new(name: impl Into<String>) -> TypeName {
        TypeName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the name as a primitive scalar type.
    pub fn scalar(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_type_name(self.0.trim())
    }

    /// Interprets the name as `element[len]`, with a non-zero `len`.
    pub fn fixed_array(&self) -> Option<ArrayType> {
        let name = self.0.trim();
        let inner = name.strip_suffix(']')?;
        let open = inner.rfind('[')?;
        let len = inner[open + 1..].trim().parse::<usize>().ok()?;
        if len == 0 {
            return None;
        }
        let element = PrimitiveType::from_type_name(inner[..open].trim())?;
        Some(ArrayType { element, len })
    }

    /// Interprets the name as one or more nested `vector<...>` levels around a
    /// primitive element type.
    pub fn sequence(&self) -> Option<SequenceType> {
        let mut name = self.0.trim();
        let mut depth = 0;
        while let Some(inner) = Self::strip_vector(name) {
            depth += 1;
            name = inner;
        }
        if depth == 0 {
            return None;
        }
        let element = PrimitiveType::from_type_name(name)?;
        Some(SequenceType { element, depth })
    }

    fn strip_vector(name: &str) -> Option<&str> {
        let body = Self::VECTOR_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))?;
        let body = body.strip_suffix('>')?;
        Some(body.trim())
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        TypeName::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        TypeName(name)
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
