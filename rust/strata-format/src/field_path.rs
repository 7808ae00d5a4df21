use serde::{Serialize, Serializer};

/// Dotted path of a field, relative to the root of a record.
///
/// The empty path denotes the record root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub const SEPARATOR: char = '.';

    /// The path of the record root.
    pub fn root() -> FieldPath {
        FieldPath(String::new())
    }

    /// Builds a path from its components, e.g. `["c", "leaf_1"]` -> `c.leaf_1`.
    pub fn from_components<I, S>(components: I) -> FieldPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        components
            .into_iter()
            .fold(FieldPath::root(), |path, name| path.child(name.as_ref()))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the path of the named child of this path.
    pub fn child(&self, name: &str) -> FieldPath {
        if self.is_root() {
            FieldPath(name.to_string())
        } else {
            FieldPath(format!("{}{}{}", self.0, Self::SEPARATOR, name))
        }
    }

    /// Returns the path of the enclosing group, or `None` for the root.
    pub fn parent(&self) -> Option<FieldPath> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind(Self::SEPARATOR) {
            Some(pos) => FieldPath(self.0[..pos].to_string()),
            None => FieldPath::root(),
        })
    }

    /// Last component of the path.
    pub fn name(&self) -> &str {
        match self.0.rfind(Self::SEPARATOR) {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches(Self::SEPARATOR).count() + 1
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath(path.to_string())
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
