//! Dotted field paths used in validation diagnostics.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// The path to a field inside a nested structure, e.g. `spec.filepath`.
pub struct FieldPath {
    fields: Vec<&'static str>,
}

impl FieldPath {
    /// Create an empty `FieldPath`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `FieldPath` that starts at `root`.
    #[must_use]
    pub fn with_root(root: &'static str) -> Self {
        Self { fields: vec![root] }
    }

    /// Return a copy of this path extended by `field`. `self` is unchanged.
    #[must_use]
    pub fn push(&self, field: &'static str) -> Self {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.extend_from_slice(&self.fields);
        fields.push(field);
        Self { fields }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            f.write_str(field)?;
        }
        Ok(())
    }
}
