use crate::foundation::error::{DetectError, DetectResult};
use std::path::Path;

/// Class-id to name lookup, one label per line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Parse newline-separated labels. Blank lines are skipped and surrounding whitespace is
    /// trimmed; line order defines the class id.
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    /// Read a label file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> DetectResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DetectError::config(format!("read labels '{}': {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    /// Name for a class id, if known.
    pub fn name(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Return `true` when no labels are loaded.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
