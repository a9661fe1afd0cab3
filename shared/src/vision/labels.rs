use std::path::Path;

use tracing::{debug, warn};

/// Label for class ids past the end of the list.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Sole label used when the label file cannot be loaded at all.
pub const FALLBACK_LABEL: &str = "Mangrove";

/// Ordered class names, indexed by model class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn fallback() -> Self {
        Self::new(vec![FALLBACK_LABEL.to_string()])
    }

    /// One label per line; blank lines are skipped.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// A JSON array of strings.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<String>>(text).map(Self::new)
    }

    /// Loads labels from disk, never failing.
    ///
    /// `.json` files are parsed as a JSON array, anything else line by line.
    /// Unreadable, unparsable or empty files yield [`LabelSet::fallback`].
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "label file unreadable, using fallback");
                return Self::fallback();
            }
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            match Self::from_json(&text) {
                Ok(labels) => labels,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "label file malformed, using fallback");
                    return Self::fallback();
                }
            }
        } else {
            Self::from_lines(&text)
        };

        if parsed.is_empty() {
            warn!(path = %path.display(), "label file empty, using fallback");
            return Self::fallback();
        }

        debug!(path = %path.display(), count = parsed.len(), "labels loaded");
        parsed
    }

    /// Label at `class_id`, or [`UNKNOWN_LABEL`].
    pub fn resolve(&self, class_id: usize) -> &str {
        self.labels
            .get(class_id)
            .map_or(UNKNOWN_LABEL, String::as_str)
    }

    /// Logs when the list length disagrees with the model's class count.
    pub fn check_against(&self, num_classes: usize) -> bool {
        let matches = self.labels.len() == num_classes;
        if !matches {
            warn!(
                labels = self.labels.len(),
                num_classes, "label count does not match model classes"
            );
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::fallback()
    }
}
