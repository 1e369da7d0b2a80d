use crate::DesktopIndex;
use serde::{Deserialize, Serialize};

/// Token replaced with the desktop's index when rendering a label.
pub const INDEX_PLACEHOLDER: &str = "%n";

/// Label template used when none is configured.
pub const DEFAULT_LABEL_TEMPLATE: &str = "Desktop %n";

/// A desktop naming template such as `"Desktop %n"`.
///
/// Only the first placeholder is substituted. A template without a placeholder
/// renders to itself for every desktop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTemplate(String);

impl LabelTemplate {
    /// Create a template from a string.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the template contains the index placeholder.
    pub fn has_placeholder(&self) -> bool {
        self.0.contains(INDEX_PLACEHOLDER)
    }

    /// Render the label for the desktop at `index`.
    pub fn render(&self, index: DesktopIndex) -> String {
        self.0.replacen(INDEX_PLACEHOLDER, &index.to_string(), 1)
    }
}

impl Default for LabelTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_TEMPLATE)
    }
}

impl From<&str> for LabelTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for LabelTemplate {
    fn from(template: String) -> Self {
        Self(template)
    }
}
