use history_sync_config::CategoryMapping;
use history_sync_models::{ContentType, HistoryEntry};

/// Assigns a human category label to entries from a read-only mapping.
#[derive(Debug, Clone)]
pub struct Classifier {
    mapping: CategoryMapping,
}

impl Classifier {
    pub fn new(mapping: CategoryMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &CategoryMapping {
        &self.mapping
    }

    pub fn classify(&self, entry: &HistoryEntry) -> String {
        match entry.content_type {
            // Only videos carry a sub-category tag worth resolving
            ContentType::Video => entry
                .tag_name
                .as_deref()
                .filter(|tag| !self.mapping.duplicated_tags.iter().any(|d| d == tag))
                .and_then(|tag| self.mapping.tag_to_main.get(tag))
                .cloned()
                .unwrap_or_else(|| self.mapping.fallback_label.clone()),
            other => self
                .mapping
                .business_labels
                .get(other.as_business())
                .cloned()
                .unwrap_or_else(|| self.mapping.fallback_label.clone()),
        }
    }

    pub fn annotate(&self, entry: &mut HistoryEntry) {
        entry.category = Some(self.classify(entry));
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(CategoryMapping::default())
    }
}
