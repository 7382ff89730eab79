use crate::metadata::{read_metadata, MetadataFilter};
use std::fmt;
use std::sync::Arc;
use thumbnail_cache::SourceFile;

/// A caller-supplied test on a snapshot
pub type Predicate = Arc<dyn Fn(&SourceFile) -> bool + Send + Sync>;

/// Text search plus any number of predicates; an item must pass all of them.
///
/// Text search matches the file name case-insensitively, or any sidecar tag.
#[derive(Clone, Default)]
pub struct Filter {
    search: Option<String>,
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank text clears the search
    pub fn with_search(mut self, text: &str) -> Self {
        let text = text.trim();
        self.search = (!text.is_empty()).then(|| text.to_lowercase());
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_metadata(self, filter: MetadataFilter) -> Self {
        self.with_predicate(filter.into_predicate())
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.predicates.is_empty()
    }

    pub fn matches(&self, source: &SourceFile) -> bool {
        if let Some(needle) = &self.search {
            let in_name = source.file_name().to_lowercase().contains(needle.as_str());
            if !in_name && !read_metadata(&source.path).has_tag_containing(needle) {
                return false;
            }
        }
        self.predicates.iter().all(|predicate| predicate(source))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("search", &self.search)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
