//! Document-level style resources.
//!
//! Widget stylesheets are injected as global resources tagged by widget
//! identifier. The namespace is singular and last-write-wins: a tag either
//! exists or it does not, and injection never duplicates one.

use tracing::debug;

/// A stylesheet injected on behalf of one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleResource {
    /// Widget identifier the resource is tagged with.
    pub tag: String,
    /// Stylesheet text.
    pub text: String,
    /// Distinguishes successive injections under the same tag.
    pub generation: u64,
}

/// The global style-resource namespace of a composed document.
#[derive(Debug, Clone, Default)]
pub struct DocumentStyles {
    /// Untagged document-level stylesheets.
    document: Vec<String>,
    /// Tagged resources in injection order.
    tagged: Vec<StyleResource>,
    next_generation: u64,
}

impl DocumentStyles {
    /// Create a namespace holding the given document-level stylesheets.
    pub fn new(document: Vec<String>) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// Inject a stylesheet tagged by `tag`.
    ///
    /// Does nothing if a resource with that tag already exists. Returns
    /// `true` if the resource was added.
    pub fn inject(&mut self, tag: &str, text: &str) -> bool {
        if self.contains(tag) {
            debug!(tag, "Style resource already present");
            return false;
        }
        self.next_generation += 1;
        self.tagged.push(StyleResource {
            tag: tag.to_string(),
            text: text.to_string(),
            generation: self.next_generation,
        });
        debug!(tag, generation = self.next_generation, "Style resource injected");
        true
    }

    /// Remove the resource tagged by `tag`. Returns `true` if one existed.
    pub fn revoke(&mut self, tag: &str) -> bool {
        let before = self.tagged.len();
        self.tagged.retain(|resource| resource.tag != tag);
        let removed = self.tagged.len() != before;
        if removed {
            debug!(tag, "Style resource revoked");
        }
        removed
    }

    /// Returns `true` if a resource with this tag exists.
    pub fn contains(&self, tag: &str) -> bool {
        self.tagged.iter().any(|resource| resource.tag == tag)
    }

    /// The resource tagged by `tag`.
    pub fn get(&self, tag: &str) -> Option<&StyleResource> {
        self.tagged.iter().find(|resource| resource.tag == tag)
    }

    /// Tagged resources in injection order.
    pub fn tagged(&self) -> &[StyleResource] {
        &self.tagged
    }

    /// Untagged document-level stylesheets.
    pub fn document(&self) -> &[String] {
        &self.document
    }
}
