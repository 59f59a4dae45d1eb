use ego_tree::iter::Edge;
use scraper::node::Node;
use scraper::Html;

const DEFAULT_SKIPPED_TAGS: &[&str] = &["script", "style", "head", "noscript"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("payload is not markup (contains NUL bytes)")]
    NotMarkup,
}

pub trait Extractor: Send + Sync {
    fn extract_visible_text(&self, markup: &str) -> Result<String, ExtractionError>;
}

/// Reduces an HTML document to its visible text.
///
/// Subtrees rooted at a skipped tag are dropped entirely; the remaining text
/// nodes are joined with newlines so words from adjacent blocks never fuse.
#[derive(Debug, Clone)]
pub struct VisibleTextExtractor {
    skipped_tags: Vec<String>,
}

impl Default for VisibleTextExtractor {
    fn default() -> Self {
        Self::with_skipped_tags(DEFAULT_SKIPPED_TAGS.iter().copied())
    }
}

impl VisibleTextExtractor {
    pub fn with_skipped_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skipped_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    fn is_skipped(&self, tag: &str) -> bool {
        self.skipped_tags
            .iter()
            .any(|skipped| skipped.eq_ignore_ascii_case(tag))
    }

    fn is_skipped_node(&self, node: &Node) -> bool {
        match node {
            Node::Element(element) => self.is_skipped(element.name()),
            Node::Comment(_) | Node::ProcessingInstruction(_) => true,
            _ => false,
        }
    }

    /// Walks the tree with open/close edges so nesting depth never grows the stack.
    fn collect<'a>(&self, document: &'a Html) -> Vec<&'a str> {
        let mut out = Vec::new();
        // Open edges seen inside a skipped subtree that are not yet closed.
        let mut skip_depth = 0usize;
        for edge in document.tree.root().traverse() {
            match edge {
                Edge::Open(node) => {
                    if skip_depth > 0 || self.is_skipped_node(node.value()) {
                        skip_depth += 1;
                    } else if let Node::Text(text) = node.value() {
                        out.push(&**text);
                    }
                }
                Edge::Close(_) => skip_depth = skip_depth.saturating_sub(1),
            }
        }
        out
    }
}

impl Extractor for VisibleTextExtractor {
    fn extract_visible_text(&self, markup: &str) -> Result<String, ExtractionError> {
        if markup.contains('\0') {
            return Err(ExtractionError::NotMarkup);
        }
        let document = Html::parse_document(markup);
        Ok(self.collect(&document).join("\n"))
    }
}
