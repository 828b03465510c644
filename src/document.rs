//! Document loading and context extraction
//!
//! A [`LoadedDocument`] holds the plain text and heading hints of every page,
//! parsed once at startup and immutable afterwards. [`extract`] is a pure
//! read over that store: it gathers the text around the reader's focus into
//! a [`ContextSnippet`] bounded by a character budget.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::focus::Focus;

/// Marker line that precedes reader-selected text in a snippet, so the
/// prompt assembler can distinguish it from surrounding context.
pub const SELECTION_MARKER: &str = "[reader selection]";

/// Text and structural hints of a single page
#[derive(Clone, Debug, Default)]
pub struct PageContent {
    pub text: String,
    /// Lines judged to be headings (by font size relative to body text)
    pub headings: Vec<String>,
}

impl PageContent {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            headings: Vec::new(),
        }
    }
}

/// A parsed document: page count, per-page text, per-page heading hints.
/// Read-only after construction.
pub struct LoadedDocument {
    title: Option<String>,
    pages: Vec<PageContent>,
}

impl LoadedDocument {
    #[must_use]
    pub fn from_pages(pages: Vec<PageContent>) -> Self {
        Self { title: None, pages }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&PageContent> {
        self.pages.get(index)
    }

    /// Render one page for inclusion in a snippet: a page header, heading
    /// hints when present, then the page text.
    fn render_page(&self, index: usize) -> String {
        let page = &self.pages[index];
        let mut out = format!("=== Page {} ===\n", index + 1);
        if !page.headings.is_empty() {
            out.push_str("Headings: ");
            out.push_str(&page.headings.join("; "));
            out.push('\n');
        }
        out.push_str(page.text.trim_end());
        out
    }
}

/// Context extracted around a focus, ready for prompt assembly
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSnippet {
    /// Source pages the text was drawn from (0-indexed, inclusive).
    /// `None` when no page contributed, e.g. a selection consumed the
    /// whole budget.
    pub pages: Option<RangeInclusive<usize>>,
    pub text: String,
}

impl ContextSnippet {
    /// Snippet length in characters
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Contract violations during extraction. These are programming errors of
/// the caller, fatal to the current request and never retried.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document has no pages")]
    EmptyDocument,

    #[error("page {page} out of range, document has {page_count} pages")]
    PageOutOfRange { page: usize, page_count: usize },

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),
}

/// Extract up to `max_chars` characters of context around `focus`.
///
/// The focused page comes first; the window then grows to the previous and
/// next pages, alternating outward, until the budget runs out or the
/// document ends. Page text is cut at whitespace boundaries, never mid-word.
/// A text selection in the focus is prepended under [`SELECTION_MARKER`].
pub fn extract(
    doc: &LoadedDocument,
    focus: &Focus,
    max_chars: usize,
) -> Result<ContextSnippet, ExtractionError> {
    if doc.page_count() == 0 {
        return Err(ExtractionError::EmptyDocument);
    }
    if focus.page >= doc.page_count() {
        return Err(ExtractionError::PageOutOfRange {
            page: focus.page,
            page_count: doc.page_count(),
        });
    }

    let mut remaining = max_chars.max(1);
    let mut head = String::new();

    if let Some(selection) = focus.selection.as_deref() {
        let block = format!("{SELECTION_MARKER}\n{}", selection.trim());
        let taken = take_chars_at_whitespace(&block, remaining);
        remaining -= char_len(taken);
        head.push_str(taken);
    }

    let mut included: Vec<(usize, String)> = Vec::new();
    for page in expansion_order(focus.page, doc.page_count()) {
        // Two chars for the "\n\n" joining this piece to what came before
        let sep_cost = if head.is_empty() && included.is_empty() {
            0
        } else {
            2
        };
        if remaining <= sep_cost {
            break;
        }

        let rendered = doc.render_page(page);
        let taken = take_chars_at_whitespace(&rendered, remaining - sep_cost);
        if taken.is_empty() {
            break;
        }
        let truncated = taken.len() < rendered.len();
        remaining -= sep_cost + char_len(taken);
        included.push((page, taken.to_string()));
        if truncated {
            break;
        }
    }

    included.sort_by_key(|(page, _)| *page);
    let pages = match (included.first(), included.last()) {
        (Some((first, _)), Some((last, _))) => Some(*first..=*last),
        _ => None,
    };

    let mut text = head;
    for (_, piece) in &included {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(piece);
    }

    Ok(ContextSnippet { pages, text })
}

/// Visit order for the expanding context window: the focused page, then its
/// neighbours ring by ring (previous page before next within a ring).
fn expansion_order(center: usize, page_count: usize) -> Vec<usize> {
    let mut order = vec![center];
    for offset in 1..page_count {
        if let Some(prev) = center.checked_sub(offset) {
            order.push(prev);
        }
        if center + offset < page_count {
            order.push(center + offset);
        }
    }
    order
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Longest prefix of `s` within `max_chars` characters that ends at a
/// whitespace boundary. Returns all of `s` when it already fits; returns ""
/// when not even the first word fits.
pub(crate) fn take_chars_at_whitespace(s: &str, max_chars: usize) -> &str {
    let mut cut = s.len();
    for (count, (idx, _)) in s.char_indices().enumerate() {
        if count == max_chars {
            cut = idx;
            break;
        }
    }
    if cut == s.len() {
        return s;
    }

    let head = &s[..cut];
    if s[cut..].starts_with(char::is_whitespace) {
        // The budget happens to end exactly between words
        return head.trim_end();
    }
    match head.rfind(char::is_whitespace) {
        Some(ws) => head[..ws].trim_end(),
        None => "",
    }
}

#[cfg(feature = "pdf")]
pub use pdf_source::open_document;

#[cfg(feature = "pdf")]
mod pdf_source {
    //! mupdf-backed document loading

    use std::path::Path;

    use mupdf::text_page::TextBlockType;
    use mupdf::{Document, TextPageFlags};

    use super::{ExtractionError, LoadedDocument, PageContent};

    // A line counts as a heading when its largest glyph is this much bigger
    // than the page's median glyph size
    const HEADING_SIZE_FACTOR: f32 = 1.5;

    /// Parse a PDF into an immutable page store
    pub fn open_document(path: &Path) -> Result<LoadedDocument, ExtractionError> {
        let doc = Document::open(path.to_string_lossy().as_ref())?;
        let page_count = doc.page_count()? as usize;

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let page = doc.load_page(index as i32)?;
            pages.push(read_page(&page)?);
        }

        let title = doc
            .metadata(mupdf::MetadataName::Title)
            .ok()
            .filter(|t| !t.is_empty());

        let mut loaded = LoadedDocument::from_pages(pages);
        if let Some(title) = title {
            loaded = loaded.with_title(title);
        }
        Ok(loaded)
    }

    fn read_page(page: &mupdf::Page) -> Result<PageContent, ExtractionError> {
        let text_page = page.to_text_page(TextPageFlags::COLLECT_STYLES)?;

        // (line text, largest glyph size on the line)
        let mut lines: Vec<(String, f32)> = Vec::new();
        let mut sizes: Vec<f32> = Vec::new();

        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let mut buf = String::new();
                let mut max_size: f32 = 0.0;
                for ch in line.chars() {
                    if let Some(c) = ch.char() {
                        buf.push(c);
                    }
                    let size = ch.size();
                    if size.is_finite() && size > 0.0 {
                        sizes.push(size);
                        max_size = max_size.max(size);
                    }
                }
                let trimmed = buf.trim();
                if !trimmed.is_empty() {
                    lines.push((trimmed.to_string(), max_size));
                }
            }
        }

        let heading_threshold = median(&mut sizes).map(|m| m * HEADING_SIZE_FACTOR);

        let mut text = String::new();
        let mut headings = Vec::new();
        for (line, max_size) in lines {
            if let Some(threshold) = heading_threshold {
                if max_size >= threshold {
                    headings.push(line.clone());
                }
            }
            text.push_str(&line);
            text.push('\n');
        }

        Ok(PageContent { text, headings })
    }

    fn median(values: &mut [f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(values[values.len() / 2])
    }
}
