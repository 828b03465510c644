//! Bridge types for the embedded PDF viewer
//!
//! The viewer itself (a browser-hosted component) is an external
//! collaborator. The core only consumes its navigation events and can ask
//! it to scroll; rendering never passes through here.

/// Navigation events emitted by the viewer integration layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerEvent {
    /// A document finished loading in the viewer
    DocumentOpened { page_count: usize },

    /// The reader moved to a page, possibly with a text selection
    Navigated {
        page: usize,
        selection: Option<String>,
    },

    /// The document was closed
    DocumentClosed,
}

/// Commands the core may send back to the viewer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerCommand {
    /// Scroll the viewer to a page (0-indexed)
    ScrollToPage(usize),
}
