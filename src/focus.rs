//! Reading focus tracking
//!
//! Maintains the single authoritative "what is the reader looking at" value,
//! fed by navigation events from the viewer integration layer.

use log::debug;

use crate::viewer::ViewerEvent;

/// The page (and optional text selection) the reader is currently viewing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Focus {
    /// Current page (0-indexed)
    pub page: usize,
    /// Text the reader has selected on that page, if any
    pub selection: Option<String>,
}

impl Focus {
    #[must_use]
    pub fn page(page: usize) -> Self {
        Self {
            page,
            selection: None,
        }
    }

    #[must_use]
    pub fn with_selection(page: usize, selection: impl Into<String>) -> Self {
        Self {
            page,
            selection: Some(selection.into()),
        }
    }
}

/// Observable tracker state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ViewerState {
    #[default]
    Idle,
    Focused(Focus),
}

/// Folds viewer events into the current [`Focus`].
///
/// Each event fully replaces the prior focus; there is no merging. Every
/// transition into `Focused` produces exactly one notification, including
/// duplicate events from the viewer (the subscriber may treat those as
/// idempotent, but they are never dropped here).
#[derive(Debug, Default)]
pub struct FocusTracker {
    state: ViewerState,
    page_count: usize,
}

impl FocusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a navigation event. Returns the new focus to notify
    /// subscribers with, or `None` when the tracker went idle.
    pub fn apply(&mut self, event: ViewerEvent) -> Option<Focus> {
        match event {
            ViewerEvent::DocumentOpened { page_count } => {
                debug!("viewer opened document with {page_count} pages");
                self.page_count = page_count;
                let focus = Focus::page(0);
                self.state = ViewerState::Focused(focus.clone());
                Some(focus)
            }

            ViewerEvent::Navigated { page, selection } => {
                let clamped = if self.page_count > 0 {
                    page.min(self.page_count - 1)
                } else {
                    page
                };
                let focus = Focus {
                    page: clamped,
                    selection,
                };
                self.state = ViewerState::Focused(focus.clone());
                Some(focus)
            }

            ViewerEvent::DocumentClosed => {
                debug!("viewer closed document");
                self.state = ViewerState::Idle;
                self.page_count = 0;
                None
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    /// Current focus, if a document is open
    #[must_use]
    pub fn focus(&self) -> Option<&Focus> {
        match &self.state {
            ViewerState::Idle => None,
            ViewerState::Focused(focus) => Some(focus),
        }
    }
}
