//! Renderer-interaction pipeline building blocks.
//!
//! A [`RenderBackend`] answers a small set of questions about a live page
//! ("how many iframes carry this title?", "what state is this element in?")
//! relative to a [`FrameContext`]. Everything above it (frame entry, readiness
//! waits, scrolling and clicking) is written once against the trait, so the
//! same code drives Chrome in production and an in-memory page in tests.

use std::fmt;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use crate::{Error, Result};

mod interact;
mod wait;

#[cfg(test)]
pub(crate) mod fake;

pub use interact::{click, locate, scroll_into_view};
pub use wait::{enter_frame, wait_until};

/// Poll interval used when a backend does not pick its own
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Readiness predicates an element can be waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Rendered with a non-zero box
    Visible,
    /// Visible, enabled and not covered by another element
    Clickable,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Visible => f.write_str("visible"),
            Readiness::Clickable => f.write_str("clickable"),
        }
    }
}

/// Facts a backend reports about one element
///
/// `obstructed` is only meaningful when `displayed` is true; backends do not
/// hit-test hidden elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElementState {
    pub present: bool,
    pub displayed: bool,
    pub enabled: bool,
    pub obstructed: bool,
}

impl ElementState {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.present && self.displayed
    }

    pub fn satisfies(&self, readiness: Readiness) -> bool {
        match readiness {
            Readiness::Visible => self.is_visible(),
            // Visibility first: obstruction of a hidden element is undefined.
            Readiness::Clickable => self.is_visible() && self.enabled && !self.obstructed,
        }
    }
}

/// Path of iframe titles from the top document to the current frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameContext {
    titles: Vec<String>,
}

impl FrameContext {
    pub fn top() -> Self {
        Self::default()
    }

    pub fn is_top(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn child(&self, title: &str) -> Self {
        let mut titles = self.titles.clone();
        titles.push(title.to_string());
        Self { titles }
    }
}

impl fmt::Display for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_top() {
            return f.write_str("top document");
        }
        f.write_str(&self.titles.join(" > "))
    }
}

/// Element-query capability over a live rendering session
pub trait RenderBackend {
    /// Load `url` in the session and wait for navigation to finish
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Number of iframes directly inside `frame` whose title attribute is `title`
    fn count_frames(&self, frame: &FrameContext, title: &str) -> Result<usize>;

    fn element_state(&self, frame: &FrameContext, element_id: &str) -> Result<ElementState>;

    /// Scroll the element into view. `Ok(false)` if it is no longer in the DOM.
    fn scroll_into_view(&self, frame: &FrameContext, element_id: &str) -> Result<bool>;

    /// Click the element. `Ok(false)` if it is no longer in the DOM.
    fn click(&self, frame: &FrameContext, element_id: &str) -> Result<bool>;

    /// Serialized DOM of `frame`
    fn markup(&self, frame: &FrameContext) -> Result<String>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Tear the session down. Only called once per session.
    fn shutdown(&mut self) -> Result<()>;
}

/// A live page owned by one pipeline run
///
/// Closing is idempotent and also happens on drop, so the session is
/// released on every exit path.
pub struct RenderedDocument<B: RenderBackend> {
    backend: Option<B>,
    frame: FrameContext,
    generation: u64,
}

/// Reference to an element located in a specific frame of a specific page load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    element_id: String,
    frame: FrameContext,
    generation: u64,
}

impl ElementHandle {
    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn frame(&self) -> &FrameContext {
        &self.frame
    }
}

impl<B: RenderBackend> RenderedDocument<B> {
    /// Take ownership of `backend` and load `url` in it.
    pub fn open(backend: B, url: &str) -> Result<Self> {
        let mut doc = Self {
            backend: Some(backend),
            frame: FrameContext::top(),
            generation: 0,
        };
        // On failure `doc` is dropped here, which closes the session.
        doc.navigate(url)?;
        Ok(doc)
    }

    pub fn navigate(&mut self, url: &str) -> Result<()> {
        info!("navigating to {}", url);
        self.backend_mut()?.navigate(url)?;
        self.frame = FrameContext::top();
        self.generation += 1;
        Ok(())
    }

    pub fn frame(&self) -> &FrameContext {
        &self.frame
    }

    /// Leave any entered frames. Invalidates outstanding handles.
    pub fn exit_to_top(&mut self) {
        self.frame = FrameContext::top();
        self.generation += 1;
    }

    /// Markup of the current frame
    pub fn current_markup(&self) -> Result<String> {
        self.backend()?.markup(&self.frame)
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Shut the session down. Safe to call any number of times; shutdown
    /// errors are logged, not returned.
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            match backend.shutdown() {
                Ok(()) => info!("rendering session closed"),
                Err(e) => warn!("error while closing rendering session: {}", e),
            }
        }
    }

    pub(crate) fn backend(&self) -> Result<&B> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::InteractionFailure("rendering session is closed".into()))
    }

    fn backend_mut(&mut self) -> Result<&mut B> {
        self.backend
            .as_mut()
            .ok_or_else(|| Error::InteractionFailure("rendering session is closed".into()))
    }

    pub(crate) fn enter_child_frame(&mut self, title: &str) {
        self.frame = self.frame.child(title);
        self.generation += 1;
    }

    pub(crate) fn handle_for(&self, element_id: &str) -> ElementHandle {
        ElementHandle {
            element_id: element_id.to_string(),
            frame: self.frame.clone(),
            generation: self.generation,
        }
    }

    /// Backend access for `handle`, refused if the handle's frame context is gone.
    pub(crate) fn resolve(&self, handle: &ElementHandle) -> Result<&B> {
        if handle.generation != self.generation || handle.frame != self.frame {
            return Err(Error::InteractionFailure(format!(
                "handle for '{}' in {} is stale (current context: {})",
                handle.element_id, handle.frame, self.frame
            )));
        }
        self.backend()
    }
}

impl<B: RenderBackend> Drop for RenderedDocument<B> {
    fn drop(&mut self) {
        self.close();
    }
}
