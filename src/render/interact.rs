//! Locating elements and acting on them.

use std::time::Duration;

use log::info;

use super::{enter_frame, ElementHandle, RenderBackend, RenderedDocument};
use crate::{Error, Result};

/// Resolve `element_id`, first entering the frame titled `frame_title` (if
/// any) relative to the current frame. `timeout` bounds the frame wait.
pub fn locate<B: RenderBackend>(
    doc: &mut RenderedDocument<B>,
    frame_title: Option<&str>,
    element_id: &str,
    timeout: Duration,
) -> Result<ElementHandle> {
    if let Some(title) = frame_title {
        enter_frame(doc, title, timeout)?;
    }

    let state = doc.backend()?.element_state(doc.frame(), element_id)?;
    if !state.present {
        return Err(Error::ElementNotFound(element_id.to_string()));
    }
    Ok(doc.handle_for(element_id))
}

/// Scroll the element into view. Returns after the in-page scroll completed.
pub fn scroll_into_view<B: RenderBackend>(
    doc: &RenderedDocument<B>,
    handle: &ElementHandle,
) -> Result<()> {
    let backend = doc.resolve(handle)?;
    if !backend.scroll_into_view(handle.frame(), handle.element_id())? {
        return Err(detached(handle));
    }
    Ok(())
}

pub fn click<B: RenderBackend>(doc: &RenderedDocument<B>, handle: &ElementHandle) -> Result<()> {
    let backend = doc.resolve(handle)?;
    info!("clicking '{}' in {}", handle.element_id(), handle.frame());
    if !backend.click(handle.frame(), handle.element_id())? {
        return Err(detached(handle));
    }
    Ok(())
}

fn detached(handle: &ElementHandle) -> Error {
    Error::InteractionFailure(format!(
        "element '{}' is no longer attached to the document",
        handle.element_id()
    ))
}
