//! Bounded polling waits: frame availability and element readiness.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::{Readiness, RenderBackend, RenderedDocument};
use crate::{Error, Result};

enum Poll<T> {
    Ready(T),
    Expired(Duration),
}

/// Call `probe` until it yields a value or `timeout` has elapsed.
///
/// Sleeps never exceed the remaining budget, so the overshoot past `timeout`
/// is at most one probe. [`Error::FrameUnavailable`] counts as "not yet";
/// any other error ends the wait.
fn poll<T>(
    timeout: Duration,
    interval: Duration,
    mut probe: impl FnMut() -> Result<Option<T>>,
) -> Result<Poll<T>> {
    let start = Instant::now();
    loop {
        match probe() {
            Ok(Some(value)) => return Ok(Poll::Ready(value)),
            Ok(None) => {}
            Err(Error::FrameUnavailable(frame)) => {
                debug!("frame '{}' unavailable, retrying", frame)
            }
            Err(e) => return Err(e),
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(Poll::Expired(elapsed));
        }
        thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Wait until exactly one iframe titled `title` exists in the current frame,
/// then make it the current frame.
pub fn enter_frame<B: RenderBackend>(
    doc: &mut RenderedDocument<B>,
    title: &str,
    timeout: Duration,
) -> Result<()> {
    let backend = doc.backend()?;
    let frame = doc.frame().clone();
    let mut last_count = 0;

    let outcome = poll(timeout, backend.poll_interval(), || {
        last_count = backend.count_frames(&frame, title)?;
        debug!("{} frame(s) titled '{}' in {}", last_count, title, frame);
        Ok((last_count == 1).then_some(()))
    })?;

    match outcome {
        Poll::Ready(()) => {
            info!("entering frame '{}'", title);
            doc.enter_child_frame(title);
            Ok(())
        }
        Poll::Expired(_) => Err(Error::FrameNotFound {
            title: title.to_string(),
            matches: last_count,
        }),
    }
}

/// Block until `element_id` in the current frame satisfies `readiness`.
pub fn wait_until<B: RenderBackend>(
    doc: &RenderedDocument<B>,
    element_id: &str,
    readiness: Readiness,
    timeout: Duration,
) -> Result<()> {
    let backend = doc.backend()?;
    let frame = doc.frame();

    let outcome = poll(timeout, backend.poll_interval(), || {
        let state = backend.element_state(frame, element_id)?;
        debug!("'{}' state: {:?}", element_id, state);
        Ok(state.satisfies(readiness).then_some(()))
    })?;

    match outcome {
        Poll::Ready(()) => {
            debug!("'{}' is {}", element_id, readiness);
            Ok(())
        }
        Poll::Expired(elapsed) => Err(Error::WaitTimeout {
            predicate: readiness,
            element_id: element_id.to_string(),
            elapsed,
        }),
    }
}
