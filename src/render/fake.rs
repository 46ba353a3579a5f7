//! Scripted in-memory page for exercising the render pipeline without Chrome.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;
use std::time::Duration;

use super::{ElementState, FrameContext, RenderBackend};
use crate::{Error, Result};

pub(crate) type EventLog = Rc<RefCell<Vec<String>>>;

pub(crate) const COVERED: ElementState = ElementState {
    present: true,
    displayed: true,
    enabled: true,
    obstructed: true,
};
pub(crate) const CLICKABLE: ElementState = ElementState {
    present: true,
    displayed: true,
    enabled: true,
    obstructed: false,
};
pub(crate) const HIDDEN: ElementState = ElementState {
    present: true,
    displayed: false,
    enabled: true,
    obstructed: false,
};

/// Page script. Timelines are indexed by how many times the thing was
/// probed; the last entry repeats forever.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakePage {
    frames: HashMap<(Vec<String>, String), Vec<usize>>,
    elements: HashMap<(Vec<String>, String), Vec<ElementState>>,
    outages: HashMap<Vec<String>, Range<usize>>,
    body: String,
    revealed: String,
    detach_after_scroll: bool,
}

impl FakePage {
    pub(crate) fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Markup appended to every frame once something was clicked.
    pub(crate) fn with_revealed(mut self, revealed: &str) -> Self {
        self.revealed = revealed.to_string();
        self
    }

    pub(crate) fn with_frame(mut self, parent: &[&str], title: &str, counts: &[usize]) -> Self {
        self.frames.insert((to_path(parent), title.to_string()), counts.to_vec());
        self
    }

    pub(crate) fn with_element(
        mut self,
        frame: &[&str],
        id: &str,
        states: &[ElementState],
    ) -> Self {
        self.elements.insert((to_path(frame), id.to_string()), states.to_vec());
        self
    }

    /// Queries made inside `frame` whose sequence number falls in `queries`
    /// fail with [`Error::FrameUnavailable`], as if the frame were reloading.
    pub(crate) fn with_frame_outage(mut self, frame: &[&str], queries: Range<usize>) -> Self {
        self.outages.insert(to_path(frame), queries);
        self
    }

    pub(crate) fn detach_after_scroll(mut self) -> Self {
        self.detach_after_scroll = true;
        self
    }
}

fn to_path(titles: &[&str]) -> Vec<String> {
    titles.iter().map(|t| t.to_string()).collect()
}

pub(crate) struct FakeBackend {
    page: FakePage,
    probes: RefCell<HashMap<String, usize>>,
    detached: RefCell<bool>,
    clicked: RefCell<bool>,
    log: EventLog,
    poll_interval: Duration,
    fail_navigation: bool,
    fail_shutdown: bool,
}

impl FakeBackend {
    pub(crate) fn new(page: FakePage) -> Self {
        Self {
            page,
            probes: RefCell::new(HashMap::new()),
            detached: RefCell::new(false),
            clicked: RefCell::new(false),
            log: Rc::new(RefCell::new(Vec::new())),
            poll_interval: Duration::from_millis(20),
            fail_navigation: false,
            fail_shutdown: false,
        }
    }

    pub(crate) fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub(crate) fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub(crate) fn fail_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub(crate) fn fail_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    fn record(&self, event: String) {
        self.log.borrow_mut().push(event);
    }

    fn next_probe(&self, key: String) -> usize {
        let mut probes = self.probes.borrow_mut();
        let n = probes.entry(key).or_insert(0);
        let current = *n;
        *n += 1;
        current
    }

    fn check_frame(&self, frame: &FrameContext) -> Result<()> {
        if let Some(outage) = self.page.outages.get(frame.titles()) {
            let probe = self.next_probe(format!("outage:{}", frame));
            if outage.contains(&probe) {
                return Err(Error::FrameUnavailable(frame.to_string()));
            }
        }
        Ok(())
    }

    fn state_of(&self, frame: &FrameContext, element_id: &str) -> Option<&Vec<ElementState>> {
        if *self.detached.borrow() {
            return None;
        }
        self.page
            .elements
            .get(&(frame.titles().to_vec(), element_id.to_string()))
    }
}

fn pick<T: Copy + Default>(timeline: &[T], probe: usize) -> T {
    timeline
        .get(probe)
        .or_else(|| timeline.last())
        .copied()
        .unwrap_or_default()
}

impl RenderBackend for FakeBackend {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.record(format!("navigate {}", url));
        if self.fail_navigation {
            return Err(Error::NavigationFailure(format!("cannot reach {}", url)));
        }
        Ok(())
    }

    fn count_frames(&self, frame: &FrameContext, title: &str) -> Result<usize> {
        self.record(format!("count_frames {} {}", frame, title));
        self.check_frame(frame)?;
        let key = (frame.titles().to_vec(), title.to_string());
        let probe = self.next_probe(format!("frame:{:?}", key));
        Ok(self.page.frames.get(&key).map(|c| pick(c, probe)).unwrap_or(0))
    }

    fn element_state(&self, frame: &FrameContext, element_id: &str) -> Result<ElementState> {
        self.record(format!("state {}", element_id));
        self.check_frame(frame)?;
        let probe = self.next_probe(format!("element:{}:{}", frame, element_id));
        Ok(self
            .state_of(frame, element_id)
            .map(|states| pick(states, probe))
            .unwrap_or_else(ElementState::missing))
    }

    fn scroll_into_view(&self, frame: &FrameContext, element_id: &str) -> Result<bool> {
        self.record(format!("scroll {}", element_id));
        let found = self.state_of(frame, element_id).is_some();
        if found && self.page.detach_after_scroll {
            *self.detached.borrow_mut() = true;
        }
        Ok(found)
    }

    fn click(&self, frame: &FrameContext, element_id: &str) -> Result<bool> {
        self.record(format!("click {}", element_id));
        let found = self.state_of(frame, element_id).is_some();
        if found {
            *self.clicked.borrow_mut() = true;
        }
        Ok(found)
    }

    fn markup(&self, frame: &FrameContext) -> Result<String> {
        self.record(format!("markup {}", frame));
        let revealed = if *self.clicked.borrow() { self.page.revealed.as_str() } else { "" };
        Ok(format!(
            "<html><body data-frame=\"{}\">{}{}</body></html>",
            frame, self.page.body, revealed
        ))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn shutdown(&mut self) -> Result<()> {
        self.record("shutdown".to_string());
        if self.fail_shutdown {
            return Err(Error::InteractionFailure("browser already gone".to_string()));
        }
        Ok(())
    }
}
