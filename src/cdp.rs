//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)
//!
//! Launches Chrome, drives a single tab and answers the [`RenderBackend`]
//! queries by evaluating small scripts in the page.
//!
//! Frames are resolved on the protocol side: the title path of a
//! [`FrameContext`] is walked down `Page.getFrameTree`, matching each child
//! frame's owner element by its `title` attribute. Scripts then run in an
//! isolated world created inside the resolved frame, which works for
//! cross-origin iframes as long as they stay in the page's process (see
//! [`IN_PROCESS_FRAME_ARGS`]).

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Page, Runtime, DOM};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info};
use serde::de::DeserializeOwned;

use crate::render::{ElementState, FrameContext, RenderBackend, RenderedDocument};
use crate::{Error, FetchConfig, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const WORLD_NAME: &str = "turnout-fetch";

/// Keep cross-origin iframes in the page's renderer so their frame ids
/// accept `Page.createIsolatedWorld` from the page's session.
pub const IN_PROCESS_FRAME_ARGS: [&str; 2] = [
    "--disable-site-isolation-trials",
    "--disable-features=IsolateOrigins,site-per-process",
];

// `{{BODY}}` sees the frame's document as `doc` and returns a JSON value.
const PROBE_TEMPLATE: &str = r#"JSON.stringify((function (doc) { {{BODY}} })(document))"#;

const ELEMENT_STATE: &str = r#"
    var el = doc.getElementById({{ARG}});
    if (!el) { return { present: false }; }
    var rect = el.getBoundingClientRect();
    var style = window.getComputedStyle(el);
    var displayed = rect.width > 0 && rect.height > 0
        && style.display !== 'none' && style.visibility !== 'hidden';
    var obstructed = false;
    if (displayed) {
        var hit = doc.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2);
        obstructed = !(hit && (hit === el || el.contains(hit)));
    }
    return {
        present: true,
        displayed: displayed,
        enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
        obstructed: obstructed
    };"#;

const SCROLL_INTO_VIEW: &str = r#"
    var el = doc.getElementById({{ARG}});
    if (!el || !el.isConnected) { return false; }
    el.scrollIntoView(true);
    return true;"#;

const CLICK: &str = r#"
    var el = doc.getElementById({{ARG}});
    if (!el || !el.isConnected) { return false; }
    el.click();
    return true;"#;

const MARKUP: &str = r#"
    return doc.documentElement ? doc.documentElement.outerHTML : '';"#;

fn probe_script(body: &str, arg: &str) -> Result<String> {
    let arg = serde_json::to_string(arg).map_err(|e| Error::ScriptError(e.to_string()))?;
    Ok(PROBE_TEMPLATE.replace("{{BODY}}", &body.replace("{{ARG}}", &arg)))
}

/// Value of `name` in CDP's flattened `[name, value, name, value, ...]` list
fn attribute<'a>(attributes: &'a [String], name: &str) -> Option<&'a str> {
    attributes
        .chunks_exact(2)
        .find(|pair| pair[0].eq_ignore_ascii_case(name))
        .map(|pair| pair[1].as_str())
}

/// Chrome session holding one tab
pub struct CdpBackend {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    /// Isolated world per frame id, dropped when its context goes away
    worlds: RefCell<HashMap<String, Runtime::ExecutionContextId>>,
}

impl CdpBackend {
    /// Start Chrome with the configured flags. Any failure here is a
    /// [`Error::SessionStartFailure`].
    pub fn launch(config: &FetchConfig) -> Result<Self> {
        let mut chrome_args = config.effective_chrome_args();
        chrome_args.extend(IN_PROCESS_FRAME_ARGS.iter().map(|a| a.to_string()));
        let args: Vec<&OsStr> = chrome_args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| {
                Error::SessionStartFailure(format!("Failed to build launch options: {}", e))
            })?;

        info!(
            "launching chrome (headless: {}, args: {})",
            config.headless,
            chrome_args.join(" ")
        );
        let browser = Browser::new(launch_options)
            .map_err(|e| Error::SessionStartFailure(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::SessionStartFailure(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(config.timeout());

        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
            worlds: RefCell::new(HashMap::new()),
        })
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| Error::InteractionFailure("browser tab is closed".into()))
    }

    fn frame_tree(&self) -> Result<Page::FrameTree> {
        let reply = self
            .tab()?
            .call_method(Page::GetFrameTree(None))
            .map_err(|e| Error::ScriptError(format!("Failed to read frame tree: {}", e)))?;
        Ok(reply.frame_tree)
    }

    /// `title` attribute of the iframe element owning `frame_id`.
    ///
    /// `None` when the owner is not an iframe, has no title, or the frame
    /// detached while we were looking.
    fn owner_title(&self, frame_id: &str) -> Result<Option<String>> {
        let tab = self.tab()?;
        let owner = match tab.call_method(DOM::GetFrameOwner {
            frame_id: frame_id.to_string(),
        }) {
            Ok(owner) => owner,
            Err(e) => {
                debug!("no owner for frame {}: {}", frame_id, e);
                return Ok(None);
            }
        };
        let node = match tab.call_method(DOM::DescribeNode {
            node_id: None,
            backend_node_id: Some(owner.backend_node_id),
            object_id: None,
            depth: None,
            pierce: None,
        }) {
            Ok(reply) => reply.node,
            Err(e) => {
                debug!("cannot describe owner of frame {}: {}", frame_id, e);
                return Ok(None);
            }
        };

        if !node.node_name.eq_ignore_ascii_case("iframe") {
            return Ok(None);
        }
        Ok(node
            .attributes
            .as_deref()
            .and_then(|attrs| attribute(attrs, "title"))
            .map(str::to_string))
    }

    /// Child frames of `tree` owned by an iframe titled `title`.
    fn children_titled<'t>(
        &self,
        tree: &'t Page::FrameTree,
        title: &str,
    ) -> Result<Vec<&'t Page::FrameTree>> {
        let mut matches = Vec::new();
        for child in tree.child_frames.iter().flatten() {
            if self.owner_title(&child.frame.id)?.as_deref() == Some(title) {
                matches.push(child);
            }
        }
        Ok(matches)
    }

    /// Walk `frame`'s title path down the live frame tree. `None` if any step
    /// does not resolve to exactly one iframe.
    fn resolve_frame(&self, frame: &FrameContext) -> Result<Option<Page::FrameTree>> {
        let mut current = self.frame_tree()?;
        for title in frame.titles() {
            let next = match self.children_titled(&current, title)?.as_slice() {
                [only] => (*only).clone(),
                _ => return Ok(None),
            };
            current = next;
        }
        Ok(Some(current))
    }

    /// Execution context of our isolated world in `frame_id`, and whether it
    /// came from the cache.
    fn world_for(&self, frame_id: &str) -> Result<(Runtime::ExecutionContextId, bool)> {
        if let Some(id) = self.worlds.borrow().get(frame_id) {
            return Ok((*id, true));
        }
        let reply = self
            .tab()?
            .call_method(Page::CreateIsolatedWorld {
                frame_id: frame_id.to_string(),
                world_name: Some(WORLD_NAME.to_string()),
                grant_univeral_access: None,
            })
            .map_err(|e| Error::FrameUnavailable(format!("{} ({})", frame_id, e)))?;
        debug!(
            "created isolated world {} in frame {}",
            reply.execution_context_id, frame_id
        );
        self.worlds
            .borrow_mut()
            .insert(frame_id.to_string(), reply.execution_context_id);
        Ok((reply.execution_context_id, false))
    }

    /// Run `body` against the document of `frame` and decode its result.
    fn probe<T: DeserializeOwned>(&self, frame: &FrameContext, body: &str, arg: &str) -> Result<T> {
        let tree = self
            .resolve_frame(frame)?
            .ok_or_else(|| Error::FrameUnavailable(frame.to_string()))?;
        let frame_id = tree.frame.id;
        let (context_id, cached) = self.world_for(&frame_id)?;
        let script = probe_script(body, arg)?;

        let reply = match self.tab()?.call_method(Runtime::Evaluate {
            expression: script,
            return_by_value: Some(true),
            generate_preview: Some(false),
            silent: Some(true),
            await_promise: Some(false),
            include_command_line_api: Some(false),
            user_gesture: Some(true),
            object_group: None,
            context_id: Some(context_id),
            throw_on_side_effect: None,
            timeout: None,
            disable_breaks: None,
            repl_mode: None,
            allow_unsafe_eval_blocked_by_csp: None,
            unique_context_id: None,
            serialization_options: None,
        }) {
            Ok(reply) => reply,
            // A cached world dies with its document; the next probe builds a new one.
            Err(e) if cached => {
                self.worlds.borrow_mut().remove(&frame_id);
                return Err(Error::FrameUnavailable(format!("{} ({})", frame, e)));
            }
            Err(e) => return Err(Error::ScriptError(format!("Evaluation failed: {}", e))),
        };

        if let Some(details) = reply.exception_details {
            return Err(Error::ScriptError(format!(
                "script threw in {}: {}",
                frame, details.text
            )));
        }
        let raw = match reply.result.value {
            Some(serde_json::Value::String(s)) => s,
            other => {
                return Err(Error::ScriptError(format!(
                    "expected a JSON string from the page, got {:?}",
                    other
                )))
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::ScriptError(format!("Malformed probe result: {}", e)))
    }
}

impl RenderBackend for CdpBackend {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.worlds.borrow_mut().clear();
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(|e| Error::NavigationFailure(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::NavigationFailure(format!("Wait for navigation failed: {}", e)))?;
        debug!("navigated to {}", tab.get_url());
        Ok(())
    }

    fn count_frames(&self, frame: &FrameContext, title: &str) -> Result<usize> {
        let tree = self
            .resolve_frame(frame)?
            .ok_or_else(|| Error::FrameUnavailable(frame.to_string()))?;
        Ok(self.children_titled(&tree, title)?.len())
    }

    fn element_state(&self, frame: &FrameContext, element_id: &str) -> Result<ElementState> {
        self.probe(frame, ELEMENT_STATE, element_id)
    }

    fn scroll_into_view(&self, frame: &FrameContext, element_id: &str) -> Result<bool> {
        self.probe(frame, SCROLL_INTO_VIEW, element_id)
    }

    fn click(&self, frame: &FrameContext, element_id: &str) -> Result<bool> {
        self.probe(frame, CLICK, element_id)
    }

    fn markup(&self, frame: &FrameContext) -> Result<String> {
        self.probe(frame, MARKUP, "")
    }

    fn poll_interval(&self) -> Duration {
        POLL_INTERVAL
    }

    fn shutdown(&mut self) -> Result<()> {
        self.worlds.borrow_mut().clear();
        // Dropping the browser terminates the child process.
        drop(self.tab.take());
        drop(self.browser.take());
        Ok(())
    }
}

/// Launch Chrome and load `url` in it.
pub fn open(url: &str, config: &FetchConfig) -> Result<RenderedDocument<CdpBackend>> {
    let backend = CdpBackend::launch(config)?;
    RenderedDocument::open(backend, url)
}
