//! End-to-end runs: source, normalizer, then sink.
//!
//! A run is all-or-nothing: the sink is only invoked once every stage has
//! succeeded, and a rendering session is closed whichever stage failed.

use log::info;

use crate::decode::decode;
use crate::fetch::{HttpFetcher, Transport};
use crate::normalize::{normalize, NormalizedDocument};
use crate::render::{
    click, enter_frame, locate, scroll_into_view, wait_until, Readiness, RenderBackend,
    RenderedDocument,
};
use crate::{FetchConfig, FetchTarget, Interaction, Result};

/// Which source feeds the normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pipeline {
    /// Plain HTTP GET plus explicit decompression
    Direct,
    /// Chrome session with a button click before capture
    Rendered(Interaction),
}

/// GET the target, decode the body and normalize it.
pub fn fetch_direct<T: Transport>(
    fetcher: &HttpFetcher<T>,
    target: &FetchTarget,
    config: &FetchConfig,
) -> Result<NormalizedDocument> {
    let headers = config.headers_for(target);
    let payload = fetcher.fetch(target.url(), &headers, config.timeout_seconds)?;
    let body = decode(&payload)?;
    normalize(body)
}

/// Reveal the gated panel in an opened document, capture and normalize it.
/// The session is closed before this returns.
pub fn fetch_rendered<B: RenderBackend>(
    mut doc: RenderedDocument<B>,
    interaction: &Interaction,
    config: &FetchConfig,
) -> Result<NormalizedDocument> {
    let markup = reveal_panel(&mut doc, interaction, config);
    doc.close();
    normalize(markup?)
}

fn reveal_panel<B: RenderBackend>(
    doc: &mut RenderedDocument<B>,
    interaction: &Interaction,
    config: &FetchConfig,
) -> Result<String> {
    let timeout = config.timeout();
    let element_id = interaction.element_id.as_str();

    if let Some(title) = &interaction.frame_title {
        enter_frame(doc, title, timeout)?;
    }
    wait_until(doc, element_id, Readiness::Visible, timeout)?;
    let button = locate(doc, None, element_id, timeout)?;
    scroll_into_view(doc, &button)?;
    wait_until(doc, element_id, Readiness::Clickable, timeout)?;
    click(doc, &button)?;

    info!("captured markup after clicking '{}'", element_id);
    doc.current_markup()
}

/// Run `pipeline` with the production transport/backend.
pub fn run(
    pipeline: &Pipeline,
    target: &FetchTarget,
    config: &FetchConfig,
) -> Result<NormalizedDocument> {
    match pipeline {
        Pipeline::Direct => {
            let fetcher = HttpFetcher::new(crate::fetch::ReqwestTransport::new()?);
            fetch_direct(&fetcher, target, config)
        }
        #[cfg(feature = "cdp")]
        Pipeline::Rendered(interaction) => {
            let doc = crate::cdp::open(target.url(), config)?;
            fetch_rendered(doc, interaction, config)
        }
        #[cfg(not(feature = "cdp"))]
        Pipeline::Rendered(_) => Err(crate::Error::ConfigError(
            "rendered pipeline requires the `cdp` feature".into(),
        )),
    }
}

/// Hand a successful result to `sink`. Failed runs never reach it.
pub fn deliver<S>(result: Result<NormalizedDocument>, sink: S) -> Result<()>
where
    S: FnOnce(&str) -> Result<()>,
{
    let document = result?;
    sink(&document.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fake::{FakeBackend, FakePage, CLICKABLE, COVERED, HIDDEN};
    use crate::Error;

    const FRAME: &str = "Data Hub - Voter Registration";

    fn config() -> FetchConfig {
        FetchConfig { timeout_seconds: 1, ..Default::default() }
    }

    fn gated_page() -> FakePage {
        FakePage::default()
            .with_frame(&[], FRAME, &[0, 1])
            .with_element(&[FRAME], "AbsenteeBallots", &[HIDDEN, COVERED, COVERED, CLICKABLE])
            .with_body("<button id=\"AbsenteeBallots\">Absentee</button>")
            .with_revealed("<table><tr><td>Fulton</td><td>1024</td></tr></table>")
    }

    #[test]
    fn test_rendered_pipeline_order_and_output() {
        let backend = FakeBackend::new(gated_page());
        let log = backend.log();
        let doc = RenderedDocument::open(backend, "http://example.com/turnout").unwrap();

        let out = fetch_rendered(doc, &Interaction::default(), &config()).unwrap();
        assert!(out.text.contains("Fulton"), "{}", out.text);
        assert!(out.text.contains(&format!("data-frame=\"{}\"", FRAME)), "{}", out.text);

        let log = log.borrow();
        let pos = |needle: &str| log.iter().position(|e| e.starts_with(needle)).unwrap();
        assert!(pos("count_frames") < pos("state"));
        assert!(pos("state") < pos("scroll"));
        assert!(pos("scroll") < pos("click"));
        assert!(pos("click") < pos("markup"));
        assert_eq!(log.last().map(String::as_str), Some("shutdown"));
        assert_eq!(log.iter().filter(|e| *e == "shutdown").count(), 1);
    }

    #[test]
    fn test_rendered_pipeline_closes_session_on_failure() {
        let page = FakePage::default().with_frame(&[], FRAME, &[1]);
        let backend = FakeBackend::new(page);
        let log = backend.log();
        let doc = RenderedDocument::open(backend, "http://example.com/turnout").unwrap();

        let err = fetch_rendered(doc, &Interaction::default(), &config()).unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { predicate: Readiness::Visible, .. }));
        assert_eq!(log.borrow().iter().filter(|e| *e == "shutdown").count(), 1);
    }

    #[test]
    fn test_rendered_pipeline_survives_frame_reload() {
        let page = gated_page().with_frame_outage(&[FRAME], 1..3);
        let doc = RenderedDocument::open(FakeBackend::new(page), "http://example.com/").unwrap();
        let out = fetch_rendered(doc, &Interaction::default(), &config()).unwrap();
        assert!(out.text.contains("Fulton"), "{}", out.text);
    }

    #[test]
    fn test_rendered_pipeline_without_frame() {
        let page = FakePage::default()
            .with_element(&[], "go", &[CLICKABLE])
            .with_revealed("<p>panel</p>");
        let doc = RenderedDocument::open(FakeBackend::new(page), "http://example.com/").unwrap();
        let interaction = Interaction { frame_title: None, element_id: "go".into() };
        let out = fetch_rendered(doc, &interaction, &config()).unwrap();
        assert!(out.text.contains("panel"));
    }

    #[test]
    fn test_sink_not_called_on_failure() {
        let mut called = false;
        let err = deliver(Err(Error::ParseFailure("input is empty".into())), |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.stage(), "normalize");
        assert!(!called);

        let mut written = String::new();
        deliver(Ok(NormalizedDocument { text: "<html>\n</html>\n".into() }), |text| {
            written.push_str(text);
            Ok(())
        })
        .unwrap();
        assert_eq!(written, "<html>\n</html>\n");
    }
}
