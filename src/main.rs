use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use turnout_fetch::pipeline::{self, Pipeline};
use turnout_fetch::{sink, FetchConfig, FetchTarget, Interaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Plain HTTP GET with browser-like headers
    Direct,
    /// Load the page in Chrome and click through to the data panel
    Render,
}

/// Fetch a voter-turnout page and save it as pretty-printed HTML
#[derive(Debug, Parser)]
#[command(name = "turnout-fetch", version, about)]
struct Cli {
    /// Page to fetch
    url: String,

    #[arg(long, value_enum, default_value_t = Mode::Direct)]
    mode: Mode,

    /// Where to write the normalized HTML
    #[arg(short, long, default_value = "output.html")]
    output: PathBuf,

    /// Bound for each blocking step, in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Show the Chrome window (render mode)
    #[arg(long)]
    headed: bool,

    /// Title of the iframe holding the button (render mode)
    #[arg(long, default_value = "Data Hub - Voter Registration", conflicts_with = "no_frame")]
    frame_title: String,

    /// Look for the button in the top document instead of an iframe
    #[arg(long)]
    no_frame: bool,

    /// id of the button revealing the data panel (render mode)
    #[arg(long, default_value = "AbsenteeBallots")]
    element_id: String,

    /// Extra Chrome argument; may be repeated
    #[arg(long = "chrome-arg", allow_hyphen_values = true)]
    chrome_args: Vec<String>,

    /// Override the User-Agent header (direct mode)
    #[arg(long)]
    user_agent: Option<String>,

    /// Override the Referer header (direct mode)
    #[arg(long)]
    referer: Option<String>,
}

impl Cli {
    fn config(&self) -> FetchConfig {
        let mut config = FetchConfig {
            timeout_seconds: self.timeout,
            headless: !self.headed,
            ..Default::default()
        };
        config.chrome_args.extend(self.chrome_args.iter().cloned());
        if let Some(ua) = &self.user_agent {
            config.set_header("User-Agent", ua.as_str());
        }
        if let Some(referer) = &self.referer {
            config.set_header("Referer", referer.as_str());
        }
        config
    }

    fn pipeline(&self) -> Pipeline {
        match self.mode {
            Mode::Direct => Pipeline::Direct,
            Mode::Render => Pipeline::Rendered(Interaction {
                frame_title: (!self.no_frame).then(|| self.frame_title.clone()),
                element_id: self.element_id.clone(),
            }),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = FetchTarget::new(&cli.url).and_then(|target| {
        let document = pipeline::run(&cli.pipeline(), &target, &cli.config());
        pipeline::deliver(document, |text| sink::write_output(&cli.output, text))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {} stage failed: {}", e.stage(), e);
            if e.is_retryable() {
                eprintln!("note: this failure may be transient; re-running could succeed");
            }
            ExitCode::FAILURE
        }
    }
}
