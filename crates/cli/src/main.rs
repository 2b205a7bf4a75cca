use anondl_core::captcha::{CaptchaSolver, ManualSolver, NoSolver};
use anondl_core::circuit::TorSupervisor;
use anondl_core::config;
use anondl_core::controller::{DownloadOptions, Downloader};
use anondl_core::frontend::{ConsoleFrontend, Frontend, JsonFrontend};
use anondl_core::landing::DefaultPageParser;
use anondl_core::logging;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Anonymizing, CAPTCHA-gated segmented downloader.
#[derive(Debug, Parser)]
#[command(name = "anondl")]
#[command(about = "Downloads files through CAPTCHA-gated hosting pages over a rotating anonymizing circuit", long_about = None)]
struct Args {
    /// One or more hosting page URLs, downloaded sequentially.
    #[arg(required = true)]
    page_urls: Vec<String>,

    /// Number of parallel segments.
    #[arg(long)]
    parts: Option<usize>,

    /// Output file or directory (default: filename in the current directory).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory for the progress journal, link cache, and circuit data (default: system temp dir).
    #[arg(long)]
    temp: Option<PathBuf>,

    /// Overwrite an existing output file without prompting.
    #[arg(long)]
    yes: bool,

    /// Print one status line per part instead of a single aggregate line.
    #[arg(long)]
    parts_progress: bool,

    /// Write logs to this file instead of the default XDG state location.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Solve CAPTCHAs automatically. No bundled solver exists yet; this flag
    /// currently causes a CAPTCHA-gated download to fail fast with a clear
    /// error rather than hang waiting on a human.
    #[arg(long, conflicts_with = "manual_captcha")]
    auto_captcha: bool,

    /// Prompt interactively for each CAPTCHA answer.
    #[arg(long)]
    manual_captcha: bool,

    /// Password for a password-protected landing page.
    #[arg(long)]
    password: Option<String>,

    /// Route the landing-page request through the anonymizing circuit too.
    #[arg(long)]
    enforce_anon: bool,

    /// Connect/read timeout in seconds.
    #[arg(long)]
    conn_timeout: Option<u64>,

    /// Output format: a redrawing terminal line, or line-delimited JSON.
    #[arg(long, value_enum, default_value = "console")]
    frontend: FrontendKindArg,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum FrontendKindArg {
    Console,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("anondl error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let logging_result = match &args.log {
        Some(path) => logging::init_logging_at(path),
        None => logging::init_logging(),
    };
    if logging_result.is_err() {
        logging::init_logging_stderr();
    }

    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);

    let parts = args.parts.unwrap_or(cfg.default_parts);
    let conn_timeout = Duration::from_secs(args.conn_timeout.unwrap_or(cfg.conn_timeout_secs));
    let temp_dir = args.temp.unwrap_or_else(std::env::temp_dir);

    let interactive = matches!(args.frontend, FrontendKindArg::Console);
    let frontend: Arc<dyn Frontend> = match args.frontend {
        FrontendKindArg::Console => Arc::new(
            ConsoleFrontend::new(interactive).with_parts_progress(args.parts_progress),
        ),
        FrontendKindArg::Json => Arc::new(JsonFrontend),
    };

    let solver: Arc<dyn CaptchaSolver> = if args.manual_captcha {
        let frontend_for_prompt = Arc::clone(&frontend);
        Arc::new(ManualSolver::new(move |image_url: &str| {
            frontend_for_prompt.prompt(&format!("CAPTCHA at {image_url}, enter the answer"))
        }))
    } else {
        Arc::new(NoSolver)
    };
    if args.auto_captcha {
        tracing::warn!("--auto-captcha requested but no automatic solver is bundled; CAPTCHA-gated pages will fail");
    }

    let port_base = cfg.circuit_port_base;
    let circuit_factory = Box::new(move || TorSupervisor::spawn_default(port_base));

    let downloader = Downloader::new(
        Box::new(DefaultPageParser),
        solver,
        frontend,
        circuit_factory,
    );

    let mut had_failure = false;
    for page_url in &args.page_urls {
        let opts = DownloadOptions {
            parts,
            output: args.output.clone(),
            temp_dir: temp_dir.clone(),
            overwrite: args.yes,
            conn_timeout,
            enforce_anon: args.enforce_anon,
            password: args.password.clone(),
            safety_margin_secs: cfg.link_cache_safety_margin_secs,
            auto_delete: cfg.auto_delete_downloads,
        };
        if let Err(e) = downloader.download(page_url, opts) {
            tracing::error!("download of {page_url} failed: {e:#}");
            had_failure = true;
            break;
        }
    }

    if had_failure {
        anyhow::bail!("one or more downloads failed");
    }
    Ok(())
}
