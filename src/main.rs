use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use product_image_picker::config::{DEFAULT_MAX_AI_IMAGES, DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL};
use product_image_picker::output::{read_urls, to_rows, write_csv};
use product_image_picker::server::router;
use product_image_picker::{
    AnalyzeRequest, AnalyzeService, ChromiumExtractor, ImageSelector, ScraperConfig,
    SelectorConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "image-picker",
    about = "Pick the most ad-suitable product image from e-commerce pages"
)]
struct Cli {
    #[command(flatten)]
    opts: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a single product page and print the selection as JSON
    Analyze {
        url: String,
        /// Use the vision model (falls back to heuristic on failure)
        #[arg(long, default_value_t = false)]
        ai: bool,
    },
    /// Analyze every URL in a CSV/list file and write a CSV report
    Bulk {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "image_selection.csv")]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        ai: bool,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "IMAGE_PICKER_BIND", default_value = "127.0.0.1:3000")]
        bind: String,
    },
}

#[derive(Args, Debug)]
struct CommonOpts {
    /// Show the browser window instead of running headless
    #[arg(long, global = true, default_value_t = false)]
    show_browser: bool,

    /// Chrome/Chromium executable
    #[arg(long, global = true, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Reject URLs outside this host
    #[arg(long, global = true, env = "IMAGE_PICKER_ALLOWED_HOST")]
    allowed_host: Option<String>,

    #[arg(long, global = true, default_value_t = 30)]
    page_timeout_secs: u64,

    /// Images narrower than this are dropped
    #[arg(long, global = true, default_value_t = 200)]
    min_image_width: u32,

    /// Log full-page screenshots at debug level
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// API key for the vision model
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, global = true, env = "IMAGE_PICKER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    #[arg(long, global = true, default_value_t = 60)]
    model_timeout_secs: u64,

    /// Maximum images sent to the model per product
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_AI_IMAGES)]
    max_ai_images: usize,
}

impl CommonOpts {
    fn scraper_config(&self) -> Result<ScraperConfig> {
        let config = ScraperConfig::new()
            .with_headless(!self.show_browser)
            .with_chrome_path(self.chrome_path.clone())
            .with_allowed_host(self.allowed_host.clone())
            .with_page_timeout(Duration::from_secs(self.page_timeout_secs))
            .with_min_image_width(self.min_image_width)
            .with_debug(self.debug);
        config.validate().context("invalid --allowed-host")?;
        Ok(config)
    }

    fn selector_config(&self) -> SelectorConfig {
        SelectorConfig::new()
            .with_api_key(self.openai_api_key.clone())
            .with_model(self.model.clone())
            .with_base_url(self.openai_base_url.clone())
            .with_timeout(Duration::from_secs(self.model_timeout_secs))
            .with_max_images(self.max_ai_images)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,product_image_picker=debug,chromiumoxide=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let selector = ImageSelector::from_config(&cli.opts.selector_config())
        .context("failed to configure the vision model")?;
    let extractor = ChromiumExtractor::new(cli.opts.scraper_config()?);
    let service = AnalyzeService::new(extractor, selector);

    let result = run(&service, cli.command).await;

    if let Err(e) = service.shutdown().await {
        warn!("Browser shutdown failed: {}", e);
    }
    result
}

async fn run(service: &AnalyzeService<ChromiumExtractor>, command: Command) -> Result<()> {
    match command {
        Command::Analyze { url, ai } => {
            warn_if_ai_unavailable(service, ai);
            let result = service
                .analyze(&AnalyzeRequest::new(url.as_str()).with_ai(ai))
                .await
                .with_context(|| format!("failed to analyze {}", url))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Bulk { input, output, ai } => {
            warn_if_ai_unavailable(service, ai);
            let file = File::open(&input)
                .with_context(|| format!("failed to open {}", input.display()))?;
            let urls = read_urls(file)?;
            info!("Loaded {} URLs from {}", urls.len(), input.display());

            let outcome = service.analyze_bulk(&urls, ai).await;

            let out = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            write_csv(BufWriter::new(out), &to_rows(&outcome))?;

            println!(
                "{} succeeded, {} failed -> {}",
                outcome.successes.len(),
                outcome.failures.len(),
                output.display()
            );
        }
        Command::Serve { bind } => {
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {}", bind))?;
            info!("Listening on {}", bind);

            axum::serve(listener, router(service.clone()))
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown signal received");
                })
                .await
                .context("server error")?;
        }
    }
    Ok(())
}

fn warn_if_ai_unavailable(service: &AnalyzeService<ChromiumExtractor>, ai: bool) {
    if ai && !service.ai_available() {
        warn!("--ai requested but OPENAI_API_KEY is not set; using heuristic selection");
    }
}
