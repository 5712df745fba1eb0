use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use helpdesk2pdf::{build_manual, crawl_site, BrowserFetcher, RetryPolicy, SiteConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "helpdesk2pdf")]
#[command(about = "CLI utility to turn a hierarchical help site into a single two-column PDF manual")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the help site and write the PDF manual
    Build {
        #[command(flatten)]
        site: SiteArgs,

        /// Output file for the manual (defaults to the slugified title)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Crawl the help site and print the extracted story as JSON
    DumpStory {
        #[command(flatten)]
        site: SiteArgs,
    },
}

#[derive(Args)]
struct SiteArgs {
    /// Root URL of the help site
    root_url: Option<String>,

    /// JSON file with site settings; command-line flags take precedence
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Document title (defaults to the menu page's title)
    #[arg(long = "title")]
    title: Option<String>,

    /// Path of the root menu page, relative to the root URL
    #[arg(long = "menu-path")]
    menu_path: Option<String>,

    /// Regular expression of article URLs to leave out
    #[arg(long = "exclude-urls")]
    exclude_urls: Option<String>,

    /// Section heading to leave out (repeatable; replaces the defaults)
    #[arg(long = "exclude-section")]
    exclude_sections: Vec<String>,

    /// Request timeout in seconds
    #[arg(short = 't', long = "timeout", value_parser = parse_timeout)]
    timeout: Option<f64>,

    /// Retries per failed request
    #[arg(long = "retries")]
    retries: Option<u32>,

    /// Show the browser window while crawling
    #[arg(long = "headful")]
    headful: bool,
}

impl SiteArgs {
    fn into_config(self, output: Option<PathBuf>) -> Result<SiteConfig> {
        let mut config = match &self.config {
            Some(path) => SiteConfig::load(path)?,
            None => SiteConfig::default(),
        };
        if let Some(root_url) = self.root_url {
            config.root_url = root_url;
        }
        if config.root_url.is_empty() {
            return Err(anyhow!("No root URL given on the command line or in the config file"));
        }
        if let Some(title) = self.title {
            config.title = Some(title);
        }
        if let Some(menu_path) = self.menu_path {
            config.menu_path = menu_path;
        }
        if let Some(pattern) = self.exclude_urls {
            config.excluded_url_pattern = pattern;
        }
        if !self.exclude_sections.is_empty() {
            config.excluded_sections = self.exclude_sections;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if output.is_some() {
            config.output = output;
        }
        Ok(config)
    }
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value < 0.0 {
        return Err("Must be zero or positive number.".to_string());
    }
    Ok(value)
}

async fn launch(config: &SiteConfig, headful: bool) -> Result<BrowserFetcher> {
    info!("Launching browser...");
    let policy = RetryPolicy::new(config.timeout_secs, config.retries);
    Ok(BrowserFetcher::launch(policy, headful).await?)
}

async fn build(config: SiteConfig, headful: bool) -> Result<()> {
    let fetcher = launch(&config, headful).await?;
    let result = build_manual(&fetcher, &config).await;
    fetcher.close().await;

    let report = result?;
    info!(
        "Done: {} pages, {} table of contents entries",
        report.pages.to_string().green(),
        report.toc.len()
    );
    Ok(())
}

async fn dump_story(config: SiteConfig, headful: bool) -> Result<()> {
    let fetcher = launch(&config, headful).await?;
    let result = crawl_site(&fetcher, &config).await;
    fetcher.close().await;

    let crawl = result?;
    println!("{}", serde_json::to_string_pretty(&crawl.story)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Set up logging with chromiumoxide errors suppressed
    let filter = EnvFilter::from_default_env()
        .add_directive("chromiumoxide::conn=off".parse().expect("valid directive"))
        .add_directive("chromiumoxide::handler=off".parse().expect("valid directive"))
        .add_directive("helpdesk2pdf=info".parse().expect("valid directive"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { site, output } => {
            let headful = site.headful;
            match site.into_config(output) {
                Ok(config) => build(config, headful).await,
                Err(e) => Err(e),
            }
        }
        Commands::DumpStory { site } => {
            let headful = site.headful;
            match site.into_config(None) {
                Ok(config) => dump_story(config, headful).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}
