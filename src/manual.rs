use anyhow::Result;
use tracing::info;

use crate::assembler::{AssemblyReport, Assembler};
use crate::config::SiteConfig;
use crate::crawler::{CrawlOutput, Crawler};
use crate::fetcher::Fetch;

/// Crawls the whole site into a story without rendering anything.
pub async fn crawl_site<F: Fetch>(fetcher: &F, config: &SiteConfig) -> Result<CrawlOutput> {
    let settings = config.resolve()?;
    let output = Crawler::new(fetcher, &settings).crawl().await?;
    Ok(output)
}

/// Crawls the site and writes the finished manual. Nothing is written
/// unless every page was crawled and the document built.
pub async fn build_manual<F: Fetch>(fetcher: &F, config: &SiteConfig) -> Result<AssemblyReport> {
    let crawl = crawl_site(fetcher, config).await?;
    let title = config.document_title(crawl.site_title.as_deref());
    let output_path = config.output_path(&title);
    info!("Assembling \"{}\" from {} elements", title, crawl.story.len());

    let report = Assembler::new(title, &crawl.images)
        .write(crawl.story, &output_path)
        .await?;
    Ok(report)
}
