use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use slug::slugify;
use url::Url;

use crate::page_parser::ContentMarkers;

/// Everything needed to crawl one help site. Loadable from JSON; every
/// field can be overridden on the command line.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: Option<String>,
    pub root_url: String,
    pub menu_path: String,
    pub excluded_url_pattern: String,
    pub excluded_sections: Vec<String>,
    pub content_tag: String,
    pub content_marker: String,
    pub submenu_header_class: String,
    pub output: Option<PathBuf>,
    pub timeout_secs: f64,
    pub retries: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: None,
            root_url: String::new(),
            menu_path: "/knowledgebase".to_string(),
            excluded_url_pattern: r"^.*video.*$".to_string(),
            excluded_sections: vec!["Video Tutorials".to_string(), "All articles".to_string()],
            content_tag: "section".to_string(),
            content_marker: "uvFaq".to_string(),
            submenu_header_class: "uvListItemHeader".to_string(),
            output: None,
            timeout_secs: 30.0,
            retries: 2,
        }
    }
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Checks the fields and compiles them into crawl-ready form.
    pub fn resolve(&self) -> Result<CrawlSettings> {
        if self.root_url.is_empty() {
            return Err(anyhow!("A root URL is required"));
        }
        let root = Url::parse(&self.root_url)
            .map_err(|e| anyhow!("Invalid root URL {}: {}", self.root_url, e))?;
        let menu_url = root
            .join(&self.menu_path)
            .map_err(|e| anyhow!("Invalid menu path {}: {}", self.menu_path, e))?;
        let excluded_urls = Regex::new(&self.excluded_url_pattern).map_err(|e| {
            anyhow!(
                "Invalid excluded URL pattern {}: {}",
                self.excluded_url_pattern,
                e
            )
        })?;
        if self.timeout_secs < 0.0 {
            return Err(anyhow!("Timeout must be zero or positive"));
        }

        Ok(CrawlSettings {
            root,
            menu_url,
            excluded_urls,
            excluded_sections: self.excluded_sections.clone(),
            markers: ContentMarkers {
                tag: self.content_tag.clone(),
                marker: self.content_marker.clone(),
            },
            submenu_header_class: self.submenu_header_class.clone(),
        })
    }

    /// Configured title, else the site's own `<title>`, else a generic one.
    pub fn document_title(&self, site_title: Option<&str>) -> String {
        self.title
            .as_deref()
            .or(site_title)
            .unwrap_or("User Manual")
            .to_string()
    }

    /// Configured output path, or one named after the document title.
    pub fn output_path(&self, title: &str) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let slug = slugify(title);
            let stem = if slug.is_empty() { "manual".to_string() } else { slug };
            PathBuf::from(format!("{}.pdf", stem))
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub root: Url,
    pub menu_url: Url,
    pub excluded_urls: Regex,
    pub excluded_sections: Vec<String>,
    pub markers: ContentMarkers,
    pub submenu_header_class: String,
}

impl CrawlSettings {
    pub fn is_excluded_section(&self, heading: &str) -> bool {
        self.excluded_sections.iter().any(|section| section == heading)
    }

    pub fn is_excluded_url(&self, url: &Url) -> bool {
        self.excluded_urls.is_match(url.as_str())
    }
}
