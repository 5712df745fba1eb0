use colored::*;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlSettings;
use crate::error::{CrawlError, ParseError};
use crate::fetcher::Fetch;
use crate::images::ImageLibrary;
use crate::markup::{self, MarkupEvent};
use crate::page_parser::{image_sources, parse_page};
use crate::story::{Element, Story};

/// Everything a crawl produces for the assembler.
#[derive(Debug)]
pub struct CrawlOutput {
    pub story: Story,
    pub images: ImageLibrary,
    /// `<title>` of the root menu page, if it had one.
    pub site_title: Option<String>,
}

/// Walks menu → submenus → articles, one fetch at a time, appending every
/// article to a single story in discovery order.
pub struct Crawler<'a, F: Fetch> {
    fetcher: &'a F,
    settings: &'a CrawlSettings,
    images: ImageLibrary,
}

impl<'a, F: Fetch> Crawler<'a, F> {
    pub fn new(fetcher: &'a F, settings: &'a CrawlSettings) -> Self {
        Self {
            fetcher,
            settings,
            images: ImageLibrary::new(),
        }
    }

    pub async fn crawl(mut self) -> Result<CrawlOutput, CrawlError> {
        let mut story = Story::new();
        let menu_url = self.settings.menu_url.clone();

        info!("Visiting \"{}\"", menu_url.as_str().green());
        let markup = self.fetcher.fetch_markup(&menu_url).await?;
        let site_title = page_title(&markup);

        self.walk_menu(&markup, &mut story).await?;

        info!("Crawl finished with {} story elements", story.len());
        Ok(CrawlOutput {
            story,
            images: self.images,
            site_title,
        })
    }

    /// Root menu: each `h2` names a section and may wrap a link to its submenu.
    async fn walk_menu(&mut self, markup: &str, story: &mut Story) -> Result<(), CrawlError> {
        let mut in_heading = false;
        let mut pending_link: Option<String> = None;

        for event in markup::tokenize(markup) {
            match event {
                MarkupEvent::Start(tag) => {
                    if tag.name == "h2" {
                        in_heading = true;
                    }
                    if in_heading && tag.name == "a" {
                        pending_link = tag.attr("href").map(str::to_string);
                    }
                }
                MarkupEvent::Text(text) if in_heading && !text.trim().is_empty() => {
                    in_heading = false;
                    let heading = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    if self.settings.is_excluded_section(&heading) {
                        info!("Skipping section \"{}\"", heading.yellow());
                        pending_link = None;
                    } else {
                        info!("Section \"{}\"", heading.cyan());
                        story.push(Element::heading(1, heading));
                    }
                }
                MarkupEvent::End(name) if name == "a" => {
                    if let Some(href) = pending_link.take() {
                        let submenu = self.resolve(&self.settings.menu_url, &href)?;
                        self.walk_submenu(&submenu, story).await?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Submenu: every marked list-item heading is followed by its article link.
    async fn walk_submenu(&mut self, url: &Url, story: &mut Story) -> Result<(), CrawlError> {
        debug!("Reading submenu {}", url);
        let markup = self.fetcher.fetch_markup(url).await?;
        let mut in_heading = false;

        for event in markup::tokenize(&markup) {
            let MarkupEvent::Start(tag) = event else {
                continue;
            };
            if tag.name == "h2" && tag.has_class(&self.settings.submenu_header_class) {
                in_heading = true;
            } else if tag.name == "a" && in_heading {
                in_heading = false;
                let href = tag.attr("href").ok_or_else(|| CrawlError::Parse {
                    url: url.to_string(),
                    source: ParseError::MissingAttribute {
                        tag: "a".to_string(),
                        attribute: "href".to_string(),
                    },
                })?;
                let article = self.resolve(url, href)?;
                self.crawl_article(&article, story).await?;
            }
        }
        Ok(())
    }

    async fn crawl_article(&mut self, url: &Url, story: &mut Story) -> Result<(), CrawlError> {
        if self.settings.is_excluded_url(url) {
            debug!("Skipping excluded article {}", url);
            return Ok(());
        }

        info!("Crawling {}...", url.as_str().green());
        let markup = self.fetcher.fetch_markup(url).await?;
        let mut events = markup::tokenize(&markup);
        absolutize_image_sources(&mut events, url);

        self.load_images(&events).await;

        let skipped = parse_page(&events, story, &mut self.images, &self.settings.markers)
            .map_err(|source| CrawlError::Parse {
                url: url.to_string(),
                source,
            })?;
        for image in skipped {
            warn!("Leaving out image on {}: {}", url, image);
        }

        story.push(Element::PageBreak);
        Ok(())
    }

    /// Downloads the images the parser is going to ask for on this page.
    /// Download failures only cost the image, never the page.
    async fn load_images(&mut self, events: &[MarkupEvent]) {
        for source in image_sources(events, &self.settings.markers) {
            if self.images.contains(&source) {
                continue;
            }
            let image_url = match Url::parse(&source) {
                Ok(image_url) => image_url,
                Err(e) => {
                    self.images.record_failure(&source, e.to_string());
                    continue;
                }
            };
            match self.fetcher.fetch_bytes(&image_url).await {
                Ok(bytes) => self.images.load(&source, bytes),
                Err(e) => self.images.record_failure(&source, e.to_string()),
            }
        }
    }

    fn resolve(&self, base: &Url, href: &str) -> Result<Url, CrawlError> {
        base.join(href).map_err(|source| CrawlError::Link {
            base: base.to_string(),
            href: href.to_string(),
            source,
        })
    }
}

/// Rewrites every `img` `src` to an absolute URL so images are identified
/// the same way no matter which page referenced them.
fn absolutize_image_sources(events: &mut [MarkupEvent], base: &Url) {
    for event in events {
        let MarkupEvent::Start(tag) = event else {
            continue;
        };
        if tag.name != "img" {
            continue;
        }
        for (name, value) in tag.attributes.iter_mut() {
            if name == "src" {
                if let Ok(absolute) = base.join(value) {
                    *value = absolute.to_string();
                }
            }
        }
    }
}

fn page_title(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_sources_become_absolute() {
        let base = Url::parse("http://help.example.com/knowledgebase/articles/1-intro").unwrap();
        let mut events = markup::tokenize(r#"<img src="shot.png"><img src="/abs.png"><a href="x">"#);
        absolutize_image_sources(&mut events, &base);
        let sources: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                MarkupEvent::Start(tag) => tag.attr("src").or(tag.attr("href")),
                _ => None,
            })
            .collect();
        assert_eq!(
            sources,
            vec![
                "http://help.example.com/knowledgebase/articles/shot.png",
                "http://help.example.com/abs.png",
                "x",
            ]
        );
    }

    #[test]
    fn title_is_read_from_head() {
        assert_eq!(
            page_title("<html><head><title>  Skipper\n Help </title></head></html>"),
            Some("Skipper Help".to_string())
        );
        assert_eq!(page_title("<p>no title</p>"), None);
    }
}
