use std::cell::RefCell;
use std::collections::HashMap;

use helpdesk2pdf::{
    build_manual, crawl_site, Element, Fetch, FetchError, FetchErrorKind, ParagraphStyle,
    SiteConfig,
};
use url::Url;

const ROOT: &str = "http://help.example.com";

/// Serves canned pages and records every URL asked for.
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    requests: RefCell<Vec<String>>,
}

impl FakeSite {
    fn page(mut self, path: &str, body: &str) -> Self {
        self.pages.insert(format!("{ROOT}{path}"), body.to_string());
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetch for FakeSite {
    async fn fetch_markup(&self, url: &Url) -> Result<String, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages.get(url.as_str()).cloned().ok_or_else(|| {
            FetchError::new(url.as_str(), FetchErrorKind::Response("404".to_string()))
        })
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        Err(FetchError::new(
            url.as_str(),
            FetchErrorKind::Response("no images here".to_string()),
        ))
    }
}

fn menu(sections: &[(&str, &str)]) -> String {
    let items: String = sections
        .iter()
        .map(|(title, href)| format!(r#"<h2><a href="{href}">{title}</a></h2>"#))
        .collect();
    format!("<html><head><title>Example Help</title></head><body>{items}</body></html>")
}

fn submenu(articles: &[(&str, &str)]) -> String {
    let items: String = articles
        .iter()
        .map(|(title, href)| {
            format!(r#"<li><h2 class="uvListItemHeader"><a href="{href}">{title}</a></h2></li>"#)
        })
        .collect();
    format!("<html><body><ul>{items}</ul></body></html>")
}

fn article(title: &str, text: &str) -> String {
    format!(
        r#"<html><body><nav>Home</nav><section class="uvFaq"><h1>{title}</h1><p>{text}</p></section><footer>Contact</footer></body></html>"#
    )
}

fn config() -> SiteConfig {
    SiteConfig {
        root_url: ROOT.to_string(),
        ..SiteConfig::default()
    }
}

fn basic_site() -> FakeSite {
    FakeSite::default()
        .page(
            "/knowledgebase",
            &menu(&[
                ("Basics", "/knowledgebase/topics/1-basics"),
                ("Video Tutorials", "/knowledgebase/topics/2-videos"),
            ]),
        )
        .page(
            "/knowledgebase/topics/1-basics",
            &submenu(&[
                ("Getting started", "/knowledgebase/articles/10-getting-started"),
                ("Intro video", "/knowledgebase/articles/11-intro-video"),
            ]),
        )
        .page(
            "/knowledgebase/articles/10-getting-started",
            &article("Getting started", "Open the app and sign in."),
        )
}

#[tokio::test]
async fn story_follows_menu_then_articles() {
    let site = basic_site();
    let crawl = crawl_site(&site, &config()).await.unwrap();

    assert_eq!(crawl.site_title.as_deref(), Some("Example Help"));
    assert_eq!(
        crawl.story.elements(),
        &[
            Element::heading(1, "Basics"),
            Element::heading(2, "Getting started"),
            Element::paragraph("Open the app and sign in.", ParagraphStyle::Normal),
            Element::PageBreak,
        ]
    );
}

#[tokio::test]
async fn excluded_sections_and_urls_are_never_fetched() {
    let site = basic_site();
    crawl_site(&site, &config()).await.unwrap();

    assert_eq!(
        site.requests(),
        vec![
            format!("{ROOT}/knowledgebase"),
            format!("{ROOT}/knowledgebase/topics/1-basics"),
            format!("{ROOT}/knowledgebase/articles/10-getting-started"),
        ]
    );
}

#[tokio::test]
async fn missing_page_aborts_the_crawl() {
    let site = FakeSite::default()
        .page("/knowledgebase", &menu(&[("Basics", "/knowledgebase/topics/1-basics")]))
        .page(
            "/knowledgebase/topics/1-basics",
            &submenu(&[("Gone", "/knowledgebase/articles/404-gone")]),
        );

    let err = crawl_site(&site, &config()).await.unwrap_err();
    assert!(format!("{err:#}").contains("/knowledgebase/articles/404-gone"));
}

#[tokio::test]
async fn article_linked_twice_appears_twice() {
    let site = FakeSite::default()
        .page(
            "/knowledgebase",
            &menu(&[
                ("Basics", "/knowledgebase/topics/1-basics"),
                ("Advanced", "/knowledgebase/topics/2-advanced"),
            ]),
        )
        .page(
            "/knowledgebase/topics/1-basics",
            &submenu(&[("Shared", "/knowledgebase/articles/7-shared")]),
        )
        .page(
            "/knowledgebase/topics/2-advanced",
            &submenu(&[("Shared", "/knowledgebase/articles/7-shared")]),
        )
        .page("/knowledgebase/articles/7-shared", &article("Shared", "Same text."));

    let crawl = crawl_site(&site, &config()).await.unwrap();
    let shared = crawl
        .story
        .elements()
        .iter()
        .filter(|element| **element == Element::heading(2, "Shared"))
        .count();
    assert_eq!(shared, 2);
}

#[tokio::test]
async fn failed_image_download_only_drops_the_image() {
    let site = FakeSite::default()
        .page("/knowledgebase", &menu(&[("Basics", "/knowledgebase/topics/1-basics")]))
        .page(
            "/knowledgebase/topics/1-basics",
            &submenu(&[("Pictures", "/knowledgebase/articles/3-pictures")]),
        )
        .page(
            "/knowledgebase/articles/3-pictures",
            r#"<section class="uvFaq"><p>Before <img src="shot.png"> after</p></section>"#,
        );

    let crawl = crawl_site(&site, &config()).await.unwrap();
    assert!(site
        .requests()
        .contains(&format!("{ROOT}/knowledgebase/articles/shot.png")));
    assert!(!crawl
        .story
        .elements()
        .iter()
        .any(|element| matches!(element, Element::Image { .. })));
}

#[tokio::test]
async fn build_writes_a_paginated_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("manual.pdf");
    let site = basic_site();
    let config = SiteConfig {
        title: Some("Example User Manual".to_string()),
        output: Some(output.clone()),
        ..config()
    };

    let report = build_manual(&site, &config).await.unwrap();

    // Title page, contents page, one article page.
    assert_eq!(report.pages, 3);
    assert_eq!(report.toc.len(), 2);
    assert_eq!(report.toc[0].text, "Basics");
    assert_eq!(report.toc[0].page, 3);

    let doc = lopdf::Document::load(&output).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
    assert!(!dir.path().join(".manual.pdf.partial").exists());
}
