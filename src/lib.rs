//! # helpdesk2pdf
//!
//! A CLI utility to crawl a hierarchical help site (menu → submenu →
//! article pages) into a single two-column PDF manual.
//!
//! ## How it works
//!
//! - The crawler walks the root menu, each section's submenu and every
//!   article, one page at a time
//! - A stack parser turns each article's body into a story of headings,
//!   paragraphs, images and breaks
//! - The assembler paginates the story behind a title page and a table of
//!   contents whose page numbers come from a previous layout pass
//!
//! ## Usage
//!
//! ```bash
//! helpdesk2pdf build http://help.tryskipper.com --title "Skipper User Manual"
//! ```

mod assembler;
mod config;
mod crawler;
mod error;
mod fetcher;
mod images;
mod layout;
mod manual;
mod markup;
mod metrics;
mod page_parser;
mod pdf_writer;
mod story;

pub use assembler::{Assembler, AssemblyReport, MAX_PASSES};
pub use config::{CrawlSettings, SiteConfig};
pub use crawler::{CrawlOutput, Crawler};
pub use error::{CrawlError, FetchError, FetchErrorKind, ImageReadError, ParseError, RenderError};
pub use fetcher::{with_retries, BrowserFetcher, Fetch, RetryPolicy};
pub use images::{scale_to_max_width, ImageLibrary, ImageReader, LoadedImage, MAX_IMAGE_WIDTH};
pub use layout::{
    lay_out, Block, Layout, Page, PageDecorator, PageGeometry, PageNumberFooter, Placed, StyleSheet,
    TocEntry,
};
pub use manual::{build_manual, crawl_site};
pub use markup::{tokenize, MarkupEvent, MarkupHandler, StartTag};
pub use page_parser::{image_sources, parse_page, ContentMarkers, PageParser, ParseFrame, Region};
pub use pdf_writer::PdfWriter;
pub use story::{Element, ParagraphStyle, Story, INCH};
