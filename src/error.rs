//! Error types for crawling and rendering a help site.

use thiserror::Error;

/// A page or image could not be retrieved. Fatal for pages; a failed image
/// is only left out.
#[derive(Error, Debug)]
#[error("failed to fetch {url}: {kind}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

#[derive(Error, Debug)]
pub enum FetchErrorKind {
    #[error("timed out after {0:.1}s")]
    Timeout(f64),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("unexpected response: {0}")]
    Response(String),
}

impl FetchError {
    pub fn new(url: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Markup that the stack parser or the menu walkers cannot make sense of.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("end tag </{tag}> has no matching open tag")]
    MalformedMarkup { tag: String },

    #[error("<{tag}> is missing its `{attribute}` attribute")]
    MissingAttribute { tag: String, attribute: String },
}

/// An image that could not be sized. Recoverable: the image is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot read image {image}: {reason}")]
pub struct ImageReadError {
    pub image: String,
    pub reason: String,
}

impl ImageReadError {
    pub fn new(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal crawl failure, tagged with the page that caused it.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed page {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid link {href:?} on {base}: {source}")]
    Link {
        base: String,
        href: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("missing image data for {0}")]
    MissingImage(String),
}
