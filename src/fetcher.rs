use std::future::Future;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use colored::*;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::{FetchError, FetchErrorKind};

/// Source of raw pages and image bytes for the crawler.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn fetch_markup(&self, url: &Url) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt limit; `None` waits forever.
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout_seconds: f64, retries: u32) -> Self {
        let timeout = (timeout_seconds > 0.0).then(|| Duration::from_secs_f64(timeout_seconds));
        Self {
            timeout,
            retries,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(30.0, 2)
    }
}

/// Runs `attempt` until it succeeds, doubling the pause between failures.
/// Every attempt is bounded by the policy's timeout.
pub async fn with_retries<T, F, Fut>(url: &Url, policy: &RetryPolicy, mut attempt: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchErrorKind>>,
{
    let mut backoff = policy.initial_backoff;
    let mut failures = 0;
    loop {
        let outcome = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(FetchErrorKind::Timeout(limit.as_secs_f64())),
            },
            None => attempt().await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(kind) if failures < policy.retries => {
                failures += 1;
                warn!(
                    "Attempt {} for {} failed ({}), retrying in {:?}",
                    failures,
                    url.as_str().yellow(),
                    kind,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(kind) => return Err(FetchError::new(url.as_str(), kind)),
        }
    }
}

/// Reads the body of the document the page is showing. Run on a page that
/// was navigated to the resource itself, the request is same-origin.
const READ_CURRENT_DOCUMENT_JS: &str = r#"
    (async () => {
        const response = await fetch(location.href);
        if (!response.ok) {
            throw new Error('HTTP ' + response.status);
        }
        const buffer = await response.arrayBuffer();
        return Array.from(new Uint8Array(buffer));
    })()
"#;

/// Fetches through a headless Chromium so that pages rendered by script
/// come back the way a reader sees them.
pub struct BrowserFetcher {
    browser: Browser,
    page: Page,
    /// Navigated straight to each image, so images on other hosts load too.
    image_page: Page,
    handler: JoinHandle<()>,
    policy: RetryPolicy,
}

impl BrowserFetcher {
    pub async fn launch(policy: RetryPolicy, headful: bool) -> Result<Self, FetchError> {
        let launch_error = |e: String| FetchError::new("about:blank", FetchErrorKind::Browser(e));

        let mut builder = BrowserConfig::builder().window_size(1920, 1080);
        if headful {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| launch_error(format!("Failed to create browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| launch_error(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Only log if it's not a common websocket deserialization error
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| launch_error(format!("Failed to create new page: {}", e)))?;
        let image_page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| launch_error(format!("Failed to create image page: {}", e)))?;

        Ok(Self {
            browser,
            page,
            image_page,
            handler,
            policy,
        })
    }

    pub async fn close(mut self) {
        self.browser.close().await.ok();
        self.handler.abort();
    }

    async fn load(&self, url: &Url) -> Result<String, FetchErrorKind> {
        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| FetchErrorKind::Browser(format!("Failed to navigate: {}", e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| FetchErrorKind::Browser(format!("Failed to wait for navigation: {}", e)))?;
        self.page
            .content()
            .await
            .map_err(|e| FetchErrorKind::Browser(format!("Failed to get page content: {}", e)))
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchErrorKind> {
        self.image_page
            .goto(url.as_str())
            .await
            .map_err(|e| FetchErrorKind::Browser(format!("Failed to open image: {}", e)))?;

        let result = self
            .image_page
            .evaluate(READ_CURRENT_DOCUMENT_JS)
            .await
            .map_err(|e| FetchErrorKind::Response(format!("Failed to download: {}", e)))?;
        result
            .into_value::<Vec<u8>>()
            .map_err(|e| FetchErrorKind::Response(format!("Unexpected download payload: {}", e)))
    }
}

impl Fetch for BrowserFetcher {
    async fn fetch_markup(&self, url: &Url) -> Result<String, FetchError> {
        with_retries(url, &self.policy, || self.load(url)).await
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        with_retries(url, &self.policy, || self.download(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn url() -> Url {
        Url::parse("http://help.example.com/knowledgebase").unwrap()
    }

    fn quick_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Some(Duration::from_millis(50)),
            retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Cell::new(0);
        let result = with_retries(&url(), &quick_policy(2), || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err(FetchErrorKind::Response("503".into()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_last_retry() {
        let calls = Cell::new(0);
        let result: Result<(), FetchError> = with_retries(&url(), &quick_policy(1), || {
            calls.set(calls.get() + 1);
            async { Err(FetchErrorKind::Response("500".into())) }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.url, "http://help.example.com/knowledgebase");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn image_download_reads_the_page_own_location() {
        assert!(READ_CURRENT_DOCUMENT_JS.contains("fetch(location.href)"));
        assert!(!READ_CURRENT_DOCUMENT_JS.contains("http"));
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let result: Result<(), FetchError> = with_retries(&url(), &quick_policy(0), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result.unwrap_err().kind, FetchErrorKind::Timeout(_)));
    }
}
