use std::time::Duration;

use reqwest::Client;
use scraper::Html;

use crate::error::{AppError, Result};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// A fetched HTML page. Parsing happens on demand because `Html` is not `Send`
/// and must not live across an await point.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Resolve a potentially relative href against this page's URL.
    pub fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }

        if let Ok(base) = url::Url::parse(&self.url) {
            if let Ok(resolved) = base.join(href) {
                return resolved.to_string();
            }
        }

        href.to_string()
    }
}

pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// `timeout` bounds a whole request; `None` keeps reqwest's default.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT_STRING);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client })
    }

    /// Single GET. Any non-2xx status is an error carrying the URL and status.
    pub async fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                url: url.to_string(),
                status,
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        tracing::debug!(url, bytes = body.len(), "fetched page");

        Ok(Page {
            url: final_url,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> PageFetcher {
        PageFetcher::new(Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn returns_body_for_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/list")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><body><p>Привет</p></body></html>")
            .create_async()
            .await;

        let page = fetcher()
            .fetch_page(&format!("{}/list", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(page.body.contains("Привет"));
        let doc = page.document();
        let p = scraper::Selector::parse("p").unwrap();
        assert_eq!(doc.select(&p).count(), 1);
    }

    #[tokio::test]
    async fn non_success_status_carries_url_and_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/gone", server.url());
        match fetcher().fetch_page(&url).await {
            Err(AppError::Status { url: failed, status }) => {
                assert_eq!(failed, url);
                assert_eq!(status.as_u16(), 404);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn builds_without_a_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let page = PageFetcher::new(None)
            .unwrap()
            .fetch_page(&server.url())
            .await
            .unwrap();
        assert_eq!(page.body, "ok");
    }

    #[test]
    fn resolves_relative_links() {
        let page = Page {
            url: "https://example.com/posts/index.html".to_string(),
            body: String::new(),
        };
        assert_eq!(page.resolve("/p/1"), "https://example.com/p/1");
        assert_eq!(page.resolve("2"), "https://example.com/posts/2");
        assert_eq!(page.resolve("http://other.org/x"), "http://other.org/x");
    }
}
