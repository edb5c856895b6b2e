use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, StatusCode};
use thiserror::Error;
use url::Url;

use crate::Result;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single GET produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// An HTML page. `url` is where the response came from after redirects.
    Page { url: Url, html: String },
    /// The response was not HTML; the body was never read.
    NotHtml { content_type: Option<String> },
    Failed(FetchError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status)
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            FetchError::Body(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// Issues one GET per call and never retries.
pub struct Requester {
    client: reqwest::Client,
}

impl Requester {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        match self.get_html(url).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn get_html(&self, url: &Url) -> std::result::Result<FetchOutcome, FetchError> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if !content_type.as_deref().map_or(false, is_html) {
            return Ok(FetchOutcome::NotHtml { content_type });
        }

        let url = response.url().clone();
        let html = response.text().await?;
        Ok(FetchOutcome::Page { url, html })
    }
}

fn is_html(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(essence.as_str(), "text/html" | "application/xhtml+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requester() -> Requester {
        Requester::new(Duration::from_secs(2), "site-mapper-test").unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    mod is_html {
        use super::*;

        #[test]
        fn media_types() {
            assert!(is_html("text/html"));
            assert!(is_html("text/html; charset=utf-8"));
            assert!(is_html("TEXT/HTML;charset=UTF-8"));
            assert!(is_html("application/xhtml+xml"));
            assert!(!is_html("application/json"));
            assert!(!is_html("text/plain"));
            assert!(!is_html("text/htmlx"));
            assert!(!is_html(""));
        }
    }

    mod fetch {
        use super::*;

        #[tokio::test]
        async fn returns_html_pages() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/page")
                .with_header("content-type", "text/html; charset=utf-8")
                .with_body("<a href=\"/next\">next</a>")
                .create_async()
                .await;

            let page = url(&format!("{}/page", server.url()));
            match requester().fetch(&page).await {
                FetchOutcome::Page { url, html } => {
                    assert_eq!(url, page);
                    assert!(html.contains("/next"));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn reports_final_url_after_redirect() {
            let mut server = mockito::Server::new_async().await;
            let _old = server
                .mock("GET", "/old")
                .with_status(301)
                .with_header("location", "/new/")
                .create_async()
                .await;
            let _new = server
                .mock("GET", "/new/")
                .with_header("content-type", "text/html")
                .with_body("<p>moved</p>")
                .create_async()
                .await;

            let outcome = requester()
                .fetch(&url(&format!("{}/old", server.url())))
                .await;
            match outcome {
                FetchOutcome::Page { url, .. } => assert_eq!(url.path(), "/new/"),
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        #[tokio::test]
        async fn skips_non_html_content() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/data.json")
                .with_header("content-type", "application/json")
                .with_body("{\"a\": \"<a href='/x'>\"}")
                .create_async()
                .await;

            let outcome = requester()
                .fetch(&url(&format!("{}/data.json", server.url())))
                .await;
            match outcome {
                FetchOutcome::NotHtml { content_type } => {
                    assert_eq!(content_type.as_deref(), Some("application/json"))
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        #[tokio::test]
        async fn missing_content_type_is_not_html() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/blob")
                .with_body("<a href=\"/x\">x</a>")
                .create_async()
                .await;

            let outcome = requester()
                .fetch(&url(&format!("{}/blob", server.url())))
                .await;
            assert!(matches!(outcome, FetchOutcome::NotHtml { content_type: None }));
        }

        #[tokio::test]
        async fn classifies_error_statuses() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/missing")
                .with_status(404)
                .with_header("content-type", "text/html")
                .create_async()
                .await;

            let outcome = requester()
                .fetch(&url(&format!("{}/missing", server.url())))
                .await;
            assert!(matches!(
                outcome,
                FetchOutcome::Failed(FetchError::Status(StatusCode::NOT_FOUND))
            ));
        }

        #[tokio::test]
        async fn classifies_refused_connections() {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let outcome = requester()
                .fetch(&url(&format!("http://{addr}/")))
                .await;
            assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Connect(_))));
        }

        #[tokio::test]
        async fn classifies_timeouts() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let _hold = tokio::spawn(async move {
                let mut open = Vec::new();
                while let Ok((socket, _)) = listener.accept().await {
                    open.push(socket);
                }
            });

            let requester = Requester::new(Duration::from_millis(200), "site-mapper-test").unwrap();
            let outcome = requester.fetch(&url(&format!("http://{addr}/"))).await;
            assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Timeout)));
        }
    }
}
