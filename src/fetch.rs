use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::feed::FeedItem;

const CONCURRENCY: usize = 4;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const TIMEOUT_SECS: u64 = 30;

/// One fetched detail page. `html` and `error` are mutually exclusive.
#[derive(Debug)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub html: Option<String>,
    pub error: Option<String>,
}

pub fn client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .user_agent(concat!("ausfall_scraper/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")
}

/// Fetch detail pages with bounded fan-out, streaming results back over a
/// channel. Failed pages come back with `error` set instead of aborting the
/// batch.
pub async fn fetch_pages(client: &Client, items: Vec<FeedItem>) -> Result<Vec<FetchedPage>> {
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = items.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(CONCURRENCY * 2);

    for item in items {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire().await;
            let page = match fetch_with_retry(&client, &item.url).await {
                Ok(html) => FetchedPage {
                    url: item.url,
                    title: item.title,
                    html: Some(html),
                    error: None,
                },
                Err(e) => {
                    warn!("Fetch failed for {}: {e:#}", item.url);
                    FetchedPage {
                        url: item.url,
                        title: item.title,
                        html: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            let _ = tx.send(page).await;
        });
    }
    drop(tx);

    let mut pages = Vec::with_capacity(total);
    while let Some(page) = rx.recv().await {
        pb.inc(1);
        pages.push(page);
    }
    pb.finish_and_clear();
    Ok(pages)
}

/// Fetch a single page without the batch machinery.
pub async fn fetch_one(client: &Client, url: &str) -> Result<String> {
    fetch_with_retry(client, url).await
}

async fn fetch_with_retry(client: &Client, url: &str) -> Result<String> {
    for attempt in 0..=MAX_RETRIES {
        let resp = client.get(url).send().await;
        let retryable = match &resp {
            Ok(r) => {
                let status = r.status();
                status.as_u16() == 429 || status.is_server_error()
            }
            Err(e) => e.is_timeout() || e.is_connect(),
        };

        if !retryable || attempt == MAX_RETRIES {
            return Ok(resp?
                .error_for_status()?
                .text()
                .await
                .with_context(|| format!("reading body of {url}"))?);
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Retrying {} (attempt {}/{}), backing off {:.1}s",
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }
    unreachable!("retry loop always returns at the last attempt");
}
