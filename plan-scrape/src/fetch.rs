//! Retrieval layer
//!
//! The only gateway for remote documents and legacy-database rows.
//!
//! HTTP fetches are cache-aside: the cache key is a SHA-256 of the method,
//! the URL (query included) and, for POST, the encoded form body. A hit
//! returns the stored text with no network call. A miss issues the request
//! under the client timeout and stores a successful non-empty body.
//! `bypass_cache` always goes to the network but still refreshes the entry.
//!
//! Nothing here raises on transport or decode failure. Failures are logged
//! and the caller gets `None` or an empty value: "no data".

use crate::error::{ScrapeError, ScrapeResult};
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = concat!("plan-scrape/", env!("CARGO_PKG_VERSION"));

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Pairs URL-encoded and appended to the URL
    pub query: Vec<(String, String)>,
    /// Form body; when present the request is a POST
    pub form: Option<Vec<(String, String)>>,
    /// Skip the cache lookup (the response is still cached)
    pub bypass_cache: bool,
    /// Log fetches at INFO instead of DEBUG
    pub verbose: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Cache key for a GET of `url`
pub fn get_cache_key(url: &str) -> String {
    hash_key(&format!("get||{}", url))
}

/// Cache key for a POST of `encoded_body` to `url`
pub fn post_cache_key(url: &str, encoded_body: &str) -> String {
    hash_key(&format!("post||{}||{}", url, encoded_body))
}

fn hash_key(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Scrape cache backed by the `scrape_cache` table
///
/// Best effort: store errors are logged and read as misses. Concurrent
/// writers of one key race harmlessly, last write wins.
#[derive(Debug, Clone)]
pub struct ScrapeCache {
    pool: SqlitePool,
}

impl ScrapeCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let result = sqlx::query_scalar::<_, String>("SELECT value FROM scrape_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Scrape cache read failed");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) {
        let result = sqlx::query(
            "INSERT INTO scrape_cache (key, value, cached_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, cached_at = excluded.cached_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(key, error = %e, "Scrape cache write failed");
        }
    }
}

/// HTTP client with cache-aside semantics
///
/// Build once per process and share by reference.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http_client: reqwest::Client,
    cache: ScrapeCache,
}

impl Fetcher {
    pub fn new(cache: ScrapeCache, timeout: Duration) -> ScrapeResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Client(e.to_string()))?;

        Ok(Self { http_client, cache })
    }

    /// Fetch a URL as text
    pub async fn plain(&self, url: &str, options: &FetchOptions) -> Option<String> {
        let url = match append_query(url, &options.query) {
            Ok(url) => url,
            Err(e) => {
                error!(url, error = %e, "Loading failed: could not encode query");
                return None;
            }
        };

        let body = match &options.form {
            Some(form) => match serde_urlencoded::to_string(form) {
                Ok(body) => Some(body),
                Err(e) => {
                    error!(url = %url, error = %e, "Loading failed: could not encode form");
                    return None;
                }
            },
            None => None,
        };

        let key = match &body {
            Some(body) => post_cache_key(&url, body),
            None => get_cache_key(&url),
        };

        if !options.bypass_cache {
            if let Some(cached) = self.cache.get(&key).await {
                log_fetch(options.verbose, "Cached fetch", &url);
                return Some(cached);
            }
        }

        let request = match &body {
            Some(body) => self
                .http_client
                .post(&url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body.clone()),
            None => self.http_client.get(&url),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, error = %e, "Loading failed");
                return None;
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                error!(url = %url, error = %e, "Loading failed: unreadable body");
                return None;
            }
        };

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Loading failed: unexpected status");
            return None;
        }

        if text.is_empty() {
            warn!(url = %url, "Loading returned an empty body");
            return None;
        }

        self.cache.set(&key, &text).await;
        log_fetch(options.verbose, "Fetched", &url);

        Some(text)
    }

    /// Fetch and parse an HTML document
    pub async fn html(&self, url: &str, options: &FetchOptions) -> Option<scraper::Html> {
        self.plain(url, options)
            .await
            .map(|text| scraper::Html::parse_document(&text))
    }

    /// Fetch and parse an XML document
    pub async fn xml(&self, url: &str, options: &FetchOptions) -> Option<xmltree::Element> {
        let text = self.plain(url, options).await?;
        match xmltree::Element::parse(text.as_bytes()) {
            Ok(root) => Some(root),
            Err(e) => {
                error!(url, error = %e, "Loading failed: malformed XML");
                None
            }
        }
    }

    /// Fetch and decode JSON; failures yield an empty object
    pub async fn json(&self, url: &str, options: &FetchOptions) -> serde_json::Value {
        let empty = serde_json::Value::Object(serde_json::Map::new());

        let Some(text) = self.plain(url, options).await else {
            error!(url, "Loading failed: empty response");
            return empty;
        };

        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                error!(url, error = %e, "Loading failed: malformed JSON");
                empty
            }
        }
    }
}

fn log_fetch(verbose: bool, what: &str, url: &str) {
    if verbose {
        info!("{}: {}", what, url);
    } else {
        debug!("{}: {}", what, url);
    }
}

fn append_query(url: &str, query: &[(String, String)]) -> Result<String, serde_urlencoded::ser::Error> {
    if query.is_empty() {
        return Ok(url.to_string());
    }

    let encoded = serde_urlencoded::to_string(query)?;
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}{}", url, separator, encoded))
}

/// One legacy-database row with its values addressed by column name
///
/// Values are read as text; numeric columns are rendered with `to_string`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    fields: Vec<(String, Option<String>)>,
}

impl SourceRow {
    pub fn new(fields: Vec<(String, Option<String>)>) -> Self {
        Self { fields }
    }

    /// Value of a column; None for unknown columns and SQL NULL
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Value of a column with NULL read as ""
    pub fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    fn from_any_row(row: &AnyRow) -> Self {
        let fields = row
            .columns()
            .iter()
            .map(|column| {
                let i = column.ordinal();
                let value = row
                    .try_get::<Option<String>, _>(i)
                    .or_else(|_| row.try_get::<Option<i64>, _>(i).map(|v| v.map(|v| v.to_string())))
                    .or_else(|_| row.try_get::<Option<f64>, _>(i).map(|v| v.map(|v| v.to_string())))
                    .unwrap_or(None);
                (column.name().to_string(), value)
            })
            .collect();

        Self { fields }
    }
}

/// Run a legacy query, yielding rows lazily
///
/// A query or connection error is logged and ends the stream.
pub fn sql<'a>(
    pool: &'a AnyPool,
    query: &'a str,
    params: &'a [String],
) -> impl Stream<Item = SourceRow> + Send + 'a {
    async_stream::stream! {
        let rows = try_sql(pool, query, params);
        futures::pin_mut!(rows);
        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => yield row,
                Err(e) => {
                    error!(query, error = %e, "Legacy query failed");
                    break;
                }
            }
        }
    }
}

/// Run a legacy query, yielding rows lazily and passing errors through
///
/// The stream ends after the first error.
pub fn try_sql<'a>(
    pool: &'a AnyPool,
    query: &'a str,
    params: &'a [String],
) -> impl Stream<Item = Result<SourceRow, sqlx::Error>> + Send + 'a {
    async_stream::stream! {
        let mut bound = sqlx::query(query);
        for param in params {
            bound = bound.bind(param.clone());
        }

        let mut rows = bound.fetch(pool);
        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => yield Ok(SourceRow::from_any_row(&row)),
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}
