//! Resilient paginated retrieval of unbounded result sets.
//!
//! The fetcher advances an offset/limit window until a page comes back
//! empty. Every transport or protocol failure is treated as transient: the
//! error is surfaced through the progress channel, the fetcher sleeps for a
//! fixed cooldown, then retries the same window. There is no retry cap:
//! the remote service is known to rate-limit, and an eventually-complete
//! harvest is preferred to data loss.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::harvest::place::Place;
use crate::progress::{ProgressObserver, ProgressUpdate};
use crate::sparql::client::SparqlClient;
use crate::sparql::query::PlaceQuery;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default rows requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 20_000;

/// Default cooldown before retrying a failed page.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Paging and retry parameters.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Rows requested per page.
    pub page_size: u64,
    /// Sleep between a failed page and its retry.
    pub cooldown: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }
}

/// Outcome of a completed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Rows returned by the endpoint across all pages.
    pub retrieved: u64,
    /// Rows dropped during place construction (missing or NAN coordinates).
    pub skipped: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// PagedFetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Issues a parametrized query page by page, handing each valid place to a
/// caller-supplied consumer as it arrives.
pub struct PagedFetcher {
    client: SparqlClient,
    config: FetchConfig,
}

impl PagedFetcher {
    /// Creates a fetcher with default paging and retry parameters.
    pub fn new(client: SparqlClient) -> Self {
        Self {
            client,
            config: FetchConfig::default(),
        }
    }

    /// Overrides paging and retry parameters.
    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetches every page of `query`, streaming places into `on_place`.
    ///
    /// The offset advances by the number of rows each page actually
    /// returned, never by the requested page size, so a short non-empty
    /// page continues the loop correctly; only a truly empty page stops it.
    ///
    /// `country_label` supplies the group key for compact queries whose
    /// bindings carry no `country` column.
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled` - the token fired; callers still flush sinks
    /// - any error returned by `on_place` (row consumer), unchanged
    ///
    /// Transport and endpoint failures never surface here; they are
    /// reported to the observer and retried after the cooldown.
    pub async fn fetch_all<F>(
        &self,
        query: &PlaceQuery,
        country_label: Option<&str>,
        mut on_place: F,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<FetchSummary, AppError>
    where
        F: FnMut(Place) -> Result<(), AppError>,
    {
        let mut offset: u64 = 0;
        let mut retrieved: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let rendered = query.render(offset, self.config.page_size);

            let page = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                result = self.client.select(&rendered) => result,
            };

            let bindings = match page {
                Ok(bindings) => bindings,
                Err(e) => {
                    warn!(offset, error = %e, "page fetch failed, cooling down before retry");
                    observer.update(ProgressUpdate::message(format!(
                        "error at offset {}: {} (retrying in {}s)",
                        offset,
                        e,
                        self.config.cooldown.as_secs()
                    )));
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(self.config.cooldown) => {}
                    }
                    continue;
                }
            };

            if bindings.is_empty() {
                break;
            }

            let page_rows = bindings.len() as u64;
            for binding in &bindings {
                match Place::from_binding(binding, country_label) {
                    Some(place) => on_place(place)?,
                    None => skipped += 1,
                }
            }

            offset += page_rows;
            retrieved += page_rows;
            observer.update(ProgressUpdate::count(retrieved));
        }

        info!(retrieved, skipped, "fetch complete");
        Ok(FetchSummary { retrieved, skipped })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
