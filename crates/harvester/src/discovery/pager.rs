//! Page-by-page search discovery.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::github::{
    RateLimitedClient, Result, SearchResponse, convert, decode_json, parse_link_header,
};
use crate::progress::{HarvestProgress, ProgressCallback, emit};
use crate::resource::ResourceDescriptor;

use super::query::SearchQuery;

/// Cursor over search result pages.
///
/// A pager is consumed once; a new discovery always starts at page 1.
pub struct SearchPager {
    client: RateLimitedClient,
    query: SearchQuery,
    next: Option<u32>,
    pages_fetched: u32,
    produced: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl SearchPager {
    pub fn new(client: RateLimitedClient, query: SearchQuery) -> Self {
        Self {
            client,
            query,
            next: Some(1),
            pages_fetched: 0,
            produced: 0,
            shutdown_flag: None,
        }
    }

    /// Stop requesting pages once the flag is set.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Descriptors produced so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// URL of a given page.
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}?q={}&per_page={}&page={}",
            self.client.endpoint("search/repositories"),
            self.query.to_query_param(),
            self.client.config().page_size,
            page
        )
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the results are exhausted. Pages after the
    /// first are preceded by the configured inter-page delay.
    pub async fn next_page(
        &mut self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Option<Vec<ResourceDescriptor>>> {
        let Some(page) = self.next else {
            return Ok(None);
        };
        if self.is_shutdown() {
            tracing::info!(page, "Shutdown requested, stopping discovery");
            self.next = None;
            return Ok(None);
        }
        if self.pages_fetched > 0 {
            tokio::time::sleep(self.client.config().page_delay).await;
        }

        let url = self.page_url(page);
        let response = match self.client.get(&url).await {
            Ok(response) => response,
            Err(e) => {
                self.next = None;
                return Err(e);
            }
        };
        self.pages_fetched += 1;
        let links = response
            .header("link")
            .map(parse_link_header)
            .unwrap_or_default();
        let body: SearchResponse = match decode_json(&response) {
            Ok(body) => body,
            Err(e) => {
                self.next = None;
                return Err(e);
            }
        };

        if body.total_count == 0 {
            tracing::info!(query = %self.query, "No repositories found");
            self.next = None;
            return Ok(Some(Vec::new()));
        }

        let item_count = body.items.len();
        let mut descriptors = Vec::with_capacity(item_count);
        for item in body.items {
            let full_name = item.full_name.clone();
            match convert::to_descriptor(item) {
                Some(descriptor) => descriptors.push(descriptor),
                None => {
                    tracing::warn!(repo = %full_name, "Skipping search result without clone URL");
                    emit(
                        on_progress,
                        HarvestProgress::Warning {
                            message: format!("{full_name} has no clone URL, skipped"),
                        },
                    );
                }
            }
        }
        self.produced += descriptors.len();

        self.next = match links.next_page {
            Some(next) if item_count > 0 => Some(next),
            _ => None,
        };

        tracing::debug!(
            page,
            count = descriptors.len(),
            total_count = body.total_count,
            has_next = self.next.is_some(),
            "Fetched search page"
        );
        emit(
            on_progress,
            HarvestProgress::PageFetched {
                page,
                count: descriptors.len(),
                total_count: body.total_count,
                total_so_far: self.produced,
            },
        );

        Ok(Some(descriptors))
    }

    /// Collect every descriptor across all pages.
    #[tracing::instrument(skip_all, fields(query = %self.query))]
    pub async fn discover_all(
        mut self,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<ResourceDescriptor>> {
        emit(
            on_progress,
            HarvestProgress::DiscoveryStarted {
                query: self.query.to_human(),
            },
        );
        let mut all = Vec::new();
        while let Some(page) = self.next_page(on_progress).await? {
            all.extend(page);
        }
        emit(
            on_progress,
            HarvestProgress::DiscoveryComplete { total: all.len() },
        );
        Ok(all)
    }

    /// Push descriptors into `tx` as pages arrive.
    ///
    /// Returns the number sent. Stops early, without error, when the receiver
    /// is dropped.
    #[tracing::instrument(skip_all, fields(query = %self.query))]
    pub async fn discover_streaming(
        mut self,
        tx: mpsc::Sender<ResourceDescriptor>,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<usize> {
        emit(
            on_progress,
            HarvestProgress::DiscoveryStarted {
                query: self.query.to_human(),
            },
        );
        let mut sent = 0usize;
        'pages: while let Some(page) = self.next_page(on_progress).await? {
            for descriptor in page {
                if tx.send(descriptor).await.is_err() {
                    tracing::debug!("Receiver dropped, stopping discovery");
                    break 'pages;
                }
                sent += 1;
            }
        }
        emit(on_progress, HarvestProgress::DiscoveryComplete { total: sent });
        Ok(sent)
    }
}
