//! Filter, cursor and page-window bookkeeping for the process-instance list.
//!
//! Every trigger snapshots a [`SearchQuery`] under the state lock and tags it
//! with a generation number. The lock is released while the search is in
//! flight; when it completes, the response is applied only if no newer
//! trigger has been issued in the meantime.
//!
//! Paging anchors only on a page fetched under the current filter, and a
//! failed page step restores the cursor and page index it replaced.

use std::{num::NonZeroU32, sync::Arc};

use shared::protocol::{CursorPair, ResourceFilter, ResultPage, SearchQuery};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{error::ClientError, search::ResourceSearch, ClientEvent};

pub const DEFAULT_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(10) {
    Some(size) => size,
    None => unreachable!(),
};

/// What `change_page_size` does with the current cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSizePolicy {
    /// Reset the cursor and page index so the new window starts at the
    /// first page.
    #[default]
    RestartFromFirstPage,
    /// Keep the cursor; the next window may not line up with the previous
    /// one.
    KeepCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub page_size: NonZeroU32,
    pub page_size_policy: PageSizePolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_size_policy: PageSizePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Local display counter, not a server-side page number.
    pub page_index: usize,
    pub page_size: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied(ResultPage),
    /// A newer request was issued before this one resolved.
    Superseded,
    /// Nothing to page from.
    Skipped,
}

struct ListState {
    filter: ResourceFilter,
    cursor: CursorPair,
    page: PageWindow,
    last_result: Option<ResultPage>,
    /// Filter the request behind `last_result` was issued with.
    result_filter: Option<ResourceFilter>,
    generation: u64,
    loading: bool,
}

impl ListState {
    fn issue(&mut self) -> FetchTicket {
        self.generation += 1;
        self.loading = true;
        FetchTicket {
            generation: self.generation,
            page_index: self.page.page_index,
            query: SearchQuery {
                size: self.page.page_size,
                filter: self.filter.clone(),
                cursor: self.cursor.clone(),
            },
            restore: None,
        }
    }

    /// The shown page, if it belongs to the current filter.
    fn anchor_page(&self) -> Option<&ResultPage> {
        match &self.result_filter {
            Some(filter) if *filter == self.filter => self.last_result.as_ref(),
            _ => None,
        }
    }

    fn settle(&mut self, generation: u64) {
        if self.generation == generation {
            self.loading = false;
        }
    }
}

struct FetchTicket {
    generation: u64,
    page_index: usize,
    query: SearchQuery,
    /// Cursor and page index to put back if this page step fails.
    restore: Option<(CursorPair, usize)>,
}

/// Clears `loading` when a fetch future is dropped before it settles.
struct LoadingGuard {
    state: Arc<Mutex<ListState>>,
    generation: u64,
    armed: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        match self.state.try_lock() {
            Ok(mut state) => state.settle(generation),
            Err(_) => {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let state = self.state.clone();
                    handle.spawn(async move {
                        state.lock().await.settle(generation);
                    });
                }
            }
        }
    }
}

pub struct ResourceListController {
    search: Arc<dyn ResourceSearch>,
    page_size_policy: PageSizePolicy,
    state: Arc<Mutex<ListState>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ResourceListController {
    pub fn new(search: Arc<dyn ResourceSearch>, options: ControllerOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            search,
            page_size_policy: options.page_size_policy,
            state: Arc::new(Mutex::new(ListState {
                filter: ResourceFilter::default(),
                cursor: CursorPair::empty(),
                page: PageWindow {
                    page_index: 0,
                    page_size: options.page_size,
                },
                last_result: None,
                result_filter: None,
                generation: 0,
                loading: false,
            })),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn filter(&self) -> ResourceFilter {
        self.state.lock().await.filter.clone()
    }

    pub async fn cursor(&self) -> CursorPair {
        self.state.lock().await.cursor.clone()
    }

    pub async fn page(&self) -> PageWindow {
        self.state.lock().await.page
    }

    pub async fn last_result(&self) -> Option<ResultPage> {
        self.state.lock().await.last_result.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    /// Replaces the filter and restarts from the first page.
    pub async fn apply_filter(&self, filter: ResourceFilter) -> Result<FetchOutcome, ClientError> {
        let ticket = {
            let mut state = self.state.lock().await;
            state.filter = filter;
            state.page.page_index = 0;
            state.cursor = CursorPair::empty();
            state.issue()
        };
        self.fetch(ticket).await
    }

    pub async fn go_to_next_page(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = {
            let mut state = self.state.lock().await;
            let Some(last_key) = state.anchor_page().and_then(ResultPage::last_key) else {
                debug!("resource list: no page to advance from");
                return Ok(FetchOutcome::Skipped);
            };
            let restore = (state.cursor.clone(), state.page.page_index);
            state.cursor = CursorPair::after(last_key);
            state.page.page_index += 1;
            FetchTicket {
                restore: Some(restore),
                ..state.issue()
            }
        };
        self.fetch(ticket).await
    }

    pub async fn go_to_prev_page(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = {
            let mut state = self.state.lock().await;
            let Some(first_key) = state.anchor_page().and_then(ResultPage::first_key) else {
                debug!("resource list: no page to step back from");
                return Ok(FetchOutcome::Skipped);
            };
            let restore = (state.cursor.clone(), state.page.page_index);
            state.cursor = CursorPair::before(first_key);
            state.page.page_index = state.page.page_index.saturating_sub(1);
            FetchTicket {
                restore: Some(restore),
                ..state.issue()
            }
        };
        self.fetch(ticket).await
    }

    pub async fn change_page_size(&self, size: NonZeroU32) -> Result<FetchOutcome, ClientError> {
        let ticket = {
            let mut state = self.state.lock().await;
            state.page.page_size = size;
            if self.page_size_policy == PageSizePolicy::RestartFromFirstPage {
                state.cursor = CursorPair::empty();
                state.page.page_index = 0;
            }
            state.issue()
        };
        self.fetch(ticket).await
    }

    /// Refetches the current window unchanged.
    pub async fn refresh(&self) -> Result<FetchOutcome, ClientError> {
        let ticket = self.state.lock().await.issue();
        self.fetch(ticket).await
    }

    async fn fetch(&self, ticket: FetchTicket) -> Result<FetchOutcome, ClientError> {
        debug!(
            generation = ticket.generation,
            page_index = ticket.page_index,
            size = ticket.query.size.get(),
            "resource list: fetching"
        );
        let mut guard = LoadingGuard {
            state: self.state.clone(),
            generation: ticket.generation,
            armed: true,
        };
        let result = self.search.search(&ticket.query).await;

        let mut state = self.state.lock().await;
        guard.armed = false;
        if state.generation != ticket.generation {
            debug!(
                generation = ticket.generation,
                latest = state.generation,
                "resource list: discarding superseded response"
            );
            return Ok(FetchOutcome::Superseded);
        }
        state.loading = false;

        match result {
            Ok(page) => {
                info!(
                    page_index = ticket.page_index,
                    items = page.items.len(),
                    total = page.total,
                    "resource list: page loaded"
                );
                state.last_result = Some(page.clone());
                state.result_filter = Some(ticket.query.filter);
                let _ = self.events.send(ClientEvent::PageLoaded {
                    page_index: ticket.page_index,
                    items: page.items.len(),
                    total: page.total,
                });
                Ok(FetchOutcome::Applied(page))
            }
            Err(err) => {
                if let Some((cursor, page_index)) = ticket.restore {
                    state.cursor = cursor;
                    state.page.page_index = page_index;
                }
                warn!(error = %err, "resource list: fetch failed; keeping previous page");
                let _ = self.events.send(ClientEvent::FetchFailed(err.to_string()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
