//! Typed client for the process-engine administration backend.

pub mod controller;
pub mod error;
mod operations;
pub mod search;
pub mod session;
pub mod transport;

pub use controller::{
    ControllerOptions, FetchOutcome, PageSizePolicy, PageWindow, ResourceListController,
    DEFAULT_PAGE_SIZE,
};
pub use error::ClientError;
pub use search::ResourceSearch;
pub use session::SessionStore;
pub use transport::{ApiClient, ApiClientConfig, Endpoints};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    RequestStarted {
        path: String,
    },
    RequestFinished {
        path: String,
        status: Option<u16>,
    },
    /// The server rejected the session token; it has been cleared.
    SessionExpired,
    PageLoaded {
        page_index: usize,
        items: usize,
        total: u64,
    },
    FetchFailed(String),
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
