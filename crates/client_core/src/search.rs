use async_trait::async_trait;
use shared::protocol::{ResultPage, SearchQuery};

use crate::error::ClientError;

/// Cursor-paginated process-instance search.
#[async_trait]
pub trait ResourceSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<ResultPage, ClientError>;
}
