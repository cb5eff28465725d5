//! Mock portal navigator for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

use super::fixtures;
use crate::navigator::{DownloadTarget, Listing, NavigatorError, PortalNavigator};

/// Mock implementation of the PortalNavigator trait.
///
/// Provides controllable behavior for testing:
/// - Serve canned listings, newest first
/// - Serve canned file bodies per file name (a sample journal by default)
/// - Fail discovery or individual targets
/// - Record submitted targets for assertions
///
/// # Example
///
/// ```rust,ignore
/// use harvester_core::testing::{fixtures, MockNavigator};
///
/// let navigator = MockNavigator::new();
/// navigator.set_listings(vec![fixtures::listing("2237", fixtures::date(2025, 1, 6))]).await;
/// navigator.fail_target("2237:35-45").await;
/// ```
pub struct MockNavigator {
    listings: Arc<RwLock<Vec<Listing>>>,
    content: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Target identities whose submission fails.
    failing: Arc<RwLock<HashSet<String>>>,
    discovery_error: Arc<RwLock<Option<String>>>,
    /// Identities of submitted targets, in order.
    submissions: Arc<RwLock<Vec<String>>>,
    discover_calls: Arc<RwLock<usize>>,
    /// Simulated latency for every call.
    delay_ms: Arc<RwLock<u64>>,
}

impl Default for MockNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNavigator {
    /// Create a new mock navigator with no listings.
    pub fn new() -> Self {
        Self {
            listings: Arc::new(RwLock::new(Vec::new())),
            content: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
            discovery_error: Arc::new(RwLock::new(None)),
            submissions: Arc::new(RwLock::new(Vec::new())),
            discover_calls: Arc::new(RwLock::new(0)),
            delay_ms: Arc::new(RwLock::new(0)),
        }
    }

    /// Replace the listings served by `discover`.
    pub async fn set_listings(&self, listings: Vec<Listing>) {
        *self.listings.write().await = listings;
    }

    /// Serve `bytes` for the file with this name.
    pub async fn set_content(&self, file_name: &str, bytes: Vec<u8>) {
        self.content
            .write()
            .await
            .insert(file_name.to_string(), bytes);
    }

    /// Make submissions of this target identity fail.
    pub async fn fail_target(&self, identity: &str) {
        self.failing.write().await.insert(identity.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    /// Make discovery fail with a structure error.
    pub async fn set_discovery_error(&self, message: Option<&str>) {
        *self.discovery_error.write().await = message.map(str::to_string);
    }

    /// Delay every call by `ms` milliseconds.
    pub async fn set_delay_ms(&self, ms: u64) {
        *self.delay_ms.write().await = ms;
    }

    /// Identities of submitted targets, in order.
    pub async fn submissions(&self) -> Vec<String> {
        self.submissions.read().await.clone()
    }

    pub async fn submit_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    pub async fn discover_count(&self) -> usize {
        *self.discover_calls.read().await
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl PortalNavigator for MockNavigator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn discover(&self, max_count: usize) -> Result<Vec<Listing>, NavigatorError> {
        *self.discover_calls.write().await += 1;
        self.simulate_latency().await;

        if let Some(message) = self.discovery_error.read().await.clone() {
            return Err(NavigatorError::Structure(message));
        }

        let mut listings = self.listings.read().await.clone();
        listings.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
        listings.truncate(max_count);
        Ok(listings)
    }

    async fn submit_form(
        &self,
        target: &DownloadTarget,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NavigatorError> {
        let identity = target.identity();
        self.submissions.write().await.push(identity.clone());
        self.simulate_latency().await;

        if self.failing.read().await.contains(&identity) {
            return Err(NavigatorError::Http {
                status: 503,
                body: format!("mock failure for {}", identity),
            });
        }

        let bytes = self
            .content
            .read()
            .await
            .get(&target.file_name)
            .cloned()
            .unwrap_or_else(fixtures::journal_pdf);

        sink.write_all(&bytes).await?;
        sink.flush().await?;
        Ok(bytes.len() as u64)
    }
}
