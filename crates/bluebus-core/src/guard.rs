//! Cleanup guard for discovery scans.
//!
//! A scan acquires up to three resources: a signal subscription, a match
//! rule and the adapter's discovery mode. [`ScanGuard`] records which of them
//! were actually acquired and releases exactly those, in reverse order.
//! Release failures are logged and never replace the scan's own outcome.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::adapter::Adapter;
use crate::bus::{Bus, MatchRule, SubscriptionId};

/// Releases a scan's resources when finished or dropped.
///
/// Call [`ScanGuard::release`] on every normal exit path. If the guard is
/// dropped instead (the scanning future was cancelled), the release runs on
/// a spawned task.
pub(crate) struct ScanGuard {
    resources: Option<ScanResources>,
}

struct ScanResources {
    bus: Arc<dyn Bus>,
    subscription: SubscriptionId,
    rule: Option<MatchRule>,
    discovering: Option<Adapter>,
}

impl ScanGuard {
    pub(crate) fn new(bus: Arc<dyn Bus>, subscription: SubscriptionId) -> Self {
        Self {
            resources: Some(ScanResources {
                bus,
                subscription,
                rule: None,
                discovering: None,
            }),
        }
    }

    /// Record that `rule` was added.
    pub(crate) fn matching(&mut self, rule: MatchRule) {
        if let Some(resources) = self.resources.as_mut() {
            resources.rule = Some(rule);
        }
    }

    /// Record that discovery was started on `adapter`.
    pub(crate) fn discovering(&mut self, adapter: Adapter) {
        if let Some(resources) = self.resources.as_mut() {
            resources.discovering = Some(adapter);
        }
    }

    /// Stop discovery, remove the match rule and unsubscribe.
    pub(crate) async fn release(mut self) {
        if let Some(resources) = self.resources.take() {
            resources.release().await;
        }
    }
}

impl ScanResources {
    async fn release(self) {
        if let Some(adapter) = &self.discovering
            && let Err(e) = adapter.stop_discovery().await
        {
            warn!("Failed to stop discovery: {}", e);
        }
        if let Some(rule) = &self.rule
            && let Err(e) = self.bus.remove_match(rule).await
        {
            warn!("Failed to remove match rule {}: {}", rule, e);
        }
        if let Err(e) = self.bus.unsubscribe(self.subscription).await {
            warn!("Failed to unsubscribe {}: {}", self.subscription, e);
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            // Try to get a runtime handle to perform async cleanup
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(resources.release());
            } else {
                warn!("No tokio runtime available for scan cleanup in guard drop");
            }
        }
    }
}
