//! Browser seam: the page operations the session driver needs.
//!
//! [`chromium`] drives a real Chrome over the DevTools protocol. Tests drive the
//! state machine through a scripted page instead.

pub mod chromium;
#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::error::BrowserError;

pub use chromium::{ChromiumLauncher, ChromiumPage};

/// Network activity observed on the page, queued until drained
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// A request was sent
    Request { url: String, method: String },
    /// A response finished loading; the body can be fetched by `request_id`
    Response(ResponseMeta),
}

/// Response metadata, available before the body is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    pub request_id: String,
    pub url: String,
    pub status: i64,
    pub content_type: String,
}

/// One open page in a browser session
pub trait PortalPage: Send + Sync {
    /// Navigate and wait for the load event
    fn goto(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Wait until no request has been in flight for `quiet`
    fn wait_for_network_idle(
        &self,
        quiet: Duration,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Number of visible elements matching a CSS selector
    fn count_visible(&self, selector: &str)
        -> impl Future<Output = Result<usize, BrowserError>> + Send;

    /// Focus the first match and type `value` into it
    fn fill(
        &self,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Click the first match
    fn click(&self, selector: &str) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Press Enter on the first match
    fn press_enter(&self, selector: &str)
        -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Inner text of up to `limit` matches, in document order
    fn inner_texts(
        &self,
        selector: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<String>, BrowserError>> + Send;

    /// Save a full-page PNG screenshot
    fn screenshot(&self, path: &Path) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Take every network event queued since the last drain
    fn drain_network_events(&self) -> Vec<NetworkEvent>;

    /// Fetch the body of a finished response as text
    fn response_body(
        &self,
        request_id: &str,
    ) -> impl Future<Output = Result<String, BrowserError>> + Send;

    /// Close the page and its browser
    fn close(self) -> impl Future<Output = Result<(), BrowserError>> + Send;
}

/// Opens a fresh browser session for one run
pub trait BrowserLauncher: Send + Sync {
    type Page: PortalPage;

    fn launch(&self) -> impl Future<Output = Result<Self::Page, BrowserError>> + Send;
}
