//! Scripted page used by the session and scraper tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{BrowserLauncher, NetworkEvent, PortalPage, ResponseMeta};
use crate::error::BrowserError;

/// Observable side of a [`MockPage`] that outlives the page itself
#[derive(Clone, Default)]
pub(crate) struct MockHandle {
    actions: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    pub fn did(&self, action: &str) -> bool {
        self.actions.lock().iter().any(|a| a == action)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct MockPage {
    visible: HashMap<String, usize>,
    texts: HashMap<String, Vec<String>>,
    bodies: HashMap<String, String>,
    events: Mutex<Vec<NetworkEvent>>,
    fail_goto: bool,
    never_idle: bool,
    handle: MockHandle,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible(mut self, selector: &str, count: usize) -> Self {
        self.visible.insert(selector.to_string(), count);
        self
    }

    pub fn with_texts(mut self, selector: &str, texts: &[&str]) -> Self {
        self.texts.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_request(self, url: &str, method: &str) -> Self {
        self.events.lock().push(NetworkEvent::Request {
            url: url.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn with_response(
        mut self,
        request_id: &str,
        url: &str,
        status: i64,
        content_type: &str,
        body: &str,
    ) -> Self {
        self.bodies.insert(request_id.to_string(), body.to_string());
        self.events.lock().push(NetworkEvent::Response(ResponseMeta {
            request_id: request_id.to_string(),
            url: url.to_string(),
            status,
            content_type: content_type.to_string(),
        }));
        self
    }

    pub fn failing_goto(mut self) -> Self {
        self.fail_goto = true;
        self
    }

    pub fn never_idle(mut self) -> Self {
        self.never_idle = true;
        self
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    fn record(&self, action: String) {
        self.handle.actions.lock().push(action);
    }

    fn require_visible(&self, selector: &str) -> Result<(), BrowserError> {
        if self.visible.get(selector).copied().unwrap_or(0) > 0 {
            Ok(())
        } else {
            Err(BrowserError::Cdp(format!("no element matches {selector}")))
        }
    }
}

impl PortalPage for MockPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.record(format!("goto {url}"));
        if self.fail_goto {
            return Err(BrowserError::Timeout {
                operation: format!("goto {url}"),
                millis: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn wait_for_network_idle(
        &self,
        _quiet: Duration,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        if self.never_idle {
            return Err(BrowserError::Timeout {
                operation: "network idle".to_string(),
                millis: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn count_visible(&self, selector: &str) -> Result<usize, BrowserError> {
        Ok(self.visible.get(selector).copied().unwrap_or(0))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.require_visible(selector)?;
        self.record(format!("fill {selector} {value}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.require_visible(selector)?;
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        self.require_visible(selector)?;
        self.record(format!("enter {selector}"));
        Ok(())
    }

    async fn inner_texts(&self, selector: &str, limit: usize) -> Result<Vec<String>, BrowserError> {
        Ok(self
            .texts
            .get(selector)
            .map(|texts| texts.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.record("screenshot".to_string());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"\x89PNG")?;
        Ok(())
    }

    fn drain_network_events(&self) -> Vec<NetworkEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    async fn response_body(&self, request_id: &str) -> Result<String, BrowserError> {
        self.bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| BrowserError::Cdp(format!("no body for {request_id}")))
    }

    async fn close(self) -> Result<(), BrowserError> {
        self.handle.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one scripted page; later launches fail
pub(crate) struct MockLauncher {
    page: Mutex<Option<MockPage>>,
}

impl MockLauncher {
    pub fn new(page: MockPage) -> Self {
        Self {
            page: Mutex::new(Some(page)),
        }
    }
}

impl BrowserLauncher for MockLauncher {
    type Page = MockPage;

    async fn launch(&self) -> Result<MockPage, BrowserError> {
        self.page
            .lock()
            .take()
            .ok_or_else(|| BrowserError::Launch("mock page already used".to_string()))
    }
}
