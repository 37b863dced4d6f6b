//! Chrome/Chromium over the DevTools protocol (chromiumoxide).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{BrowserLauncher, NetworkEvent, PortalPage, ResponseMeta};
use crate::config::ScraperSettings;
use crate::error::BrowserError;

/// Interval between network-idle checks
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attribute marking the element an action should land on
const TARGET_ATTR: &str = "data-meridian-target";

/// JS predicate: element takes up space and is not hidden by style
const IS_VISIBLE_JS: &str = "function(el) {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0
      && style.visibility !== 'hidden' && style.display !== 'none';
  }";

/// Launches a fresh Chrome per run
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(settings: &ScraperSettings) -> Self {
        Self {
            headless: settings.headless,
            chrome_path: settings.chrome_path.clone(),
        }
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<ChromiumPage, BrowserError> {
        let chrome_path = self
            .chrome_path
            .clone()
            .or_else(find_chrome)
            .ok_or_else(|| {
                BrowserError::Launch(
                    "Chrome/Chromium not found; install it or set scraper.chrome_path".to_string(),
                )
            })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(e.into());
            }
        };

        let mut session = ChromiumPage {
            browser,
            page,
            handler_task,
            listener_tasks: Vec::new(),
            tracker: Arc::new(Mutex::new(NetworkTracker::default())),
        };
        session.attach_network_listeners().await?;

        info!("Browser launched (headless={})", self.headless);
        Ok(session)
    }
}

/// Request/response bookkeeping fed by the DevTools event listeners
#[derive(Debug, Default)]
struct NetworkTracker {
    in_flight: HashSet<String>,
    responses: HashMap<String, ResponseMeta>,
    queued: Vec<NetworkEvent>,
    last_activity: Option<Instant>,
}

impl NetworkTracker {
    fn on_request(&mut self, request_id: String, url: String, method: String) {
        self.in_flight.insert(request_id);
        self.queued.push(NetworkEvent::Request { url, method });
        self.last_activity = Some(Instant::now());
    }

    fn on_response(&mut self, meta: ResponseMeta) {
        self.responses.insert(meta.request_id.clone(), meta);
        self.last_activity = Some(Instant::now());
    }

    /// Body is only retrievable once loading finished, so the response is queued here
    fn on_finished(&mut self, request_id: &str) {
        self.in_flight.remove(request_id);
        if let Some(meta) = self.responses.remove(request_id) {
            self.queued.push(NetworkEvent::Response(meta));
        }
        self.last_activity = Some(Instant::now());
    }

    fn on_failed(&mut self, request_id: &str) {
        self.in_flight.remove(request_id);
        self.responses.remove(request_id);
        self.last_activity = Some(Instant::now());
    }

    fn is_idle(&self, quiet: Duration) -> bool {
        self.in_flight.is_empty()
            && self
                .last_activity
                .map(|at| at.elapsed() >= quiet)
                .unwrap_or(true)
    }

    fn drain(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.queued)
    }
}

/// A launched browser with one page and its network listeners
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    listener_tasks: Vec<JoinHandle<()>>,
    tracker: Arc<Mutex<NetworkTracker>>,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for task in &self.listener_tasks {
            task.abort();
        }
        self.handler_task.abort();
    }
}

impl ChromiumPage {
    /// Enable the Network domain and mirror its events into the tracker
    async fn attach_network_listeners(&mut self) -> Result<(), BrowserError> {
        // Listeners first so nothing between enable and subscribe is missed
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await?;
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = self.page.event_listener::<EventLoadingFailed>().await?;

        self.page.execute(EnableParams::default()).await?;

        let tracker = self.tracker.clone();
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                tracker.lock().on_request(
                    event.request_id.inner().clone(),
                    event.request.url.clone(),
                    event.request.method.clone(),
                );
            }
        }));

        let tracker = self.tracker.clone();
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                tracker.lock().on_response(ResponseMeta {
                    request_id: event.request_id.inner().clone(),
                    url: event.response.url.clone(),
                    status: event.response.status,
                    content_type: event.response.mime_type.clone(),
                });
            }
        }));

        let tracker = self.tracker.clone();
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                tracker.lock().on_finished(event.request_id.inner());
            }
        }));

        let tracker = self.tracker.clone();
        self.listener_tasks.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                tracker.lock().on_failed(event.request_id.inner());
            }
        }));

        Ok(())
    }

    /// First visible match for `selector`, optionally with its value cleared
    async fn visible_element(&self, selector: &str, clear: bool) -> Result<Element, BrowserError> {
        let found: bool = self.evaluate_json(mark_visible_js(selector, clear)).await?;
        if !found {
            return Err(BrowserError::Cdp(format!(
                "no visible element matches {selector}"
            )));
        }
        Ok(self.page.find_element(format!("[{TARGET_ATTR}]")).await?)
    }

    async fn evaluate_json<T: serde::de::DeserializeOwned>(
        &self,
        js: String,
    ) -> Result<T, BrowserError> {
        self.page
            .evaluate(js)
            .await?
            .into_value::<T>()
            .map_err(|e| BrowserError::Cdp(e.to_string()))
    }
}

impl PortalPage for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(BrowserError::Timeout {
                operation: format!("goto {url}"),
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    async fn wait_for_network_idle(
        &self,
        quiet: Duration,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            if self.tracker.lock().is_idle(quiet) {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::Timeout {
                    operation: "network idle".to_string(),
                    millis: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn count_visible(&self, selector: &str) -> Result<usize, BrowserError> {
        self.evaluate_json(count_visible_js(selector)).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let element = self.visible_element(selector, true).await?;
        element.click().await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.visible_element(selector, false).await?.click().await?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        self.visible_element(selector, false)
            .await?
            .press_key("Enter")
            .await?;
        Ok(())
    }

    async fn inner_texts(&self, selector: &str, limit: usize) -> Result<Vec<String>, BrowserError> {
        let js = format!(
            r#"(function(sel, limit) {{
  return Array.from(document.querySelectorAll(sel)).slice(0, limit)
    .map(function(el) {{ return String(el.innerText || '').trim(); }});
}})({}, {})"#,
            js_string(selector),
            limit
        );
        self.evaluate_json(js).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    fn drain_network_events(&self) -> Vec<NetworkEvent> {
        self.tracker.lock().drain()
    }

    async fn response_body(&self, request_id: &str) -> Result<String, BrowserError> {
        let params = GetResponseBodyParams::new(RequestId::from(request_id.to_string()));
        let response = self.page.execute(params).await?;
        if response.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&response.result.body)
                .map_err(|e| BrowserError::Cdp(format!("invalid base64 body: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(response.result.body.clone())
        }
    }

    async fn close(mut self) -> Result<(), BrowserError> {
        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        Ok(())
    }
}

/// Quote a value as a JavaScript string literal
fn count_visible_js(selector: &str) -> String {
    format!(
        "(function(sel) {{
  return Array.from(document.querySelectorAll(sel)).filter({IS_VISIBLE_JS}).length;
}})({})",
        js_string(selector)
    )
}

/// Tag the first visible match with `TARGET_ATTR`; false when nothing is visible
fn mark_visible_js(selector: &str, clear: bool) -> String {
    format!(
        "(function(sel, clear) {{
  document.querySelectorAll('[{TARGET_ATTR}]').forEach(function(el) {{
    el.removeAttribute('{TARGET_ATTR}');
  }});
  const el = Array.from(document.querySelectorAll(sel)).find({IS_VISIBLE_JS});
  if (!el) return false;
  el.setAttribute('{TARGET_ATTR}', '');
  if (clear && 'value' in el) {{
    el.focus();
    el.value = '';
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  }}
  return true;
}})({}, {})",
        js_string(selector),
        clear
    )
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Find a Chrome/Chromium executable on this machine
fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(request_id: &str, url: &str) -> ResponseMeta {
        ResponseMeta {
            request_id: request_id.to_string(),
            url: url.to_string(),
            status: 200,
            content_type: "application/json".to_string(),
        }
    }

    #[test]
    fn test_marker_targets_first_visible_match() {
        let js = mark_visible_js("input[type=\"email\"]", false);
        assert!(js.contains(".find(function(el) {"));
        assert!(js.contains("rect.width > 0 && rect.height > 0"));
        assert!(js.contains("el.removeAttribute('data-meridian-target')"));
        assert!(js.contains("el.setAttribute('data-meridian-target', '')"));
        assert!(js.ends_with(r#"})("input[type=\"email\"]", false)"#));
    }

    #[test]
    fn test_marker_clears_value_before_fill() {
        let js = mark_visible_js("#signInName", true);
        assert!(js.contains("el.value = '';"));
        assert!(js.contains("new Event('input', { bubbles: true })"));
        assert!(js.ends_with(r##"})("#signInName", true)"##));
    }

    #[test]
    fn test_count_uses_same_visibility_rule() {
        let js = count_visible_js("a[href*='usage']");
        assert!(js.contains(&format!(".filter({IS_VISIBLE_JS}).length")));
        assert!(js.ends_with(r#"})("a[href*='usage']")"#));
    }

    #[test]
    fn test_response_queued_only_after_loading_finished() {
        let mut tracker = NetworkTracker::default();
        tracker.on_request("1".into(), "https://x/api/usage".into(), "GET".into());
        tracker.on_response(meta("1", "https://x/api/usage"));

        let events = tracker.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::Request { .. }));

        tracker.on_finished("1");
        let events = tracker.drain();
        assert_eq!(events, vec![NetworkEvent::Response(meta("1", "https://x/api/usage"))]);
    }

    #[test]
    fn test_failed_response_is_dropped() {
        let mut tracker = NetworkTracker::default();
        tracker.on_request("7".into(), "https://x/api/usage".into(), "GET".into());
        tracker.on_response(meta("7", "https://x/api/usage"));
        tracker.on_failed("7");
        tracker.drain();
        tracker.on_finished("7");
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_idle_requires_empty_in_flight_and_quiet_period() {
        let mut tracker = NetworkTracker::default();
        assert!(tracker.is_idle(Duration::from_millis(500)));

        tracker.on_request("1".into(), "https://x/".into(), "GET".into());
        assert!(!tracker.is_idle(Duration::ZERO));

        tracker.on_finished("1");
        assert!(tracker.is_idle(Duration::ZERO));
        assert!(!tracker.is_idle(Duration::from_secs(60)));
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"input[type="email"]"#), r#""input[type=\"email\"]""#);
    }
}
