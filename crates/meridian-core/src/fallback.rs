//! Visible-data fallback: read usage text straight off the rendered page.

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::browser::PortalPage;
use crate::types::VISUAL_SCRAPE_SOURCE;

/// DOM regions that tend to hold usage figures
pub const REGION_SELECTORS: &[&str] = &[
    "[class*=\"usage\"]",
    "[class*=\"consumption\"]",
    "[class*=\"reading\"]",
    "[class*=\"meter\"]",
    "[class*=\"kwh\"]",
    "[id*=\"usage\"]",
    "table",
    "[class*=\"chart\"]",
];

/// Elements read per region
pub const MAX_ELEMENTS_PER_REGION: usize = 5;

/// Collect non-empty text from the usage regions
///
/// Returns `None` when no region yields any text; that is a valid "no data"
/// outcome, not an error.
pub async fn scrape_visible<P: PortalPage>(page: &P) -> Option<Value> {
    let mut found = Map::new();

    for selector in REGION_SELECTORS {
        let texts = match page.inner_texts(selector, MAX_ELEMENTS_PER_REGION).await {
            Ok(texts) => texts,
            Err(e) => {
                debug!("Fallback region {} unreadable: {}", selector, e);
                continue;
            }
        };

        for (index, text) in texts.iter().enumerate() {
            let text = text.trim();
            if !text.is_empty() {
                found.insert(format!("{}_{}", selector, index), Value::String(text.to_string()));
            }
        }
    }

    if found.is_empty() {
        return None;
    }

    info!("Visible-data fallback found {} text regions", found.len());
    Some(visual_payload(found))
}

/// Wrap extracted region text in a payload tagged as a visual scrape
pub fn visual_payload(found: Map<String, Value>) -> Value {
    json!({
        "source": VISUAL_SCRAPE_SOURCE,
        "visible_data": found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockPage;

    #[tokio::test]
    async fn test_collects_indexed_region_text() {
        let page = MockPage::new()
            .with_texts("table", &["12.3 kWh"])
            .with_texts("[class*=\"meter\"]", &["", "Meter 42", "  "]);

        let payload = scrape_visible(&page).await.expect("should find text");
        assert_eq!(payload["source"], "visual_scrape");
        assert_eq!(payload["visible_data"]["table_0"], "12.3 kWh");
        assert_eq!(payload["visible_data"]["[class*=\"meter\"]_1"], "Meter 42");
        assert_eq!(payload["visible_data"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reads_at_most_five_elements_per_region() {
        let page = MockPage::new().with_texts("table", &["a", "b", "c", "d", "e", "f", "g"]);
        let payload = scrape_visible(&page).await.unwrap();
        let data = payload["visible_data"].as_object().unwrap();
        assert_eq!(data.len(), MAX_ELEMENTS_PER_REGION);
        assert!(data.contains_key("table_4"));
        assert!(!data.contains_key("table_5"));
    }

    #[tokio::test]
    async fn test_blank_page_yields_nothing() {
        let page = MockPage::new().with_texts("table", &["   "]);
        assert!(scrape_visible(&page).await.is_none());
    }
}
