//! Prioritized selector resolution for elements on an uncontrolled page.
//!
//! Candidates are tried strictly in list order; each gets a bounded wait. When
//! several candidates would match different elements, the earliest one wins.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::browser::PortalPage;

/// Poll interval while waiting for one candidate
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of resolving one semantic role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// This candidate matched at least one visible element
    Matched(String),
    /// Every candidate was tried and none matched
    NoMatch,
    /// The aggregate budget ran out before every candidate was tried
    Timeout,
}

impl Resolution {
    pub fn selector(&self) -> Option<&str> {
        match self {
            Resolution::Matched(selector) => Some(selector),
            _ => None,
        }
    }
}

/// Resolves a role ("email field", "submit button", ...) against candidate selectors
#[derive(Debug, Clone)]
pub struct SelectorResolver {
    per_candidate: Duration,
    budget: Option<Duration>,
}

impl SelectorResolver {
    /// Create a resolver that waits up to `per_candidate` for each selector
    pub fn new(per_candidate: Duration) -> Self {
        Self {
            per_candidate,
            budget: None,
        }
    }

    /// Cap the total time spent across all candidates
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Return the first candidate that currently matches a visible element
    pub async fn resolve<P: PortalPage>(
        &self,
        page: &P,
        role: &str,
        candidates: &[&str],
    ) -> Resolution {
        let start = Instant::now();

        for candidate in candidates {
            let wait = match self.budget {
                Some(budget) => {
                    let elapsed = start.elapsed();
                    if elapsed >= budget {
                        warn!("{}: budget of {:?} exhausted", role, budget);
                        return Resolution::Timeout;
                    }
                    self.per_candidate.min(budget - elapsed)
                }
                None => self.per_candidate,
            };

            if wait_for_visible(page, candidate, wait).await {
                info!("{}: matched {}", role, candidate);
                return Resolution::Matched(candidate.to_string());
            }
            debug!("{}: no visible match for {}", role, candidate);
        }

        Resolution::NoMatch
    }
}

/// Poll until `selector` matches a visible element or `wait` elapses
async fn wait_for_visible<P: PortalPage>(page: &P, selector: &str, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;

    loop {
        match page.count_visible(selector).await {
            Ok(count) if count > 0 => return true,
            Ok(_) => {}
            // Invalid selectors and evaluation errors count as "not here"
            Err(e) => debug!("Visibility check failed for {}: {}", selector, e),
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}
