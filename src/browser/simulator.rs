//! Page interaction simulator
//!
//! Fakes a human performing one search: character-by-character typing into
//! the engine's search field, a fallback chain of submission methods, then
//! randomized scrolling over the results for a fixed duration. All phases
//! poll the shared cancellation token; phases are Rust-side loops, so
//! returning leaves nothing scheduled on the page.

use std::sync::Arc;
use std::time::Duration;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::pacing::{self, ScrollStep};
use super::{BrowserError, BrowserSession};

/// Search engine selectors and signatures
mod selectors {
    /// Search input candidates, probed in order
    pub const INPUT_CANDIDATES: &[&str] = &["input[name=\"q\"]", "#sb_form_q", "input[type=\"search\"]"];
    /// Submit control candidates
    pub const SUBMIT_BUTTON: &str = "#search_icon, button[type=\"submit\"], input[type=\"submit\"]";
    /// URL fragment that marks a results page
    pub const RESULTS_SIGNATURE: &str = "/search";
}

/// Home page of the target search engine
pub const SEARCH_HOME_URL: &str = "https://www.bing.com";

/// Bounded wait-and-check after each verifiable submission attempt
const SUBMIT_CHECK_ATTEMPTS: u32 = 10;
const SUBMIT_CHECK_INTERVAL_MS: u64 = 1_000;

/// One submission method in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStrategy {
    /// Click the submit control directly
    ButtonClick,
    /// Dispatch a synthetic pointer-activation event
    SyntheticClick,
    /// Replace and invoke the control's click handler
    ForcedHandler,
    /// Synthetic Enter keystroke plus form submission
    EnterKey,
    /// Navigate straight to the constructed results URL.
    /// Cannot be verified - it navigates away - and is assumed to succeed.
    DirectNavigation,
}

/// Ordered fallback chain; iteration stops at the first verified success
pub const SUBMISSION_CHAIN: &[SubmitStrategy] = &[
    SubmitStrategy::ButtonClick,
    SubmitStrategy::SyntheticClick,
    SubmitStrategy::ForcedHandler,
    SubmitStrategy::EnterKey,
    SubmitStrategy::DirectNavigation,
];

/// Simulated human interaction against a single page
pub struct SearchSimulator;

impl SearchSimulator {
    /// Run one full simulated search: type, submit, scroll.
    pub async fn run_search(
        session: &Arc<BrowserSession>,
        query: &str,
        scroll_duration: Duration,
        cancel: &CancelToken,
    ) -> Result<(), BrowserError> {
        Self::type_query(session, query, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        // Brief pause before submitting, like re-reading the query
        pacing::random_delay(800, 1_500).await;

        Self::submit_query(session, query).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        Self::scroll_results(session, scroll_duration, cancel).await
    }

    /// Typing phase: locate the search input and type character by
    /// character with randomized cadence and occasional thinking pauses.
    pub async fn type_query(
        session: &Arc<BrowserSession>,
        query: &str,
        cancel: &CancelToken,
    ) -> Result<(), BrowserError> {
        let selector = Self::find_search_input(session).await?;
        info!("Session {} typing query into {}: {}", session.id, selector, query);

        let mut rng = StdRng::from_entropy();
        let selector_js = serde_json::to_string(&selector)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        for c in query.chars() {
            if cancel.is_cancelled() {
                debug!("Session {} typing cancelled mid-query", session.id);
                return Ok(());
            }

            let char_js = serde_json::to_string(&c.to_string())
                .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
            let script = format!(
                r#"
                (function() {{
                    const input = document.querySelector({selector_js});
                    if (!input) return false;
                    input.value += {char_js};
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    return true;
                }})()
                "#
            );
            session.execute_js_with_timeout(&script, 10).await?;

            let delay = pacing::typing_delay(&mut rng);
            sleep(delay).await;
            if let Some(pause) = pacing::thinking_pause(&mut rng) {
                sleep(pause).await;
            }
        }

        // Make sure the full query landed, then fire change for listeners
        let query_js = serde_json::to_string(query)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        let script = format!(
            r#"
            (function() {{
                const input = document.querySelector({selector_js});
                if (!input) return false;
                input.value = {query_js};
                input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                input.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#
        );
        session.execute_js_with_timeout(&script, 10).await?;

        Ok(())
    }

    /// Locate a visible search input, trying candidates in order.
    /// Focuses and clears the matched field.
    async fn find_search_input(session: &Arc<BrowserSession>) -> Result<String, BrowserError> {
        let candidates_js = serde_json::to_string(selectors::INPUT_CANDIDATES)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        let script = format!(
            r#"
            (function() {{
                const candidates = {candidates_js};
                for (const sel of candidates) {{
                    const el = document.querySelector(sel);
                    if (el && el.offsetParent !== null) {{
                        el.focus();
                        el.click();
                        el.value = '';
                        return sel;
                    }}
                }}
                return null;
            }})()
            "#
        );

        let result = session.execute_js_with_timeout(&script, 10).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::InputNotFound(selectors::INPUT_CANDIDATES.join(", ")))
    }

    /// Submission phase: walk the fallback chain until a strategy's
    /// wait-and-check sees the results page. The last strategy navigates
    /// away and is assumed to have worked.
    pub async fn submit_query(
        session: &Arc<BrowserSession>,
        query: &str,
    ) -> Result<(), BrowserError> {
        for &strategy in SUBMISSION_CHAIN {
            debug!("Session {} submission attempt: {:?}", session.id, strategy);

            if strategy == SubmitStrategy::DirectNavigation {
                let url = format!(
                    "{}{}?q={}",
                    SEARCH_HOME_URL,
                    selectors::RESULTS_SIGNATURE,
                    urlencoding::encode(query)
                );
                session
                    .navigate(&url)
                    .await
                    .map_err(|e| BrowserError::SubmissionFailed(e.to_string()))?;
                session.wait_for_load(10).await?;
                info!("Session {} submitted via direct navigation (unverified)", session.id);
                return Ok(());
            }

            match Self::apply_strategy(session, strategy).await {
                Ok(true) => {
                    if Self::await_results_page(session).await? {
                        info!("Session {} search submitted via {:?}", session.id, strategy);
                        return Ok(());
                    }
                    debug!("Session {} {:?} did not reach results, falling back", session.id, strategy);
                }
                Ok(false) => {
                    debug!("Session {} {:?} found no target element", session.id, strategy);
                }
                Err(e) => {
                    warn!("Session {} {:?} errored: {} - falling back", session.id, strategy, e);
                }
            }
        }

        // The chain ends with DirectNavigation, which always returns
        unreachable!("submission chain ends with an unconditional strategy")
    }

    async fn apply_strategy(
        session: &Arc<BrowserSession>,
        strategy: SubmitStrategy,
    ) -> Result<bool, BrowserError> {
        let script = match strategy {
            SubmitStrategy::ButtonClick => format!(
                r#"
                (function() {{
                    const btn = document.querySelector('{}');
                    if (!btn) return false;
                    btn.click();
                    return true;
                }})()
                "#,
                selectors::SUBMIT_BUTTON
            ),
            SubmitStrategy::SyntheticClick => format!(
                r#"
                (function() {{
                    const btn = document.querySelector('{}');
                    if (!btn) return false;
                    btn.dispatchEvent(new MouseEvent('click', {{
                        view: window,
                        bubbles: true,
                        cancelable: true
                    }}));
                    return true;
                }})()
                "#,
                selectors::SUBMIT_BUTTON
            ),
            SubmitStrategy::ForcedHandler => format!(
                r#"
                (function() {{
                    const btn = document.querySelector('{}');
                    if (!btn) return false;
                    btn.onclick = null;
                    btn.onclick = function() {{ return true; }};
                    btn.click();
                    return true;
                }})()
                "#,
                selectors::SUBMIT_BUTTON
            ),
            SubmitStrategy::EnterKey => r#"
                (function() {
                    const input = document.querySelector('input[name="q"], #sb_form_q, input[type="search"]');
                    if (!input) return false;
                    const opts = {
                        key: 'Enter', code: 'Enter', keyCode: 13, which: 13,
                        bubbles: true, cancelable: true, view: window
                    };
                    input.dispatchEvent(new KeyboardEvent('keydown', opts));
                    input.dispatchEvent(new KeyboardEvent('keyup', opts));
                    if (input.form) input.form.submit();
                    return true;
                })()
                "#
            .to_string(),
            SubmitStrategy::DirectNavigation => unreachable!("handled by caller"),
        };

        let result = session.execute_js_with_timeout(&script, 10).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Bounded poll for the results-page navigation signature.
    async fn await_results_page(session: &Arc<BrowserSession>) -> Result<bool, BrowserError> {
        for _ in 0..SUBMIT_CHECK_ATTEMPTS {
            sleep(Duration::from_millis(SUBMIT_CHECK_INTERVAL_MS)).await;

            let url = session.current_url().await?;
            if url.contains(selectors::RESULTS_SIGNATURE) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Scrolling phase: perturb the scroll position on randomized ticks
    /// until the duration elapses or cancellation is requested.
    pub async fn scroll_results(
        session: &Arc<BrowserSession>,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<(), BrowserError> {
        info!("Session {} scrolling results for {:?}", session.id, duration);

        let deadline = Instant::now() + duration;
        let mut rng = StdRng::from_entropy();

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                debug!("Session {} scrolling cancelled", session.id);
                return Ok(());
            }

            let metrics = session
                .execute_js_with_timeout(
                    r#"
                    (function() {
                        return {
                            y: window.scrollY,
                            max: Math.max(document.body.scrollHeight - window.innerHeight, 0)
                        };
                    })()
                    "#,
                    10,
                )
                .await?;

            let position = metrics.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let max_scroll = metrics.get("max").and_then(|v| v.as_f64()).unwrap_or(0.0);

            let step_js = match pacing::next_scroll_step(&mut rng, position, max_scroll) {
                ScrollStep::Pause => None,
                ScrollStep::Up(px) => Some(format!("window.scrollBy(0, -{});", px)),
                ScrollStep::Down(px) => Some(format!("window.scrollBy(0, {});", px)),
                ScrollStep::JumpTo(y) => Some(format!("window.scrollTo(0, {:.0});", y)),
            };
            if let Some(js) = step_js {
                session.execute_js_with_timeout(&js, 10).await?;
            }

            let tick = pacing::scroll_tick(&mut rng);
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(tick.min(remaining)).await;
        }

        debug!("Session {} scrolling completed", session.id);
        Ok(())
    }

    /// Probe the current page for the selectors the simulator relies on.
    pub async fn debug_page(session: &Arc<BrowserSession>) -> Result<serde_json::Value, BrowserError> {
        let candidates_js = serde_json::to_string(selectors::INPUT_CANDIDATES)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        let script = format!(
            r#"
            (function() {{
                let inputSelector = null;
                for (const sel of {candidates_js}) {{
                    const el = document.querySelector(sel);
                    if (el) {{ inputSelector = sel; break; }}
                }}
                const button = document.querySelector('{button}');
                const form = document.querySelector('form');
                return {{
                    url: window.location.href,
                    title: document.title,
                    inputFound: inputSelector !== null,
                    inputSelector: inputSelector,
                    buttonFound: button !== null,
                    buttonId: button ? button.id : null,
                    formFound: form !== null
                }};
            }})()
            "#,
            button = selectors::SUBMIT_BUTTON
        );

        session.execute_js_with_timeout(&script, 10).await
    }
}
