//! Simulated user interaction: humanized clicks and select-field changes.
//!
//! The raw event synthesis lives in the driver (it is page-side work); this
//! layer adds the timing the host page needs: settle pauses after clicks and
//! a bounded retry around select options that materialize asynchronously.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::core::retry::{attempt, wait_for};
use crate::driver::{DriverResult, Locator, PageDriver};
use crate::walk::probe::CARD_SELECTOR;

/// Base bounded wait for an option to appear; grows by
/// [`OPTION_WAIT_GROWTH_MS`] per retry to absorb slow host-page renders.
const OPTION_WAIT_BASE_MS: u64 = 2000;
const OPTION_WAIT_GROWTH_MS: u64 = 300;
const OPTION_POLL_MS: u64 = 120;
const RETRY_PAUSE_MS: u64 = 150;

pub struct InteractionSimulator {
    driver: Arc<dyn PageDriver>,
}

impl InteractionSimulator {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self { driver }
    }

    pub async fn click(&self, locator: &Locator) -> DriverResult<bool> {
        self.driver.click(locator).await
    }

    pub async fn click_card(&self, index: usize) -> DriverResult<bool> {
        self.driver.click_nth(CARD_SELECTOR, index).await
    }

    /// Scroll a control into view, give the page a beat, then click it.
    pub async fn focus_and_click(&self, locator: &Locator, settle: Duration) -> DriverResult<bool> {
        self.driver.scroll_into_view(locator).await?;
        sleep(settle).await;
        self.driver.click(locator).await
    }

    /// Set `select#<id>` to the option whose value is `value` or whose exact
    /// display text is `<value>歳`. Returns `false` when no such option
    /// exists right now.
    pub async fn set_select_value(&self, id: &str, value: u32) -> DriverResult<bool> {
        let value_str = value.to_string();
        let label = format!("{value}歳");
        self.driver.select_commit(id, &value_str, &label).await
    }

    /// Retry wrapper for selects whose options load asynchronously: each try
    /// first waits (bounded, growing per attempt) for a matching option to
    /// exist, then commits and settles for `after_wait`.
    pub async fn set_select_value_with_retry(
        &self,
        id: &str,
        value: u32,
        tries: usize,
        after_wait: Duration,
    ) -> bool {
        let value_str = value.to_string();
        let label = format!("{value}歳");

        attempt(
            |i| {
                let value_str = value_str.clone();
                let label = label.clone();
                async move {
                    let option_ready = wait_for(
                        || {
                            let value_str = value_str.clone();
                            let label = label.clone();
                            async move {
                                self.driver
                                    .select_has_option(id, &value_str, &label)
                                    .await
                                    .unwrap_or(false)
                            }
                        },
                        Duration::from_millis(
                            OPTION_WAIT_BASE_MS + i as u64 * OPTION_WAIT_GROWTH_MS,
                        ),
                        Duration::from_millis(OPTION_POLL_MS),
                    )
                    .await;
                    if !option_ready {
                        return None;
                    }
                    let committed = self
                        .driver
                        .select_commit(id, &value_str, &label)
                        .await
                        .unwrap_or(false);
                    if committed {
                        sleep(after_wait).await;
                        Some(())
                    } else {
                        None
                    }
                }
            },
            tries,
            Duration::from_millis(RETRY_PAUSE_MS),
        )
        .await
        .is_some()
    }
}
