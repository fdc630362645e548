//! Filter sub-panel protocol: drive the search-condition UI through one
//! bound-value change.
//!
//! Five gated steps: open the condition panel, open the age section, wait
//! for the two bound selects, set both bounds, close and apply. A missing
//! required control in the first three steps is fatal for this sweep step
//! only; bound-setting failures are logged and the sweep continues with
//! best-effort values.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::core::retry::wait_for;
use crate::driver::{DriverError, DriverResult, Locator, PageDriver};
use crate::walk::interact::InteractionSimulator;

const BEGIN_SELECT_ID: &str = "begin_age";
const END_SELECT_ID: &str = "end_age";

const AGE_LABEL_TEXT: &str = "年齢";
const APPLY_BUTTON_TEXT: &str = "この条件で検索";

const CONDITION_PANEL_SETTLE: Duration = Duration::from_secs(3);
const AGE_SECTION_SETTLE: Duration = Duration::from_secs(2);
const APPLY_SETTLE: Duration = Duration::from_secs(5);

const BEGIN_SET_TRIES: usize = 6;
const END_SET_TRIES: usize = 8;
const SET_AFTER_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("required control not found: {0}")]
    MissingControl(&'static str),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

fn condition_button_locators() -> [Locator; 2] {
    [
        Locator::css(r#"img[alt="condition-icon"]"#),
        Locator::css(r#"div[class*="ConditionButton__ConditionImgWrapper"]"#),
    ]
}

fn chevron_locators() -> [Locator; 2] {
    [
        Locator::css(r#"svg[class*="StyledChevron"]"#),
        Locator::css(r#"svg polyline[points*="15 18"][points*="9 12"][points*="15 6"]"#),
    ]
}

pub struct AgeSweepController {
    driver: Arc<dyn PageDriver>,
    interact: InteractionSimulator,
}

impl AgeSweepController {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        let interact = InteractionSimulator::new(driver.clone());
        Self { driver, interact }
    }

    async fn first_present(&self, locators: &[Locator]) -> DriverResult<Option<Locator>> {
        for locator in locators {
            if self.driver.exists(locator).await? {
                return Ok(Some(locator.clone()));
            }
        }
        Ok(None)
    }

    /// Step 1: open the search-condition panel.
    async fn open_condition_panel(&self) -> Result<(), SweepError> {
        let Some(button) = self.first_present(&condition_button_locators()).await? else {
            return Err(SweepError::MissingControl("condition button"));
        };
        self.interact
            .focus_and_click(&button, Duration::from_millis(120))
            .await?;
        sleep(CONDITION_PANEL_SETTLE).await;
        Ok(())
    }

    /// Step 2: open the age sub-section once its label renders.
    async fn open_age_section(&self) -> Result<(), SweepError> {
        let label = Locator::text(AGE_LABEL_TEXT);
        let label_ref = &label;
        let found = wait_for(
            || async move { self.driver.exists(label_ref).await.unwrap_or(false) },
            Duration::from_secs(6),
            Duration::from_millis(100),
        )
        .await;
        if !found {
            return Err(SweepError::MissingControl("age section label"));
        }
        self.interact
            .focus_and_click(&label, Duration::from_millis(100))
            .await?;
        sleep(AGE_SECTION_SETTLE).await;
        Ok(())
    }

    /// Step 3: wait for both bound-value selects to exist.
    async fn wait_for_bound_selects(&self) -> Result<(), SweepError> {
        let ok = wait_for(
            || async move {
                let (begin, end) = self.bound_select_presence().await;
                begin && end
            },
            Duration::from_secs(9),
            Duration::from_millis(120),
        )
        .await;
        if ok {
            Ok(())
        } else {
            Err(SweepError::MissingControl("age bound selects"))
        }
    }

    async fn bound_select_presence(&self) -> (bool, bool) {
        let begin = self
            .driver
            .exists(&Locator::css(format!("#{BEGIN_SELECT_ID}")))
            .await
            .unwrap_or(false);
        let end = self
            .driver
            .exists(&Locator::css(format!("#{END_SELECT_ID}")))
            .await
            .unwrap_or(false);
        (begin, end)
    }

    async fn bound_selects_gone(&self) -> bool {
        let (begin, end) = self.bound_select_presence().await;
        !begin && !end
    }

    async fn apply_button_present(&self) -> bool {
        self.driver
            .exists(&Locator::text(APPLY_BUTTON_TEXT))
            .await
            .unwrap_or(false)
    }

    /// Step 5a: leave the age sub-panel via its back chevron, falling back to
    /// a history back-navigation when the chevron cannot be found.
    async fn close_subpanel(&self) -> DriverResult<()> {
        let chevron = wait_for(
            || async move {
                self.first_present(&chevron_locators())
                    .await
                    .unwrap_or(None)
                    .is_some()
            },
            Duration::from_secs(4),
            Duration::from_millis(120),
        )
        .await;

        if !chevron {
            warn!("sweep: back chevron not found, falling back to history.back()");
            self.driver.back().await?;
            wait_for(
                || async move {
                    self.bound_selects_gone().await || self.apply_button_present().await
                },
                Duration::from_secs(6),
                Duration::from_millis(120),
            )
            .await;
            return Ok(());
        }

        if let Some(locator) = self.first_present(&chevron_locators()).await? {
            self.interact
                .focus_and_click(&locator, Duration::from_millis(80))
                .await?;
        }
        wait_for(
            || async move {
                self.bound_selects_gone().await && self.apply_button_present().await
            },
            Duration::from_secs(6),
            Duration::from_millis(120),
        )
        .await;
        Ok(())
    }

    /// Run the full five-step protocol for one filter value (both bounds are
    /// set to `age`).
    pub async fn apply_age_filter(&self, age: u32) -> Result<(), SweepError> {
        info!("sweep: applying age filter {age}");

        self.open_condition_panel().await?;
        self.open_age_section().await?;
        self.wait_for_bound_selects().await?;

        // Bound-setting is lenient: a failed set is logged and the sweep
        // proceeds with whatever the panel holds, so a silent partial failure
        // can walk a wider range than requested.
        let begin_ok = self
            .interact
            .set_select_value_with_retry(BEGIN_SELECT_ID, age, BEGIN_SET_TRIES, SET_AFTER_WAIT)
            .await;
        if !begin_ok {
            warn!("sweep: begin bound may not have been set (age {age})");
        }
        let end_ok = self
            .interact
            .set_select_value_with_retry(END_SELECT_ID, age, END_SET_TRIES, SET_AFTER_WAIT)
            .await;
        if !end_ok {
            warn!("sweep: end bound may not have been set (age {age})");
        }

        sleep(Duration::from_millis(200)).await;
        self.close_subpanel().await?;

        if self.apply_button_present().await {
            self.interact
                .focus_and_click(&Locator::text(APPLY_BUTTON_TEXT), Duration::from_millis(80))
                .await?;
        } else {
            warn!("sweep: apply control not found, assuming the panel auto-closed");
        }
        sleep(APPLY_SETTLE).await;
        Ok(())
    }
}
