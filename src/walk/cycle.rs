//! One walk cycle: Scanning → Opening → Dwelling → Returning, looped until
//! the card source is exhausted, the per-cycle cap is hit, or a stop is
//! requested.

use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::config::WalkerConfig;
use crate::core::retry::wait_for;
use crate::core::types::{candidate_urls, Card, CycleOutcome, CycleReport, Route, WalkSession};
use crate::driver::{DriverError, PageDriver};
use crate::walk::dwell::{self, DwellConfig};
use crate::walk::interact::InteractionSimulator;
use crate::walk::loadmore::{self, PRIME_BURSTS};
use crate::walk::probe::{PageProbe, CARD_SELECTOR};
use crate::walk::scroll::ScrollTargetResolver;

const AUTO_SCROLL_STEP_PX: f64 = 900.0;
const AUTO_SCROLL_SETTLE_MS: u64 = 400;
const AUTO_SCROLL_SETTLE_JITTER_MS: u64 = 300;

const CARD_FOCUS_SETTLE: Duration = Duration::from_millis(80);
const DETAIL_WAIT: Duration = Duration::from_secs(8);
const CANDIDATE_WAIT: Duration = Duration::from_secs(6);
const LIST_WAIT: Duration = Duration::from_secs(12);
const ROUTE_POLL: Duration = Duration::from_millis(150);

/// Corrective nudge after returning to the list, so the next scan starts
/// from roughly where the previous one left off.
const NUDGE_SCROLL_PX: f64 = 260.0;
const NUDGE_SETTLE: Duration = Duration::from_millis(180);
const BETWEEN_WAIT_JITTER_MS: u64 = 500;

#[derive(Clone, Copy, Debug)]
enum CyclePhase {
    Scanning,
    Opening,
    Dwelling,
    Returning,
}

fn log_phase(phase: CyclePhase) {
    debug!("cycle: phase={:?}", phase);
}

pub struct CardWalkCycle<'a> {
    driver: Arc<dyn PageDriver>,
    probe: &'a PageProbe,
    resolver: &'a mut ScrollTargetResolver,
    interact: &'a InteractionSimulator,
    config: &'a WalkerConfig,
    session: &'a mut WalkSession,
}

impl<'a> CardWalkCycle<'a> {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        probe: &'a PageProbe,
        resolver: &'a mut ScrollTargetResolver,
        interact: &'a InteractionSimulator,
        config: &'a WalkerConfig,
        session: &'a mut WalkSession,
    ) -> Self {
        Self {
            driver,
            probe,
            resolver,
            interact,
            config,
            session,
        }
    }

    pub async fn run(mut self) -> Result<CycleReport, DriverError> {
        let limit = if self.config.max_card_count == 0 {
            usize::MAX
        } else {
            self.config.max_card_count
        };
        let dwell_cfg = DwellConfig::from(self.config);
        let mut opened = 0usize;

        loop {
            if !self.session.flags.running() {
                return Ok(CycleReport {
                    outcome: CycleOutcome::Stopped,
                    opened,
                });
            }
            if opened >= limit {
                info!("cycle: per-cycle card cap reached ({limit})");
                return Ok(CycleReport {
                    outcome: CycleOutcome::LimitReached,
                    opened,
                });
            }

            if !self.probe.on_list_page().await? {
                info!("cycle: not on the list, navigating back");
                self.driver.back().await?;
                self.wait_for_list().await;
            }

            log_phase(CyclePhase::Scanning);
            let Some(card) = self.find_next_card().await? else {
                if !self.session.flags.running() {
                    return Ok(CycleReport {
                        outcome: CycleOutcome::Stopped,
                        opened,
                    });
                }
                info!("cycle: no unseen card visible, forcing lazy load");
                if loadmore::force_load_more(self.probe, self.resolver, PRIME_BURSTS).await? {
                    continue;
                }
                return Ok(CycleReport {
                    outcome: CycleOutcome::Exhausted,
                    opened,
                });
            };

            log_phase(CyclePhase::Opening);
            self.driver
                .scroll_nth_into_view(CARD_SELECTOR, card.index)
                .await?;
            sleep(CARD_FOCUS_SETTLE).await;

            info!(
                "cycle: opening card {}{} {}",
                opened + 1,
                if limit == usize::MAX {
                    String::new()
                } else {
                    format!("/{limit}")
                },
                card.id.as_deref().unwrap_or("(no id)"),
            );
            if !self.open_card(&card).await? {
                warn!(
                    "cycle: card did not open after all candidates, skipping {}",
                    card.dedup_key()
                );
                self.session.visited.insert(card.dedup_key());
                continue;
            }

            log_phase(CyclePhase::Dwelling);
            let dwell_for = dwell::pick_dwell_duration(self.config.dwell_max_seconds);
            debug!("cycle: dwelling for {:.1}s", dwell_for.as_secs_f64());
            dwell::dwell_with_scroll(self.resolver, &dwell_cfg, dwell_for).await?;
            self.session.visited.insert(card.dedup_key());
            opened += 1;

            log_phase(CyclePhase::Returning);
            self.driver.back().await?;
            self.wait_for_list().await;
            self.resolver.scroll_by_smart(NUDGE_SCROLL_PX).await?;
            sleep(NUDGE_SETTLE).await;

            let between = {
                let mut rng = rand::rng();
                self.config.between_wait_ms + rng.random_range(0..BETWEEN_WAIT_JITTER_MS)
            };
            sleep(Duration::from_millis(between)).await;
        }
    }

    /// Scan for the first card whose dedup key is unseen, auto-scrolling a
    /// bounded number of times when nothing unseen is visible.
    async fn find_next_card(&mut self) -> Result<Option<Card>, DriverError> {
        for _ in 0..=self.config.max_auto_scroll {
            if !self.session.flags.running() {
                return Ok(None);
            }
            let cards = self.probe.enumerate_cards().await?;
            for card in cards {
                if !self.session.visited.contains(&card.dedup_key()) {
                    return Ok(Some(card));
                }
            }
            self.resolver.scroll_by_smart(AUTO_SCROLL_STEP_PX).await?;
            let settle = {
                let mut rng = rand::rng();
                AUTO_SCROLL_SETTLE_MS + rng.random_range(0..AUTO_SCROLL_SETTLE_JITTER_MS)
            };
            sleep(Duration::from_millis(settle)).await;
        }
        Ok(None)
    }

    /// Click the card and wait for a detail-route transition; on failure,
    /// walk the candidate URLs in order. `Ok(false)` means the card never
    /// opened and should be skipped.
    async fn open_card(&mut self, card: &Card) -> Result<bool, DriverError> {
        self.interact.click_card(card.index).await?;
        if self.wait_for_detail(DETAIL_WAIT).await {
            return Ok(true);
        }

        let Some(id) = &card.id else {
            return Ok(false);
        };
        let origin = self.driver.location().await?.origin;
        for url in candidate_urls(&origin, id) {
            info!("cycle: click produced no route change, navigating to {url}");
            self.driver.navigate(&url).await?;
            if self.wait_for_detail(CANDIDATE_WAIT).await {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn wait_for_detail(&self, timeout: Duration) -> bool {
        let probe = self.probe;
        wait_for(
            || async move { matches!(probe.classify_route().await, Ok(Route::Detail)) },
            timeout,
            ROUTE_POLL,
        )
        .await
    }

    async fn wait_for_list(&self) -> bool {
        let probe = self.probe;
        wait_for(
            || async move { probe.on_list_page().await.unwrap_or(false) },
            LIST_WAIT,
            ROUTE_POLL,
        )
        .await
    }
}
