//! Scroll-target discovery with fallback.
//!
//! SPA layouts move the real scroller around: sometimes the window scrolls,
//! sometimes an inner container does, and a re-render can silently swap one
//! for the other. The resolver ranks every candidate surface by scrollable
//! range, keeps the ranked list as a fallback chain, and measures actual
//! offset movement after each command. A surface that stops moving is
//! abandoned, and as a last resort the whole chain is rebuilt.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::driver::{DriverResult, PageDriver, SurfaceInfo, SurfaceKind};

/// Offset must move at least min(8 px, 20% of |delta|) to count.
const MOVE_EPSILON_PX: f64 = 8.0;
const MOVE_FRACTION: f64 = 0.2;
/// Settle time between issuing a scroll and measuring its effect.
const SETTLE_MS: u64 = 80;

fn movement_threshold(delta: f64) -> f64 {
    MOVE_EPSILON_PX.min(delta.abs() * MOVE_FRACTION)
}

fn rank(mut surfaces: Vec<SurfaceInfo>) -> Vec<SurfaceInfo> {
    surfaces.sort_by(|a, b| {
        b.scroll_range
            .partial_cmp(&a.scroll_range)
            .unwrap_or(Ordering::Equal)
    });
    surfaces
}

/// Saved (chain, active) pair so list-scroll context survives a detail-view
/// dwell. See [`ScrollTargetResolver::snapshot`].
#[derive(Clone)]
pub struct ScrollSnapshot {
    chain: Vec<SurfaceInfo>,
    active: usize,
}

pub struct ScrollTargetResolver {
    driver: Arc<dyn PageDriver>,
    chain: Vec<SurfaceInfo>,
    active: usize,
}

impl ScrollTargetResolver {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            chain: Vec::new(),
            active: 0,
        }
    }

    /// Re-discover candidate surfaces and rank them by scrollable range
    /// descending. The head of the ranked list becomes the active target.
    pub async fn pick_best(&mut self) -> DriverResult<()> {
        let surfaces = self.driver.collect_surfaces().await?;
        self.chain = rank(surfaces);
        self.active = 0;
        debug!(
            "scroll: picked {} candidate surface(s), active = {:?}",
            self.chain.len(),
            self.active_kind()
        );
        Ok(())
    }

    pub fn active_kind(&self) -> Option<SurfaceKind> {
        self.chain.get(self.active).map(|s| s.kind)
    }

    /// Apply `delta` to the active target, verifying that the offset actually
    /// changed. On failure, each fallback target is tried in chain order; if
    /// none move, the chain is rebuilt and one final attempt is made on the
    /// fresh head. Returns whether any movement was observed.
    pub async fn scroll_by_smart(&mut self, delta: f64) -> DriverResult<bool> {
        let order: Vec<usize> = std::iter::once(self.active)
            .chain((0..self.chain.len()).filter(|&i| i != self.active))
            .collect();

        for idx in order {
            if self.try_scroll(idx, delta).await? {
                self.active = idx;
                return Ok(true);
            }
        }

        // Every known surface is stale; the page likely re-rendered.
        self.pick_best().await?;
        if self.chain.is_empty() {
            return Ok(false);
        }
        let moved = self.try_scroll(self.active, delta).await?;
        Ok(moved)
    }

    async fn try_scroll(&self, idx: usize, delta: f64) -> DriverResult<bool> {
        let Some(surface) = self.chain.get(idx) else {
            return Ok(false);
        };
        let Some(before) = self.driver.surface_offset(surface.slot).await? else {
            return Ok(false);
        };
        self.driver.surface_scroll_by(surface.slot, delta).await?;
        tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;
        let Some(after) = self.driver.surface_offset(surface.slot).await? else {
            return Ok(false);
        };
        Ok((after - before).abs() >= movement_threshold(delta))
    }

    /// Save the current chain and active target before redirecting scrolling
    /// elsewhere (e.g. into an opened detail view).
    pub fn snapshot(&self) -> ScrollSnapshot {
        ScrollSnapshot {
            chain: self.chain.clone(),
            active: self.active,
        }
    }

    pub fn restore(&mut self, snap: ScrollSnapshot) {
        self.chain = snap.chain;
        self.active = snap.active;
    }
}
