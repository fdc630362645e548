//! Simulated reading time inside an opened detail view.
//!
//! A fixed scroll cadence is trivially detectable, so each dwell issues a
//! random number of moves with random pauses and distances, biased toward
//! scrolling forward, with an occasional short reverse "re-reading" jiggle.

use std::time::Duration;

use rand::RngExt;
use tokio::time::{sleep, Instant};

use crate::core::config::WalkerConfig;
use crate::driver::DriverResult;
use crate::walk::scroll::ScrollTargetResolver;

/// Below this total there is no room for a believable scroll trace.
const MIN_SCROLL_DWELL_MS: u64 = 500;
/// Stop issuing moves once the remaining budget falls under this margin.
const DEADLINE_MARGIN_MS: u64 = 250;

const STEP_PX: (u32, u32) = (300, 1200);
const PAUSE_MS: (u64, u64) = (300, 1000);
const FORWARD_BIAS: f64 = 0.72;
const JIGGLE_P: f64 = 0.4;
const JIGGLE_PAUSE_MS: (u64, u64) = (150, 400);
const JIGGLE_PX: (u32, u32) = (80, 180);

#[derive(Debug, Clone, Copy)]
pub struct DwellConfig {
    pub scroll_enabled: bool,
    pub max_moves: u32,
}

impl From<&WalkerConfig> for DwellConfig {
    fn from(cfg: &WalkerConfig) -> Self {
        Self {
            scroll_enabled: cfg.scroll_during_dwell,
            max_moves: cfg.max_scroll_moves.clamp(1, 6),
        }
    }
}

/// Pick a dwell duration: uniform whole seconds in 2..=max(2, configured max).
pub fn pick_dwell_duration(max_seconds: u64) -> Duration {
    let hi = max_seconds.max(2);
    let secs = {
        let mut rng = rand::rng();
        rng.random_range(2..=hi)
    };
    Duration::from_secs(secs)
}

/// Spend `total` inside the current detail view.
///
/// Scrolling is redirected at the detail view's own surfaces for the
/// duration; the caller's list-scroll context is restored before returning.
pub async fn dwell_with_scroll(
    resolver: &mut ScrollTargetResolver,
    cfg: &DwellConfig,
    total: Duration,
) -> DriverResult<()> {
    if !cfg.scroll_enabled || total < Duration::from_millis(MIN_SCROLL_DWELL_MS) {
        sleep(total).await;
        return Ok(());
    }

    let snap = resolver.snapshot();
    resolver.pick_best().await?;
    sleep(Duration::from_millis(50)).await;

    let moves = {
        let mut rng = rand::rng();
        rng.random_range(1..=cfg.max_moves.max(1))
    };
    let deadline = Instant::now() + total;

    for _ in 0..moves {
        let now = Instant::now();
        if now + Duration::from_millis(DEADLINE_MARGIN_MS) >= deadline {
            break;
        }

        let pause = {
            let mut rng = rand::rng();
            Duration::from_millis(rng.random_range(PAUSE_MS.0..=PAUSE_MS.1))
        };
        if now + pause >= deadline {
            sleep(deadline.saturating_duration_since(Instant::now())).await;
            break;
        }
        sleep(pause).await;

        let step = {
            let mut rng = rand::rng();
            let magnitude = rng.random_range(STEP_PX.0..=STEP_PX.1) as f64;
            if rng.random::<f64>() < FORWARD_BIAS {
                magnitude
            } else {
                -magnitude
            }
        };
        resolver.scroll_by_smart(step).await?;

        let jiggle = {
            let mut rng = rand::rng();
            if rng.random::<f64>() < JIGGLE_P {
                Some((
                    Duration::from_millis(rng.random_range(JIGGLE_PAUSE_MS.0..=JIGGLE_PAUSE_MS.1)),
                    rng.random_range(JIGGLE_PX.0..=JIGGLE_PX.1) as f64,
                ))
            } else {
                None
            }
        };
        if let Some((pause, px)) = jiggle {
            sleep(pause).await;
            resolver.scroll_by_smart(-step.signum() * px).await?;
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if !remaining.is_zero() {
        sleep(remaining).await;
    }

    resolver.restore(snap);
    Ok(())
}
