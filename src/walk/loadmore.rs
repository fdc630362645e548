//! Forced lazy-load protocol for an apparently exhausted list.
//!
//! Many infinite-scroll implementations only fire their load-more trigger on
//! a genuine direction reversal near the bottom, not on a single continuous
//! scroll. Each burst therefore pulses up a little before diving back down,
//! and success is judged by comparing card count and last-card signature
//! against a baseline captured before the first burst.

use std::time::Duration;

use rand::distr::{Distribution, Uniform};
use tokio::time::sleep;
use tracing::debug;

use crate::driver::DriverResult;
use crate::walk::probe::PageProbe;
use crate::walk::scroll::ScrollTargetResolver;

pub const PRIME_BURSTS: usize = 10;
const PRIME_STEP_PX: f64 = 1200.0;
const PRIME_SETTLE_MS: u64 = 900;
const PRIME_SETTLE_JITTER_MS: u64 = 300;
const UP_PULSE_PX: f64 = 200.0;
const UP_SETTLE_MS: u64 = 150;
const UP_SETTLE_JITTER_MS: u64 = 120;

fn jittered(base_ms: u64, jitter_ms: u64) -> Duration {
    let extra = {
        let mut rng = rand::rng();
        Uniform::new(0, jitter_ms)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(0)
    };
    Duration::from_millis(base_ms + extra)
}

/// Run up to `max_bursts` up-then-down pulses. Returns `true` as soon as new
/// content is detected, `false` when the source looks genuinely exhausted.
pub async fn force_load_more(
    probe: &PageProbe,
    resolver: &mut ScrollTargetResolver,
    max_bursts: usize,
) -> DriverResult<bool> {
    let base_count = probe.card_count().await?;
    let base_signature = probe.last_card_signature().await?;

    for burst in 0..max_bursts {
        resolver.scroll_by_smart(-UP_PULSE_PX).await?;
        sleep(jittered(UP_SETTLE_MS, UP_SETTLE_JITTER_MS)).await;

        resolver.scroll_by_smart(PRIME_STEP_PX).await?;
        sleep(jittered(PRIME_SETTLE_MS, PRIME_SETTLE_JITTER_MS)).await;

        let count = probe.card_count().await?;
        let signature = probe.last_card_signature().await?;
        if count > base_count || signature != base_signature {
            debug!(
                "loadmore: new content after burst {} ({} -> {} cards)",
                burst + 1,
                base_count,
                count
            );
            return Ok(true);
        }
    }

    debug!("loadmore: no new content after {max_bursts} burst(s)");
    Ok(false)
}
