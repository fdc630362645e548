// ---------------------------------------------------------------------------
// WalkerConfig: file-based config loader (card-walker.json) with env-var
// fallback, resolved once at session start.
// ---------------------------------------------------------------------------

use serde::Deserialize;

pub const ENV_CONFIG_PATH: &str = "CARD_WALKER_CONFIG";

/// Raw on-disk shape (mirrors the keys in `card-walker.json`). Every field is
/// optional; [`RawConfig::resolve`] applies env fallbacks, defaults, and
/// range clamps.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct RawConfig {
    /// List page the session starts on.
    pub target_url: Option<String>,
    /// Upper bound of the per-card dwell, in whole seconds. Floor is 2.
    pub dwell_max_seconds: Option<u64>,
    /// Base pause between cards, milliseconds (a 0..500 ms jitter is added).
    pub between_wait_ms: Option<u64>,
    /// Per-cycle card cap. 0 = unlimited.
    pub max_card_count: Option<usize>,
    /// Auto-scroll attempts while scanning for an unseen card.
    pub max_auto_scroll: Option<usize>,
    /// Whether the dwell phase scrolls at all.
    pub scroll_during_dwell: Option<bool>,
    /// Max scroll moves per dwell, clamped to 1..=6.
    pub max_scroll_moves: Option<u32>,
    pub age_sweep_enabled: Option<bool>,
    pub age_start: Option<u32>,
    pub age_end: Option<u32>,
    pub age_step: Option<u32>,
    /// Apply the first sweep value before the first cycle runs.
    pub apply_filter_before_first_cycle: Option<bool>,
}

/// Fully-resolved session configuration, read once at start.
#[derive(Clone, Debug)]
pub struct WalkerConfig {
    pub target_url: String,
    pub dwell_max_seconds: u64,
    pub between_wait_ms: u64,
    pub max_card_count: usize,
    pub max_auto_scroll: usize,
    pub scroll_during_dwell: bool,
    pub max_scroll_moves: u32,
    pub age_sweep_enabled: bool,
    pub age_start: u32,
    pub age_end: u32,
    pub age_step: u32,
    pub apply_filter_before_first_cycle: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        RawConfig::default().resolve()
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    let v = v.trim().to_ascii_lowercase();
    if v.is_empty() {
        return None;
    }
    Some(!matches!(v.as_str(), "0" | "false" | "no" | "off"))
}

impl RawConfig {
    /// Field → env var → default, then clamp.
    pub fn resolve(&self) -> WalkerConfig {
        let target_url = self
            .target_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var("CARD_WALKER_URL").ok())
            .unwrap_or_else(|| "https://www.omiai-jp.com/search".to_string());

        // Dwell floor is 2 s: one-second visits read as obviously scripted.
        let dwell_max_seconds = self
            .dwell_max_seconds
            .or_else(|| env_u64("CARD_WALKER_DWELL_MAX_SECS"))
            .unwrap_or(8)
            .max(2);

        let between_wait_ms = self
            .between_wait_ms
            .or_else(|| env_u64("CARD_WALKER_BETWEEN_WAIT_MS"))
            .unwrap_or(900);

        let max_card_count = self
            .max_card_count
            .or_else(|| env_u64("CARD_WALKER_MAX_COUNT").map(|v| v as usize))
            .unwrap_or(0);

        let max_auto_scroll = self
            .max_auto_scroll
            .or_else(|| env_u64("CARD_WALKER_MAX_AUTO_SCROLL").map(|v| v as usize))
            .unwrap_or(14);

        let scroll_during_dwell = self
            .scroll_during_dwell
            .or_else(|| env_bool("CARD_WALKER_DWELL_SCROLL"))
            .unwrap_or(true);

        let max_scroll_moves = self
            .max_scroll_moves
            .or_else(|| env_u64("CARD_WALKER_DWELL_MOVES").map(|v| v as u32))
            .unwrap_or(6)
            .clamp(1, 6);

        let age_sweep_enabled = self
            .age_sweep_enabled
            .or_else(|| env_bool("CARD_WALKER_AGE_SWEEP"))
            .unwrap_or(true);

        let age_start = self
            .age_start
            .or_else(|| env_u64("CARD_WALKER_AGE_START").map(|v| v as u32))
            .unwrap_or(33)
            .clamp(18, 99);

        let age_end = self
            .age_end
            .or_else(|| env_u64("CARD_WALKER_AGE_END").map(|v| v as u32))
            .unwrap_or(36)
            .clamp(age_start, 99);

        let age_step = self
            .age_step
            .or_else(|| env_u64("CARD_WALKER_AGE_STEP").map(|v| v as u32))
            .unwrap_or(1)
            .max(1);

        let apply_filter_before_first_cycle = self
            .apply_filter_before_first_cycle
            .or_else(|| env_bool("CARD_WALKER_AGE_FIRST"))
            .unwrap_or(false);

        WalkerConfig {
            target_url,
            dwell_max_seconds,
            between_wait_ms,
            max_card_count,
            max_auto_scroll,
            scroll_during_dwell,
            max_scroll_moves,
            age_sweep_enabled,
            age_start,
            age_end,
            age_step,
            apply_filter_before_first_cycle,
        }
    }
}

/// Load `card-walker.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `CARD_WALKER_CONFIG` env var path
/// 2. `./card-walker.json`
/// 3. `../card-walker.json`
///
/// Missing file → defaults (all env-var fallbacks apply).
/// Parse error → log a warning, return defaults.
pub fn load() -> WalkerConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("card-walker.json"),
            std::path::PathBuf::from("../card-walker.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    tracing::info!("config: card-walker.json loaded from {}", path.display());
                    return raw.resolve();
                }
                Err(e) => {
                    tracing::warn!(
                        "config: parse error at {}: {}, using defaults",
                        path.display(),
                        e
                    );
                    return RawConfig::default().resolve();
                }
            },
            Err(_) => continue, // not found at this path, try next
        }
    }

    RawConfig::default().resolve()
}
