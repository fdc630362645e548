//! Stateless queries over the current document: card enumeration, route
//! classification, and the last-card signature used to detect freshly
//! loaded content.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::types::{Card, Route};
use crate::driver::{DriverResult, PageDriver};

/// One list entry in the source list view.
pub const CARD_SELECTOR: &str = ".Profile__ProfileBox-sc-14hjqgs-0";
/// Container the list view renders into; its absence marks a detail view.
pub const LIST_ROOT_SELECTOR: &str = ".ResultList__StyledDiv-sc-15q2fqo-0";
/// Descendant image whose `src` carries the entry id.
const CARD_IMAGE_SELECTOR: &str = r#"img[src*="profile_photo/"]"#;

const SIGNATURE_TEXT_LEN: usize = 80;

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)profile_photo/(\d+)/").expect("valid id pattern"))
}

/// Parse the numeric entry id out of an image reference.
pub fn extract_id(image_src: &str) -> Option<String> {
    id_pattern()
        .captures(image_src)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The known detail patterns: `/profile`, `/profile/...`, `/profile?...`.
pub fn path_is_detail(path: &str) -> bool {
    match path.strip_prefix("/profile") {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

pub struct PageProbe {
    driver: Arc<dyn PageDriver>,
}

impl PageProbe {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self { driver }
    }

    /// List iff a card is visible. Detail iff the path matches a known detail
    /// pattern or the list markers are gone. The ambiguous in-between state
    /// (no detail path, no cards) also reads as Detail: re-scanning a stale
    /// list is worse than waiting out a transition.
    pub async fn classify_route(&self) -> DriverResult<Route> {
        let loc = self.driver.location().await?;
        if path_is_detail(&loc.path) {
            return Ok(Route::Detail);
        }
        if self.driver.count(CARD_SELECTOR).await? > 0 {
            return Ok(Route::List);
        }
        Ok(Route::Detail)
    }

    pub async fn on_list_page(&self) -> DriverResult<bool> {
        Ok(self.driver.count(CARD_SELECTOR).await? > 0)
    }

    pub async fn card_count(&self) -> DriverResult<usize> {
        self.driver.count(CARD_SELECTOR).await
    }

    /// All cards in current DOM order. Stable only for this paint frame.
    pub async fn enumerate_cards(&self) -> DriverResult<Vec<Card>> {
        let snapshots = self.driver.cards(CARD_SELECTOR, CARD_IMAGE_SELECTOR).await?;
        Ok(snapshots
            .into_iter()
            .enumerate()
            .map(|(index, snap)| Card {
                index,
                id: snap.image_src.as_deref().and_then(extract_id),
                snippet: snap.text,
            })
            .collect())
    }

    /// Cheap fingerprint of the last enumerated card: `id:<n>` when the id is
    /// extractable, a truncated text fallback otherwise. `None` on an empty
    /// list.
    pub async fn last_card_signature(&self) -> DriverResult<Option<String>> {
        let cards = self.enumerate_cards().await?;
        Ok(cards.last().map(|card| match &card.id {
            Some(id) => format!("id:{id}"),
            None => {
                let head: String = card.snippet.chars().take(SIGNATURE_TEXT_LEN).collect();
                format!("t:{head}")
            }
        }))
    }
}
