//! Scripted in-memory page standing in for the browser behind the
//! `PageDriver` seam. The model is deliberately small: a path, a visible
//! card list, a condition-panel state machine, and a set of scroll surfaces
//! with scripted responsiveness.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use card_walker::driver::{
    CardSnapshot, DriverResult, Locator, PageDriver, PageLocation, SurfaceInfo, SurfaceKind,
};

pub const ORIGIN: &str = "https://www.example-list.test";

#[derive(Debug, Clone)]
pub struct FakeCard {
    pub id: Option<u64>,
    pub text: String,
    /// Whether an in-card click produces a route change.
    pub click_opens: bool,
}

impl FakeCard {
    pub fn with_id(id: u64) -> Self {
        Self {
            id: Some(id),
            text: format!("Member {id}, likes hiking"),
            click_opens: true,
        }
    }

    pub fn without_id(text: &str) -> Self {
        Self {
            id: None,
            text: text.to_string(),
            click_opens: true,
        }
    }

    pub fn dead(id: u64) -> Self {
        Self {
            click_opens: false,
            ..Self::with_id(id)
        }
    }

    fn image_src(&self) -> Option<String> {
        self.id
            .map(|id| format!("{ORIGIN}/cdn/profile_photo/{id}/main.jpg"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FakeSurface {
    pub kind: SurfaceKind,
    pub scroll_range: f64,
    /// A surface that stopped responding models a stale handle.
    pub responsive: bool,
    pub offset: f64,
}

impl FakeSurface {
    pub fn live(kind: SurfaceKind, range: f64) -> Self {
        Self {
            kind,
            scroll_range: range,
            responsive: true,
            offset: 0.0,
        }
    }

    pub fn dead(kind: SurfaceKind, range: f64) -> Self {
        Self {
            responsive: false,
            ..Self::live(kind, range)
        }
    }
}

/// When scripted pending cards become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealMode {
    Never,
    /// Any successful downward scroll reveals the next batch.
    OnDownScroll,
    /// Only an up-then-down pulse reveals the next batch (models a
    /// load-more trigger that needs a direction reversal).
    OnBurst,
}

#[derive(Debug, Default, Clone)]
pub struct PanelState {
    pub condition_open: bool,
    pub age_open: bool,
    pub begin: Option<u32>,
    pub end: Option<u32>,
}

#[derive(Clone)]
pub struct PageState {
    pub path: String,
    pub cards: Vec<FakeCard>,
    pub pending: VecDeque<FakeCard>,
    pub reveal_mode: RevealMode,
    pub reveal_batch: usize,
    pub last_scroll_was_up: bool,
    pub cards_by_age: HashMap<u32, Vec<FakeCard>>,
    pub surfaces: Vec<FakeSurface>,
    pub panel: PanelState,
    /// Ages selectable in both bound selects.
    pub select_options: Vec<u32>,
    pub has_condition_button: bool,
    pub has_age_label: bool,
    pub has_bound_selects: bool,
    pub has_chevron: bool,
    pub has_apply: bool,
    /// Which candidate URL shape (0, 1, 2) actually reaches the detail
    /// route, if any.
    pub working_candidate: Option<usize>,
    // Recorded activity for assertions.
    pub opened_detail_ids: Vec<String>,
    pub navigations: Vec<String>,
    pub applied_filters: Vec<(u32, u32)>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            path: "/search".to_string(),
            cards: Vec::new(),
            pending: VecDeque::new(),
            reveal_mode: RevealMode::Never,
            reveal_batch: 1,
            last_scroll_was_up: false,
            cards_by_age: HashMap::new(),
            surfaces: vec![FakeSurface::live(SurfaceKind::Window, 2000.0)],
            panel: PanelState::default(),
            select_options: (18..=99).collect(),
            has_condition_button: true,
            has_age_label: true,
            has_bound_selects: true,
            has_chevron: true,
            has_apply: true,
            working_candidate: None,
            opened_detail_ids: Vec::new(),
            navigations: Vec::new(),
            applied_filters: Vec::new(),
        }
    }
}

impl PageState {
    fn on_detail(&self) -> bool {
        self.path.starts_with("/profile")
    }

    fn reveal_pending(&mut self) {
        for _ in 0..self.reveal_batch {
            if let Some(card) = self.pending.pop_front() {
                self.cards.push(card);
            }
        }
    }
}

pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(state: PageState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_cards(cards: Vec<FakeCard>) -> Self {
        Self::new(PageState {
            cards,
            ..Default::default()
        })
    }

    pub fn snapshot(&self) -> PageState {
        self.state.lock().expect("fake page poisoned").clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().expect("fake page poisoned")
    }

    pub fn mutate(&self, f: impl FnOnce(&mut PageState)) {
        f(&mut self.lock());
    }
}

fn is_condition_button(selector: &str) -> bool {
    selector.contains("condition-icon") || selector.contains("ConditionButton")
}

fn is_chevron(selector: &str) -> bool {
    selector.contains("StyledChevron") || selector.contains("polyline")
}

fn is_card_selector(selector: &str) -> bool {
    selector.contains("ProfileBox")
}

const AGE_LABEL: &str = "年齢";
const APPLY_LABEL: &str = "この条件で検索";

#[async_trait]
impl PageDriver for FakePage {
    async fn location(&self) -> DriverResult<PageLocation> {
        let st = self.lock();
        Ok(PageLocation {
            origin: ORIGIN.to_string(),
            path: st.path.clone(),
        })
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        let st = self.lock();
        if is_card_selector(selector) && !st.on_detail() {
            return Ok(st.cards.len());
        }
        Ok(0)
    }

    async fn exists(&self, locator: &Locator) -> DriverResult<bool> {
        let st = self.lock();
        Ok(match locator {
            Locator::Css(sel) if is_condition_button(sel) => {
                !st.on_detail() && st.has_condition_button
            }
            Locator::Css(sel) if is_chevron(sel) => st.panel.age_open && st.has_chevron,
            Locator::Css(sel) if sel.contains("begin_age") || sel.contains("end_age") => {
                st.panel.age_open && st.has_bound_selects
            }
            Locator::Text(t) if t == AGE_LABEL => st.panel.condition_open && st.has_age_label,
            Locator::Text(t) if t == APPLY_LABEL => {
                st.panel.condition_open && !st.panel.age_open && st.has_apply
            }
            _ => false,
        })
    }

    async fn cards(&self, selector: &str, _image_child: &str) -> DriverResult<Vec<CardSnapshot>> {
        let st = self.lock();
        if !is_card_selector(selector) || st.on_detail() {
            return Ok(Vec::new());
        }
        Ok(st
            .cards
            .iter()
            .map(|c| CardSnapshot {
                image_src: c.image_src(),
                text: c.text.clone(),
            })
            .collect())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<bool> {
        let mut st = self.lock();
        match locator {
            Locator::Css(sel) if is_condition_button(sel) => {
                if st.has_condition_button {
                    st.panel.condition_open = true;
                    return Ok(true);
                }
                Ok(false)
            }
            Locator::Css(sel) if is_chevron(sel) => {
                if st.panel.age_open {
                    st.panel.age_open = false;
                    return Ok(true);
                }
                Ok(false)
            }
            Locator::Text(t) if t == AGE_LABEL => {
                if st.panel.condition_open && st.has_age_label {
                    st.panel.age_open = true;
                    return Ok(true);
                }
                Ok(false)
            }
            Locator::Text(t) if t == APPLY_LABEL => {
                if st.panel.condition_open && st.has_apply {
                    let begin = st.panel.begin.unwrap_or(0);
                    let end = st.panel.end.unwrap_or(0);
                    st.applied_filters.push((begin, end));
                    st.cards = st.cards_by_age.get(&begin).cloned().unwrap_or_default();
                    st.pending.clear();
                    st.panel = PanelState::default();
                    return Ok(true);
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn click_nth(&self, selector: &str, index: usize) -> DriverResult<bool> {
        let mut st = self.lock();
        if !is_card_selector(selector) || st.on_detail() {
            return Ok(false);
        }
        let Some(card) = st.cards.get(index).cloned() else {
            return Ok(false);
        };
        if card.click_opens {
            st.path = match card.id {
                Some(id) => format!("/profile/{id}"),
                None => "/profile".to_string(),
            };
            let key = card
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("anon:{}", card.text));
            st.opened_detail_ids.push(key);
        }
        Ok(true)
    }

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<bool> {
        self.exists(locator).await
    }

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> DriverResult<bool> {
        let st = self.lock();
        Ok(is_card_selector(selector) && index < st.cards.len())
    }

    async fn collect_surfaces(&self) -> DriverResult<Vec<SurfaceInfo>> {
        let st = self.lock();
        Ok(st
            .surfaces
            .iter()
            .enumerate()
            .map(|(slot, s)| SurfaceInfo {
                slot,
                kind: s.kind,
                scroll_range: s.scroll_range,
            })
            .collect())
    }

    async fn surface_offset(&self, slot: usize) -> DriverResult<Option<f64>> {
        let st = self.lock();
        Ok(st.surfaces.get(slot).map(|s| s.offset))
    }

    async fn surface_scroll_by(&self, slot: usize, delta: f64) -> DriverResult<()> {
        let mut st = self.lock();
        let Some(surface) = st.surfaces.get_mut(slot) else {
            return Ok(());
        };
        if !surface.responsive {
            return Ok(());
        }
        surface.offset = (surface.offset + delta).max(0.0);

        if delta < 0.0 {
            st.last_scroll_was_up = true;
        } else if delta > 0.0 {
            let reveal = match st.reveal_mode {
                RevealMode::Never => false,
                RevealMode::OnDownScroll => true,
                RevealMode::OnBurst => st.last_scroll_was_up,
            };
            st.last_scroll_was_up = false;
            if reveal && !st.on_detail() {
                st.reveal_pending();
            }
        }
        Ok(())
    }

    async fn scroll_to_top(&self) -> DriverResult<()> {
        let mut st = self.lock();
        for s in &mut st.surfaces {
            s.offset = 0.0;
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut st = self.lock();
        st.navigations.push(url.to_string());

        // Which candidate shape is this? 0 = /profile/{id}, 1 = ?id=, 2 = bare.
        let shape = if url.contains("?id=") {
            1
        } else if url.ends_with("/profile") {
            2
        } else if url.contains("/profile/") {
            0
        } else {
            return Ok(());
        };
        if st.working_candidate == Some(shape) {
            st.path = "/profile".to_string();
            st.opened_detail_ids.push(format!("nav:{url}"));
        }
        Ok(())
    }

    async fn back(&self) -> DriverResult<()> {
        let mut st = self.lock();
        if st.panel.age_open {
            st.panel.age_open = false;
        } else {
            st.path = "/search".to_string();
        }
        Ok(())
    }

    async fn select_has_option(&self, _id: &str, value: &str, _label: &str) -> DriverResult<bool> {
        let st = self.lock();
        if !st.panel.age_open || !st.has_bound_selects {
            return Ok(false);
        }
        Ok(value
            .parse::<u32>()
            .map(|v| st.select_options.contains(&v))
            .unwrap_or(false))
    }

    async fn select_commit(&self, id: &str, value: &str, _label: &str) -> DriverResult<bool> {
        let mut st = self.lock();
        if !st.panel.age_open || !st.has_bound_selects {
            return Ok(false);
        }
        let Ok(v) = value.parse::<u32>() else {
            return Ok(false);
        };
        if !st.select_options.contains(&v) {
            return Ok(false);
        }
        match id {
            "begin_age" => st.panel.begin = Some(v),
            "end_age" => st.panel.end = Some(v),
            _ => return Ok(false),
        }
        Ok(true)
    }
}
