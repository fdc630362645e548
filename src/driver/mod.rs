//! Page capability seam.
//!
//! The walk engine never touches the browser directly. It speaks
//! [`PageDriver`], a small capability interface (query, click, scroll,
//! navigate). Production uses the chromiumoxide implementation in [`cdp`];
//! tests substitute a scripted fake.

pub mod cdp;

use async_trait::async_trait;
use thiserror::Error;

pub use cdp::CdpDriver;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("script evaluation failed: {0}")]
    Eval(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser connection lost: {0}")]
    Connection(String),
}

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector, first match.
    Css(String),
    /// Exact trimmed text content, first matching element in tree order.
    Text(String),
}

impl Locator {
    pub fn css(sel: impl Into<String>) -> Self {
        Self::Css(sel.into())
    }

    pub fn text(t: impl Into<String>) -> Self {
        Self::Text(t.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Window,
    Element,
}

/// One candidate scroll surface. `slot` is an opaque handle valid until the
/// next [`PageDriver::collect_surfaces`] call; a stale slot reads back as
/// missing, never as a different element.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceInfo {
    pub slot: usize,
    pub kind: SurfaceKind,
    pub scroll_range: f64,
}

/// Raw per-card page data; id extraction happens in the probe.
#[derive(Debug, Clone)]
pub struct CardSnapshot {
    pub image_src: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct PageLocation {
    pub origin: String,
    pub path: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn location(&self) -> DriverResult<PageLocation>;

    /// Number of elements matching a CSS selector.
    async fn count(&self, selector: &str) -> DriverResult<usize>;

    async fn exists(&self, locator: &Locator) -> DriverResult<bool>;

    /// Snapshot every element matching `selector`, pairing it with the `src`
    /// of its first descendant matching `image_child` and a trimmed text
    /// head. Order is current DOM order, stable only for this paint frame.
    async fn cards(&self, selector: &str, image_child: &str) -> DriverResult<Vec<CardSnapshot>>;

    /// Humanized click (pointer/mouse sequence near the element's top, then
    /// a native click fallback). `false` when the locator matched nothing.
    async fn click(&self, locator: &Locator) -> DriverResult<bool>;

    /// Same click sequence on the nth match of `selector`.
    async fn click_nth(&self, selector: &str, index: usize) -> DriverResult<bool>;

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<bool>;

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> DriverResult<bool>;

    /// Re-discover candidate scroll surfaces (window/root scroller plus every
    /// overflowing container), invalidating previously issued slots.
    async fn collect_surfaces(&self) -> DriverResult<Vec<SurfaceInfo>>;

    /// Current offset of a surface, `None` when the slot went stale.
    async fn surface_offset(&self, slot: usize) -> DriverResult<Option<f64>>;

    async fn surface_scroll_by(&self, slot: usize, delta: f64) -> DriverResult<()>;

    async fn scroll_to_top(&self) -> DriverResult<()>;

    /// In-page navigation (`location.assign`).
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// History back.
    async fn back(&self) -> DriverResult<()>;

    /// Whether `select#<id>` currently has an option with `value` or with
    /// exact display text `label`.
    async fn select_has_option(&self, id: &str, value: &str, label: &str) -> DriverResult<bool>;

    /// Assign the matching option, refocus, simulate a click, and dispatch
    /// input/change/blur so page-side listeners observe the change. `false`
    /// when the select or option is missing.
    async fn select_commit(&self, id: &str, value: &str, label: &str) -> DriverResult<bool>;
}
