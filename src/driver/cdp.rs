//! Native browser driver built on `chromiumoxide`.
//!
//! Mirrors how the rest of the crate thinks about the page: every operation
//! is one evaluated script, and element handles never cross the CDP boundary.
//! Scroll surfaces are registered page-side in a slot array
//! (`window.__cwSurfaces`); a slot issued before a re-render reads back as
//! missing and heals through the resolver's fallback path.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use super::{
    CardSnapshot, DriverError, DriverResult, Locator, PageDriver, PageLocation, SurfaceInfo,
    SurfaceKind,
};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan, which finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ] {
        if let Ok(p) = which::which(name) {
            return Some(p.to_string_lossy().to_string());
        }
    }

    let known: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };
    known
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
}

fn build_browser_config(exe: &str, headless: bool) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled");

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

// ── Driver ───────────────────────────────────────────────────────────────────

pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Launch a browser, open `url`, and wait for the document to settle.
    ///
    /// The returned [`Browser`] must be kept alive (and closed) by the
    /// caller; dropping it tears down the CDP transport under the driver.
    pub async fn launch(url: &str, headless: bool) -> Result<(Browser, Self)> {
        let exe = find_chrome_executable()
            .ok_or_else(|| anyhow!("no Chromium-family browser found (set CHROME_EXECUTABLE)"))?;
        info!("driver: 🚀 launching browser ({})", exe);

        let config = build_browser_config(&exe, headless)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("browser launch failed ({}): {}", exe, e))?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("driver: CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page(url)
            .await
            .map_err(|e| anyhow!("failed to open page: {}", e))?;

        let driver = Self::new(page);
        driver.wait_document_complete(Duration::from_secs(20)).await;
        Ok((browser, driver))
    }

    /// Best-effort readiness poll; expiry is not an error.
    async fn wait_document_complete(&self, timeout: Duration) {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() >= timeout {
                info!("driver: document readiness wait timed out");
                return;
            }
            let complete: bool = self
                .eval("document.readyState === 'complete'".to_string())
                .await
                .unwrap_or(false);
            if complete {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> DriverResult<T> {
        let outcome = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| DriverError::Eval(e.to_string()))?;
        outcome
            .into_value::<T>()
            .map_err(|e| DriverError::Eval(e.to_string()))
    }

    async fn eval_unit(&self, js: String) -> DriverResult<()> {
        self.page
            .evaluate(js)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Eval(e.to_string()))
    }
}

/// Quote a Rust string as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// JS expression resolving a [`Locator`] to an element (or null).
fn locate_expr(locator: &Locator) -> String {
    match locator {
        Locator::Css(sel) => format!("document.querySelector({})", js_str(sel)),
        Locator::Text(text) => format!("__cwByText({})", js_str(text)),
    }
}

/// Shared helpers injected ahead of snippets that need them. `__cwClick`
/// reproduces a human tap: nearest clickable, a point near the element's top,
/// pointer/mouse sequence, then the native click as a last resort.
const JS_HELPERS: &str = r#"
const __cwByText = (exact) => {
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT, null);
    while (walker.nextNode()) {
        const el = walker.currentNode;
        if ((el.textContent || '').trim() === exact) return el;
    }
    return null;
};
const __cwClick = (el) => {
    const clickable = el.closest('button, a, [role="button"]')
        || el.querySelector('img, button, a, [role="button"]')
        || el;
    const rect = clickable.getBoundingClientRect();
    const cx = Math.floor(rect.left + rect.width / 2);
    const cy = Math.floor(rect.top + Math.min(24, rect.height / 2));
    const base = {
        bubbles: true, cancelable: true, composed: true,
        clientX: Math.max(0, cx), clientY: Math.max(0, cy)
    };
    const fire = (type) => {
        try {
            const Ctor = type.startsWith('pointer') ? PointerEvent : MouseEvent;
            clickable.dispatchEvent(new Ctor(type, base));
        } catch (e) {}
    };
    fire('pointerdown');
    fire('mousedown');
    fire('mouseup');
    fire('click');
    try { if (typeof clickable.click === 'function') clickable.click(); } catch (e) {}
};
"#;

#[derive(Deserialize)]
struct RawSurface {
    slot: usize,
    kind: String,
    range: f64,
}

#[derive(Deserialize)]
struct RawCard {
    src: Option<String>,
    text: String,
}

#[derive(Deserialize)]
struct RawLocation {
    origin: String,
    path: String,
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn location(&self) -> DriverResult<PageLocation> {
        let raw: RawLocation = self
            .eval("(() => ({ origin: location.origin, path: location.pathname }))()".to_string())
            .await?;
        Ok(PageLocation {
            origin: raw.origin,
            path: raw.path,
        })
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        self.eval(format!(
            "document.querySelectorAll({}).length",
            js_str(selector)
        ))
        .await
    }

    async fn exists(&self, locator: &Locator) -> DriverResult<bool> {
        self.eval(format!(
            "(() => {{ {JS_HELPERS} return !!({}); }})()",
            locate_expr(locator)
        ))
        .await
    }

    async fn cards(&self, selector: &str, image_child: &str) -> DriverResult<Vec<CardSnapshot>> {
        let raw: Vec<RawCard> = self
            .eval(format!(
                r#"(() => Array.from(document.querySelectorAll({sel})).map(el => {{
                    const img = el.querySelector({img});
                    return {{
                        src: img ? (img.getAttribute('src') || '') : null,
                        text: (el.textContent || '').trim().slice(0, 120)
                    }};
                }}))()"#,
                sel = js_str(selector),
                img = js_str(image_child),
            ))
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| CardSnapshot {
                image_src: c.src,
                text: c.text,
            })
            .collect())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                {JS_HELPERS}
                const el = {expr};
                if (!el) return false;
                __cwClick(el);
                return true;
            }})()"#,
            expr = locate_expr(locator)
        ))
        .await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                {JS_HELPERS}
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return false;
                __cwClick(el);
                return true;
            }})()"#,
            sel = js_str(selector),
        ))
        .await
    }

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                {JS_HELPERS}
                const el = {expr};
                if (!el) return false;
                try {{ el.scrollIntoView({{ block: 'center', behavior: 'auto' }}); }} catch (e) {{}}
                return true;
            }})()"#,
            expr = locate_expr(locator)
        ))
        .await
    }

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return false;
                try {{ el.scrollIntoView({{ block: 'center', behavior: 'auto' }}); }} catch (e) {{}}
                return true;
            }})()"#,
            sel = js_str(selector),
        ))
        .await
    }

    async fn collect_surfaces(&self) -> DriverResult<Vec<SurfaceInfo>> {
        let raw: Vec<RawSurface> = self
            .eval(
                r#"(() => {
                const isScrollable = (el) => {
                    if (!el) return false;
                    const cs = getComputedStyle(el);
                    const oy = cs.overflowY;
                    return (oy === 'auto' || oy === 'scroll')
                        && (el.scrollHeight - el.clientHeight) > 8;
                };
                const found = [];
                const hinted = [
                    document.querySelector('#wrapBox'),
                    document.querySelector('.WrapBox__StyledWrapBox'),
                    document.querySelector('.ResultList__StyledDiv-sc-15q2fqo-0'),
                    document.querySelector('main'),
                    document.getElementById('__next'),
                ].filter(Boolean);
                hinted.forEach(el => { if (isScrollable(el)) found.push(el); });
                document.querySelectorAll('div,main,section,article').forEach(el => {
                    if (isScrollable(el)) found.push(el);
                });
                const uniq = Array.from(new Set(found));
                window.__cwSurfaces = uniq;
                const root = document.scrollingElement || document.documentElement;
                const out = [{
                    slot: 0,
                    kind: 'window',
                    range: Math.max(0, root.scrollHeight - root.clientHeight)
                }];
                uniq.forEach((el, i) => out.push({
                    slot: i + 1,
                    kind: 'element',
                    range: el.scrollHeight - el.clientHeight
                }));
                return out;
            })()"#
                    .to_string(),
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|s| SurfaceInfo {
                slot: s.slot,
                kind: if s.kind == "window" {
                    SurfaceKind::Window
                } else {
                    SurfaceKind::Element
                },
                scroll_range: s.range,
            })
            .collect())
    }

    async fn surface_offset(&self, slot: usize) -> DriverResult<Option<f64>> {
        if slot == 0 {
            let top: f64 = self
                .eval(
                    "(document.scrollingElement || document.documentElement).scrollTop"
                        .to_string(),
                )
                .await?;
            return Ok(Some(top));
        }
        self.eval(format!(
            r#"(() => {{
                const el = (window.__cwSurfaces || [])[{}];
                return el ? el.scrollTop : null;
            }})()"#,
            slot - 1
        ))
        .await
    }

    async fn surface_scroll_by(&self, slot: usize, delta: f64) -> DriverResult<()> {
        if slot == 0 {
            return self.eval_unit(format!("window.scrollBy(0, {delta})")).await;
        }
        self.eval_unit(format!(
            r#"(() => {{
                const el = (window.__cwSurfaces || [])[{}];
                if (el) el.scrollBy(0, {delta});
            }})()"#,
            slot - 1
        ))
        .await
    }

    async fn scroll_to_top(&self) -> DriverResult<()> {
        self.eval_unit("window.scrollTo(0, 0)".to_string()).await
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.page
            .evaluate(format!("location.assign({})", js_str(url)))
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation(e.to_string()))
    }

    async fn back(&self) -> DriverResult<()> {
        self.page
            .evaluate("history.back()")
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Navigation(e.to_string()))
    }

    async fn select_has_option(&self, id: &str, value: &str, label: &str) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const sel = document.getElementById({id});
                if (!sel) return false;
                return Array.from(sel.options).some(o =>
                    o.value === {value} || (o.textContent || '').trim() === {label});
            }})()"#,
            id = js_str(id),
            value = js_str(value),
            label = js_str(label),
        ))
        .await
    }

    async fn select_commit(&self, id: &str, value: &str, label: &str) -> DriverResult<bool> {
        self.eval(format!(
            r#"(() => {{
                {JS_HELPERS}
                const sel = document.getElementById({id});
                if (!sel) return false;
                const opt = Array.from(sel.options).find(o =>
                    o.value === {value} || (o.textContent || '').trim() === {label});
                if (!opt) return false;
                sel.value = opt.value;
                opt.selected = true;
                try {{ sel.focus(); }} catch (e) {{}}
                try {{ __cwClick(sel); }} catch (e) {{}}
                sel.dispatchEvent(new Event('input', {{ bubbles: true }}));
                sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
                sel.dispatchEvent(new Event('blur', {{ bubbles: true }}));
                return true;
            }})()"#,
            id = js_str(id),
            value = js_str(value),
            label = js_str(label),
        ))
        .await
    }
}
