//! In-memory pages for exercising browser attempts without a browser.

use crate::scrapers::browser::SessionMode;
use crate::scrapers::traits::{PageProvider, RenderedPage};
use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pauses at least this long move the fixture to its next state.
const ADVANCE_AFTER: Duration = Duration::from_secs(10);

pub struct FixturePage {
    states: Vec<(String, String)>,
    index: AtomicUsize,
    moves: AtomicUsize,
    closed: AtomicBool,
    visited: Mutex<Vec<String>>,
    fail_navigation: bool,
}

impl FixturePage {
    pub fn single(title: &str, html: &str) -> Self {
        Self::sequence(vec![(title, html)])
    }

    /// States are served in order; a long pause (a challenge wait) moves on
    pub fn sequence(states: Vec<(&str, &str)>) -> Self {
        Self {
            states: states
                .into_iter()
                .map(|(t, h)| (t.to_string(), h.to_string()))
                .collect(),
            index: AtomicUsize::new(0),
            moves: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            visited: Mutex::new(Vec::new()),
            fail_navigation: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_navigation: true,
            ..Self::single("", "")
        }
    }

    fn current(&self) -> (String, String) {
        let idx = self.index.load(Ordering::SeqCst).min(self.states.len().saturating_sub(1));
        self.states.get(idx).cloned().unwrap_or_default()
    }

    pub fn pointer_moves(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RenderedPage for FixturePage {
    fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        if self.fail_navigation {
            return Err(anyhow!("net::ERR_CONNECTION_RESET"));
        }
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn title(&self) -> Result<String> {
        Ok(self.current().0)
    }

    fn content(&self) -> Result<String> {
        Ok(self.current().1)
    }

    fn wait_for(&self, selector: &str, _timeout: Duration) -> bool {
        let Ok(selector) = Selector::parse(selector) else {
            return false;
        };
        let document = Html::parse_document(&self.current().1);
        let found = document.select(&selector).next().is_some();
        found
    }

    fn run_script(&self, _script: &str) -> Result<()> {
        Ok(())
    }

    fn move_pointer(&self, _x: f64, _y: f64) -> Result<()> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG fixture".to_vec())
    }

    fn pause(&self, duration: Duration) {
        if duration >= ADVANCE_AFTER {
            self.index.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves one fixture page per acquisition, in order
pub struct FixtureProvider {
    pages: Mutex<Vec<Arc<FixturePage>>>,
    pub acquired: Mutex<Vec<SessionMode>>,
    pub released: AtomicUsize,
    acquire_delay: Duration,
}

impl FixtureProvider {
    pub fn new(pages: Vec<FixturePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(Arc::new).rev().collect()),
            acquired: Mutex::new(Vec::new()),
            released: AtomicUsize::new(0),
            acquire_delay: Duration::ZERO,
        }
    }

    /// Each acquisition blocks for `delay` first, like a tab that is slow to open
    pub fn slow(pages: Vec<FixturePage>, delay: Duration) -> Self {
        Self {
            acquire_delay: delay,
            ..Self::new(pages)
        }
    }
}

impl PageProvider for FixtureProvider {
    fn acquire(&self, mode: SessionMode) -> Result<Arc<dyn RenderedPage>> {
        std::thread::sleep(self.acquire_delay);
        self.acquired.lock().unwrap().push(mode);
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| anyhow!("browser unreachable on port 9222"))?;
        Ok(page)
    }

    fn release(&self, page: Arc<dyn RenderedPage>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        let _ = page.close();
    }
}
