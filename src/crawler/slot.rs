//! The page a task holds, shared with the blocking threads that open and
//! drive it.

use crate::scrapers::traits::{PageProvider, RenderedPage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct SlotState {
    page: Option<Arc<dyn RenderedPage>>,
    closed: bool,
}

/// Holds at most one page until its task ends.
///
/// A page acquired after the slot was closed (the task timed out while the
/// browser was still opening a tab) is released on arrival.
#[derive(Default)]
pub struct PageSlot {
    state: Mutex<SlotState>,
}

impl PageSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<Arc<dyn RenderedPage>> {
        self.state().page.clone()
    }

    /// None when the slot is already closed; the page has then been released
    pub fn fill(&self, page: Arc<dyn RenderedPage>, pages: &dyn PageProvider) -> Option<Arc<dyn RenderedPage>> {
        let mut state = self.state();
        if state.closed {
            drop(state);
            debug!("page arrived after its task ended, releasing");
            pages.release(page);
            return None;
        }
        state.page = Some(page.clone());
        Some(page)
    }

    /// Refuse further pages and hand back the one held, if any
    pub fn close(&self) -> Option<Arc<dyn RenderedPage>> {
        let mut state = self.state();
        state.closed = true;
        state.page.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FixturePage, FixtureProvider};
    use std::sync::atomic::Ordering;

    #[test]
    fn open_slot_keeps_the_page() {
        let provider = FixtureProvider::new(vec![]);
        let slot = PageSlot::new();
        assert!(slot.current().is_none());

        let page = Arc::new(FixturePage::single("PAP", "<html></html>"));
        assert!(slot.fill(page.clone(), &provider).is_some());
        assert!(slot.current().is_some());
        assert!(slot.close().is_some());
        assert!(slot.current().is_none());
        assert!(!page.is_closed());
    }

    #[test]
    fn late_page_is_released() {
        let provider = FixtureProvider::new(vec![]);
        let slot = PageSlot::new();
        assert!(slot.close().is_none());

        let page = Arc::new(FixturePage::single("PAP", "<html></html>"));
        assert!(slot.fill(page.clone(), &provider).is_none());
        assert!(page.is_closed());
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }
}
