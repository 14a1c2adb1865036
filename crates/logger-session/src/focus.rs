use std::sync::Mutex;

use activity_log::{EventKind, TabSnapshot};

/// Remembers which tab currently has focus, as far as browser events tell.
#[derive(Debug, Default)]
pub struct FocusTracker {
    current: Mutex<Option<TabSnapshot>>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a browser event; only events that move focus count.
    pub fn observe(&self, kind: EventKind, tab: &TabSnapshot) {
        if !matches!(
            kind,
            EventKind::WindowActivated | EventKind::TabActivated | EventKind::TabOpened
        ) {
            return;
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(tab.clone());
        }
    }

    /// The focused tab, or a blank snapshot before any focus event.
    pub fn current(&self) -> TabSnapshot {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_until_focus_event() {
        let focus = FocusTracker::new();
        assert_eq!(focus.current(), TabSnapshot::default());

        let tab = TabSnapshot::new("4", 1, "News", "https://news.example/");
        focus.observe(EventKind::TabClosed, &tab);
        assert_eq!(focus.current(), TabSnapshot::default());

        focus.observe(EventKind::TabActivated, &tab);
        assert_eq!(focus.current(), tab);
    }

    #[test]
    fn later_activation_wins() {
        let focus = FocusTracker::new();
        let first = TabSnapshot::new("1", 0, "a", "https://a/");
        let second = TabSnapshot::new("2", 1, "b", "https://b/");
        focus.observe(EventKind::WindowActivated, &first);
        focus.observe(EventKind::TabDeactivated, &second);
        focus.observe(EventKind::TabOpened, &second);
        assert_eq!(focus.current(), second);
    }
}
