use std::time::{Duration, Instant};

use crate::vial::Vial;

/// How many matches are listed and highlighted at once.
pub const MAX_LISTED_VIALS: usize = 10;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(50);

/// Returns the positions of all vials whose label contains `query`, in list order.
///
/// Matching is case-sensitive. A blank query selects nothing so the overlay
/// stays clean until the user types something.
pub fn filter(vials: &[Vial], query: &str) -> Vec<usize> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    vials
        .iter()
        .enumerate()
        .filter(|(_, vial)| vial.label.contains(query))
        .map(|(index, _)| index)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultEntry {
    pub vial_index: usize,
    pub with_preview: bool,
}

/// Builds the visible result list: only the best match gets a cropped preview.
pub fn result_entries(selection: &[usize]) -> Vec<ResultEntry> {
    selection
        .iter()
        .take(MAX_LISTED_VIALS)
        .enumerate()
        .map(|(position, &vial_index)| ResultEntry {
            vial_index,
            with_preview: position == 0,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSearch {
    query: String,
    due_at: Instant,
}

impl PendingSearch {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.due_at
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.due_at.saturating_duration_since(now)
    }
}

/// Replaces whatever search was waiting with one for `query`, due after `delay`.
pub fn reschedule(
    previous: Option<PendingSearch>,
    query: String,
    now: Instant,
    delay: Duration,
) -> PendingSearch {
    if let Some(previous) = previous {
        log::trace!("Cancelled pending search for {:?}", previous.query());
    }
    PendingSearch {
        query,
        due_at: now + delay,
    }
}

#[derive(Debug, Default)]
pub struct SearchDebouncer {
    pending: Option<PendingSearch>,
}

impl SearchDebouncer {
    pub fn push(&mut self, query: String, now: Instant) {
        self.pending = Some(reschedule(
            self.pending.take(),
            query,
            now,
            SEARCH_DEBOUNCE,
        ));
    }

    /// Hands out the query once input has been quiet for the debounce window.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        if !self.pending.as_ref()?.is_due(now) {
            return None;
        }
        self.pending.take().map(|pending| pending.query)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending.as_ref().map(|pending| pending.remaining(now))
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
