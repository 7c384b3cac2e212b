//! Derived views of the request list: filtered, sorted, summarized.
//!
//! The free functions compute from scratch. [`Selectors`] wraps them with
//! single-entry caches keyed on the identity of the shared record list and
//! filters, so repeated queries between state changes are free.

use super::filters::Filters;
use super::sorters::SortType;
use super::store::{AppState, Record, SortBy};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, order-stable list of records ready for display
pub type RequestList = Arc<Vec<Arc<Record>>>;

/// Lower bound of the waterfall scale (px per ms)
pub const WATERFALL_SCALE_EPSILON: f64 = 0.001;

/// Footer totals over the displayed requests
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub bytes: u64,
    pub millis: f64,
}

/// Sort `requests` for display.
///
/// A clone is compared through its original (looked up in `all`) and placed
/// right next to it; ties keep storage order. The direction applies last.
pub fn sort_requests(requests: &[Arc<Record>], all: &[Arc<Record>], sort_by: SortBy) -> Vec<Arc<Record>> {
    let positions: HashMap<&str, usize> = all
        .iter()
        .enumerate()
        .map(|(idx, r)| (r.id.as_str(), idx))
        .collect();

    let mut keyed: Vec<(&Arc<Record>, &Record, usize, bool)> = requests
        .iter()
        .map(|r| {
            let original = r
                .id
                .original_id()
                .and_then(|orig| positions.get(orig.as_str()).map(|&idx| (&*all[idx], idx)));
            match original {
                Some((orig, idx)) => (r, orig, idx, true),
                None => (r, &**r, positions.get(r.id.as_str()).copied().unwrap_or(usize::MAX), false),
            }
        })
        .collect();

    let sort_type = sort_by.sort_type.unwrap_or(SortType::Waterfall);
    let direction = |ord: Ordering| if sort_by.ascending { ord } else { ord.reverse() };

    keyed.sort_by(|(_, a, a_idx, a_clone), (_, b, b_idx, b_clone)| {
        direction(sort_type.compare(a, b))
            .then_with(|| a_idx.cmp(b_idx))
            .then_with(|| direction(a_clone.cmp(b_clone)))
    });

    keyed.into_iter().map(|(r, ..)| Arc::clone(r)).collect()
}

pub fn filter_requests(requests: &[Arc<Record>], filters: &Filters) -> Vec<Arc<Record>> {
    requests
        .iter()
        .filter(|r| filters.matches(r))
        .cloned()
        .collect()
}

/// All records, sorted, ignoring filters
pub fn sorted_requests(state: &AppState) -> Vec<Arc<Record>> {
    sort_requests(state.requests(), state.requests(), state.sort_by())
}

/// Records passing the filters, sorted
pub fn displayed_requests(state: &AppState) -> Vec<Arc<Record>> {
    let filtered = filter_requests(state.requests(), state.filters());
    sort_requests(&filtered, state.requests(), state.sort_by())
}

pub fn summarize(requests: &[Arc<Record>]) -> Summary {
    if requests.is_empty() {
        return Summary::default();
    }

    let bytes = requests.iter().map(|r| r.content_size.unwrap_or(0)).sum();

    let oldest = requests
        .iter()
        .filter_map(|r| r.started_millis)
        .min_by(f64::total_cmp);
    let newest = requests
        .iter()
        .filter_map(|r| r.ended_millis.or(r.started_millis))
        .max_by(f64::total_cmp);
    let millis = match (oldest, newest) {
        (Some(oldest), Some(newest)) => (newest - oldest).max(0.0),
        _ => 0.0,
    };

    Summary {
        count: requests.len(),
        bytes,
        millis,
    }
}

/// Pixels per millisecond of the waterfall, or `None` until both timestamp
/// bounds are known.
pub fn waterfall_scale(state: &AppState) -> Option<f64> {
    let first = state.first_request_started_millis()?;
    let last = state.last_request_ended_millis()?;

    let longest = last - first;
    if longest <= 0.0 {
        return Some(1.0);
    }
    Some((state.waterfall_width() / longest).clamp(WATERFALL_SCALE_EPSILON, 1.0))
}

/// Compares by pointer so a cache hit means "same input", not "equal input"
#[derive(Debug)]
struct ByAddress<T>(Arc<T>);

impl<T> PartialEq for ByAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug)]
struct Memo<K, V> {
    entry: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq, V: Clone> Memo<K, V> {
    fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        match &self.entry {
            Some((cached, value)) if *cached == key => value.clone(),
            _ => {
                let value = compute();
                self.entry = Some((key, value.clone()));
                value
            }
        }
    }
}

type SortedKey = (ByAddress<Vec<Arc<Record>>>, SortBy);
type DisplayedKey = (ByAddress<Vec<Arc<Record>>>, ByAddress<Filters>, SortBy);

/// Memoized selectors over an [`AppState`]
#[derive(Debug, Default)]
pub struct Selectors {
    sorted: Memo<SortedKey, RequestList>,
    displayed: Memo<DisplayedKey, RequestList>,
    summary: Memo<ByAddress<Vec<Arc<Record>>>, Summary>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sorted_requests(&mut self, state: &AppState) -> RequestList {
        let key = (ByAddress(Arc::clone(state.requests())), state.sort_by());
        self.sorted
            .get_or_compute(key, || Arc::new(sorted_requests(state)))
    }

    pub fn displayed_requests(&mut self, state: &AppState) -> RequestList {
        let key = (
            ByAddress(Arc::clone(state.requests())),
            ByAddress(Arc::clone(state.filters())),
            state.sort_by(),
        );
        self.displayed
            .get_or_compute(key, || Arc::new(displayed_requests(state)))
    }

    pub fn displayed_summary(&mut self, state: &AppState) -> Summary {
        let displayed = self.displayed_requests(state);
        self.summary
            .get_or_compute(ByAddress(Arc::clone(&displayed)), || summarize(&displayed))
    }

    pub fn displayed_request_by_id(&mut self, state: &AppState, id: &str) -> Option<Arc<Record>> {
        self.displayed_requests(state)
            .iter()
            .find(|r| r.id.as_str() == id)
            .cloned()
    }

    /// Position of a request among the displayed requests
    pub fn request_index_by_id(&mut self, state: &AppState, id: &str) -> Option<usize> {
        self.displayed_requests(state)
            .iter()
            .position(|r| r.id.as_str() == id)
    }

    pub fn is_sidebar_toggle_disabled(&mut self, state: &AppState) -> bool {
        self.displayed_requests(state).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::actions::Action;
    use crate::monitor::filters::FilterType;
    use crate::monitor::store::RecordInit;
    use netmon_common::{RequestId, RequestUpdate};

    fn add(state: &mut AppState, id: &str, started_millis: f64, url: &str) {
        state.apply(Action::AddRequest {
            id: id.into(),
            data: RecordInit {
                started_millis: Some(started_millis),
                method: "GET".to_string(),
                url: url.to_string(),
                ..Default::default()
            },
        });
    }

    fn update(state: &mut AppState, id: &str, data: RequestUpdate) {
        state.apply(Action::UpdateRequest {
            id: id.into(),
            data,
        });
    }

    fn ids(list: &[Arc<Record>]) -> Vec<&str> {
        list.iter().map(|r| r.id.as_str()).collect()
    }

    fn populated() -> AppState {
        let mut state = AppState::new();
        add(&mut state, "a", 1000.0, "https://example.com/zeta.css");
        add(&mut state, "b", 1100.0, "https://example.com/alpha.png");
        add(&mut state, "c", 1200.0, "https://example.com/mid.js");
        for (id, size, mime) in [
            ("a", 300, "text/css"),
            ("b", 100, "image/png"),
            ("c", 200, "application/javascript"),
        ] {
            update(
                &mut state,
                id,
                RequestUpdate {
                    content_size: Some(size),
                    mime_type: Some(mime.to_string()),
                    total_time: Some(50.0),
                    ..Default::default()
                },
            );
        }
        state
    }

    #[test]
    fn test_default_order_is_waterfall() {
        let state = populated();
        assert_eq!(ids(&sorted_requests(&state)), ["a", "b", "c"]);
    }

    #[test]
    fn test_clone_stays_adjacent_in_every_order() {
        let mut state = populated();
        state.apply(Action::SelectItem(Some("b".into())));
        state.apply(Action::CloneSelectedRequest);

        for sort_type in SortType::ALL {
            for ascending in [true, false] {
                let sort_by = SortBy {
                    sort_type: Some(sort_type),
                    ascending,
                };
                let sorted = sort_requests(state.requests(), state.requests(), sort_by);
                let order = ids(&sorted);
                let orig = order.iter().position(|&id| id == "b").unwrap();
                let clone = order.iter().position(|&id| id == "b-clone").unwrap();
                assert_eq!(
                    orig.abs_diff(clone),
                    1,
                    "{:?} ascending={} gave {:?}",
                    sort_type,
                    ascending,
                    order
                );
                assert_eq!(clone > orig, ascending);
            }
        }
    }

    #[test]
    fn test_sort_by_size_descending() {
        let mut state = populated();
        state.apply(Action::SortBy(SortType::Size));
        state.apply(Action::SortBy(SortType::Size));

        assert_eq!(ids(&sorted_requests(&state)), ["a", "c", "b"]);
    }

    #[test]
    fn test_displayed_filters_then_sorts() {
        let mut state = populated();
        state.apply(Action::EnableFilterTypeOnly(FilterType::Css));
        state.apply(Action::ToggleFilterType(FilterType::Images));
        state.apply(Action::SortBy(SortType::File));

        assert_eq!(ids(&displayed_requests(&state)), ["b", "a"]);
        assert_eq!(sorted_requests(&state).len(), 3);
    }

    #[test]
    fn test_summary() {
        let state = populated();
        let summary = summarize(&displayed_requests(&state));

        assert_eq!(summary.count, 3);
        assert_eq!(summary.bytes, 600);
        assert_eq!(summary.millis, 250.0);
    }

    #[test]
    fn test_summary_without_end_times() {
        let mut state = AppState::new();
        add(&mut state, "a", 1000.0, "https://example.com/");
        add(&mut state, "b", 1400.0, "https://example.com/x");

        let summary = summarize(&displayed_requests(&state));
        assert_eq!(summary.count, 2);
        assert_eq!(summary.bytes, 0);
        assert_eq!(summary.millis, 400.0);
    }

    #[test]
    fn test_summary_after_clear_is_empty() {
        let mut state = populated();
        state.apply(Action::ClearRequests);

        assert_eq!(summarize(&displayed_requests(&state)), Summary::default());
        assert_eq!(waterfall_scale(&state), None);
    }

    #[test]
    fn test_waterfall_scale() {
        let mut state = AppState::new();
        assert_eq!(waterfall_scale(&state), None);

        add(&mut state, "a", 1000.0, "https://example.com/");
        assert_eq!(waterfall_scale(&state), Some(1.0));

        update(
            &mut state,
            "a",
            RequestUpdate {
                total_time: Some(600.0),
                ..Default::default()
            },
        );
        assert_eq!(waterfall_scale(&state), Some(0.5));

        update(
            &mut state,
            "a",
            RequestUpdate {
                total_time: Some(10_000_000.0),
                ..Default::default()
            },
        );
        assert_eq!(waterfall_scale(&state), Some(WATERFALL_SCALE_EPSILON));
    }

    #[test]
    fn test_memoized_on_identity() {
        let mut state = populated();
        let mut selectors = Selectors::new();

        let first = selectors.displayed_requests(&state);
        let second = selectors.displayed_requests(&state);
        assert!(Arc::ptr_eq(&first, &second));

        // A no-op update leaves the record list untouched
        update(&mut state, "missing", RequestUpdate::default());
        assert!(Arc::ptr_eq(&first, &selectors.displayed_requests(&state)));

        update(
            &mut state,
            "a",
            RequestUpdate {
                status: Some("404".to_string()),
                ..Default::default()
            },
        );
        let third = selectors.displayed_requests(&state);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third[0].status.as_deref(), Some("404"));
        assert_eq!(first[0].status, None);
    }

    #[test]
    fn test_index_lookups() {
        let mut state = populated();
        let mut selectors = Selectors::new();
        state.apply(Action::EnableFilterTypeOnly(FilterType::Js));

        assert_eq!(selectors.request_index_by_id(&state, "c"), Some(0));
        assert_eq!(selectors.request_index_by_id(&state, "a"), None);
        assert!(selectors.displayed_request_by_id(&state, "c").is_some());
        assert!(!selectors.is_sidebar_toggle_disabled(&state));

        state.apply(Action::SetFilterText("nothing-matches".to_string()));
        assert!(selectors.is_sidebar_toggle_disabled(&state));
        assert_eq!(selectors.displayed_summary(&state), Summary::default());
        assert_eq!(
            selectors.sorted_requests(&state).first().map(|r| r.id.clone()),
            Some(RequestId::from("a"))
        );
    }
}
