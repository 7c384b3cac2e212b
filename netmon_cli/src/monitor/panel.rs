//! The network panel: owns the request state, batches incoming events and
//! publishes what changed.
//!
//! Events from the protocol are queued and committed as one transition,
//! either after `refresh_rate` (lazy updating) or immediately. Work that
//! needs a body fetch runs as a follow-up future polled from [`NetMonitor::run`]
//! and re-enters as an ordinary update.

use super::actions::Action;
use super::fetch::{form_data_uri, upload_stream_headers, BodyFetcher};
use super::filters::{FilterType, Filters};
use super::resend::{CustomEdit, CustomRequest, ResendTransport};
use super::selectors::{self, RequestList, Selectors, Summary};
use super::sorters::SortType;
use super::store::{AppState, Record, RecordInit, DEFAULT_WATERFALL_WIDTH};
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use netmon_common::{LongString, NetworkEvent, NewRequest, RequestId, RequestUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Default delay between the first queued event and the flush
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(50);

/// Run after the update it was queued with has been committed
pub type UpdateCallback = Box<dyn FnOnce() + Send>;

/// Notifications for the render layer
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    RequestAdded(RequestId),
    SelectionChanged {
        old: Option<RequestId>,
        new: Option<RequestId>,
    },
    /// The selected request received new data
    SelectedUpdated(RequestId),
    SummaryChanged(Summary),
    ThumbnailDisplayed(RequestId),
}

#[derive(Debug, Clone)]
pub struct PanelOptions {
    pub refresh_rate: Duration,
    pub lazy_update: bool,
    pub filters: Vec<FilterType>,
    pub waterfall_width: f64,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            lazy_update: true,
            filters: vec![FilterType::All],
            waterfall_width: DEFAULT_WATERFALL_WIDTH,
        }
    }
}

/// Result of a follow-up future
#[derive(Debug)]
enum FollowUp {
    Update {
        id: RequestId,
        data: RequestUpdate,
        thumbnail: bool,
    },
    Preselect(RequestId),
}

struct QueuedUpdate {
    id: RequestId,
    data: RequestUpdate,
    callback: Option<UpdateCallback>,
}

pub struct NetMonitor {
    state: AppState,
    selectors: Selectors,
    fetcher: Arc<dyn BodyFetcher>,
    add_queue: Vec<(RequestId, RecordInit)>,
    update_queue: Vec<QueuedUpdate>,
    lazy_update: bool,
    refresh_rate: Duration,
    flush_deadline: Option<Instant>,
    destroyed: bool,
    follow_ups: FuturesUnordered<BoxFuture<'static, Option<FollowUp>>>,
    events: broadcast::Sender<PanelEvent>,
    watched_selected_id: Option<RequestId>,
    watched_selected_record: Option<Arc<Record>>,
    watched_summary: Summary,
}

impl NetMonitor {
    pub fn new(fetcher: Arc<dyn BodyFetcher>, options: PanelOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: AppState::configured(
                Filters::with_types(options.filters),
                options.waterfall_width,
            ),
            selectors: Selectors::new(),
            fetcher,
            add_queue: Vec::new(),
            update_queue: Vec::new(),
            lazy_update: options.lazy_update,
            refresh_rate: options.refresh_rate,
            flush_deadline: None,
            destroyed: false,
            follow_ups: FuturesUnordered::new(),
            events,
            watched_selected_id: None,
            watched_selected_record: None,
            watched_summary: Summary::default(),
        }
    }

    /// Subscribe to panel notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// When the pending flush fires, if one is armed
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }

    pub fn pending_follow_ups(&self) -> usize {
        self.follow_ups.len()
    }

    // Derived views

    pub fn displayed_requests(&mut self) -> RequestList {
        self.selectors.displayed_requests(&self.state)
    }

    pub fn sorted_requests(&mut self) -> RequestList {
        self.selectors.sorted_requests(&self.state)
    }

    pub fn summary(&mut self) -> Summary {
        self.selectors.displayed_summary(&self.state)
    }

    pub fn waterfall_scale(&self) -> Option<f64> {
        selectors::waterfall_scale(&self.state)
    }

    pub fn displayed_request_by_id(&mut self, id: &str) -> Option<Arc<Record>> {
        self.selectors.displayed_request_by_id(&self.state, id)
    }

    pub fn request_index_by_id(&mut self, id: &str) -> Option<usize> {
        self.selectors.request_index_by_id(&self.state, id)
    }

    pub fn is_sidebar_toggle_disabled(&mut self) -> bool {
        self.selectors.is_sidebar_toggle_disabled(&self.state)
    }

    /// Position of the selection among all sorted requests
    pub fn selected_index(&mut self) -> Option<usize> {
        let selected = self.state.selected_item()?.clone();
        self.sorted_requests().iter().position(|r| r.id == selected)
    }

    /// Select by position among all sorted requests; out of range clears
    /// the selection.
    pub fn select_index(&mut self, index: usize) {
        let id = self.sorted_requests().get(index).map(|r| r.id.clone());
        self.dispatch(Action::SelectItem(id));
    }

    // Event intake

    pub fn add_request(&mut self, id: RequestId, data: NewRequest) {
        self.add_queue.push((id, RecordInit::from(data)));
        self.schedule_flush();
    }

    pub fn update_request(
        &mut self,
        id: RequestId,
        data: RequestUpdate,
        callback: Option<UpdateCallback>,
    ) {
        self.update_queue.push(QueuedUpdate { id, data, callback });
        self.schedule_flush();
    }

    pub fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Add { id, data } => self.add_request(id, data),
            NetworkEvent::Update { id, data } => self.update_request(id, data, None),
            NetworkEvent::Clear => self.clear(),
        }
    }

    /// Drop every request along with anything still queued
    pub fn clear(&mut self) {
        self.add_queue.clear();
        self.update_queue.clear();
        self.flush_deadline = None;
        self.dispatch(Action::ClearRequests);
    }

    pub fn set_lazy_update(&mut self, lazy: bool) {
        self.lazy_update = lazy;
        if !lazy {
            self.flush();
        }
    }

    fn schedule_flush(&mut self) {
        if self.destroyed {
            return;
        }
        if !self.lazy_update {
            self.flush();
        } else if self.flush_deadline.is_none() {
            let now = Instant::now();
            match now.checked_add(self.refresh_rate) {
                Some(deadline) => self.flush_deadline = Some(deadline),
                None => {
                    warn!("Refresh rate {:?} is out of range, flushing now", self.refresh_rate);
                    self.flush();
                }
            }
        }
    }

    /// Commit everything queued as a single transition
    pub fn flush(&mut self) {
        self.flush_deadline = None;
        let adds = std::mem::take(&mut self.add_queue);
        let updates = std::mem::take(&mut self.update_queue);

        // Prevent displaying anything received after teardown
        if self.destroyed {
            return;
        }

        debug!("Flushing {} adds and {} updates", adds.len(), updates.len());

        let added: Vec<RequestId> = adds.iter().map(|(id, _)| id.clone()).collect();
        let mut pending = Vec::with_capacity(updates.len());
        let mut actions = Vec::with_capacity(adds.len() + updates.len());

        for (id, data) in adds {
            actions.push(Action::AddRequest { id, data });
        }
        for update in updates {
            let thumbnail = update
                .data
                .response_content
                .as_ref()
                .map(|c| (c.content.text.clone(), c.content.encoding.clone()));
            let post_data = update
                .data
                .request_post_data
                .as_ref()
                .map(|p| p.post_data.text.clone());
            pending.push((update.id.clone(), thumbnail, post_data, update.callback));
            actions.push(Action::UpdateRequest {
                id: update.id,
                data: update.data,
            });
        }

        self.dispatch(Action::Batch(actions));

        for id in added {
            let _ = self.events.send(PanelEvent::RequestAdded(id));
        }

        for (id, thumbnail, post_data, callback) in pending {
            if let Some((text, encoding)) = thumbnail {
                let mime_type = self
                    .state
                    .request_by_id(id.as_str())
                    .filter(|r| r.is_image())
                    .and_then(|r| r.mime_type.clone());
                if let Some(mime_type) = mime_type {
                    self.fetch_thumbnail(id.clone(), mime_type, text, encoding);
                }
            }
            if let Some(text) = post_data {
                self.fetch_upload_headers(id, text);
            }
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn fetch_thumbnail(
        &mut self,
        id: RequestId,
        mime_type: String,
        text: LongString,
        encoding: Option<String>,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        self.follow_ups.push(
            async move {
                match fetcher.get_string(&text).await {
                    Ok(body) => Some(FollowUp::Update {
                        data: RequestUpdate {
                            response_content_data_uri: Some(form_data_uri(
                                &mime_type,
                                encoding.as_deref(),
                                &body,
                            )),
                            ..Default::default()
                        },
                        id,
                        thumbnail: true,
                    }),
                    Err(e) => {
                        warn!("Failed to fetch image body for {}: {}", id, e);
                        None
                    }
                }
            }
            .boxed(),
        );
    }

    fn fetch_upload_headers(&mut self, id: RequestId, text: LongString) {
        let fetcher = Arc::clone(&self.fetcher);
        self.follow_ups.push(
            async move {
                match fetcher.get_string(&text).await {
                    Ok(post_data) => Some(FollowUp::Update {
                        data: RequestUpdate {
                            request_headers_from_upload_stream: Some(upload_stream_headers(
                                &post_data,
                            )),
                            ..Default::default()
                        },
                        id,
                        thumbnail: false,
                    }),
                    Err(e) => {
                        warn!("Failed to fetch post data for {}: {}", id, e);
                        None
                    }
                }
            }
            .boxed(),
        );
    }

    fn handle_follow_up(&mut self, follow_up: FollowUp) {
        if self.destroyed {
            return;
        }
        match follow_up {
            FollowUp::Update {
                id,
                data,
                thumbnail,
            } => {
                if self.state.request_by_id(id.as_str()).is_none() {
                    return;
                }
                self.dispatch(Action::UpdateRequest {
                    id: id.clone(),
                    data,
                });
                if thumbnail {
                    let _ = self.events.send(PanelEvent::ThumbnailDisplayed(id));
                }
            }
            FollowUp::Preselect(id) => {
                if self.state.request_by_id(id.as_str()).is_some() {
                    self.dispatch(Action::SelectItem(Some(id)));
                } else {
                    self.dispatch(Action::PreselectItem(id));
                }
            }
        }
    }

    /// Wait for every in-flight follow-up and apply its result
    pub async fn settle(&mut self) {
        while let Some(follow_up) = self.follow_ups.next().await {
            if let Some(follow_up) = follow_up {
                self.handle_follow_up(follow_up);
            }
        }
    }

    /// Consume events until the source closes, flushing on the deadline and
    /// applying follow-ups as they complete. Whatever is still queued when
    /// the source closes is flushed and settled before returning.
    pub async fn run(&mut self, source: &mut mpsc::Receiver<NetworkEvent>) {
        loop {
            let deadline = self.flush_deadline;
            tokio::select! {
                event = source.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush();
                }
                Some(follow_up) = self.follow_ups.next(), if !self.follow_ups.is_empty() => {
                    if let Some(follow_up) = follow_up {
                        self.handle_follow_up(follow_up);
                    }
                }
            }
        }

        self.flush();
        self.settle().await;
    }

    /// Stop accepting updates. Returns the active filters so they can be
    /// persisted.
    pub fn destroy(&mut self) -> Vec<FilterType> {
        self.destroyed = true;
        self.flush_deadline = None;
        self.add_queue.clear();
        self.update_queue.clear();
        self.follow_ups = FuturesUnordered::new();
        self.state.active_filters()
    }

    // State transitions

    fn dispatch(&mut self, action: Action) {
        self.state.apply(action);
        self.notify_watchers();
    }

    fn notify_watchers(&mut self) {
        let selected_id = self.state.selected_item().cloned();
        let selected_record = self.state.selected_request().cloned();

        if selected_id != self.watched_selected_id {
            let old = std::mem::replace(&mut self.watched_selected_id, selected_id.clone());
            let _ = self.events.send(PanelEvent::SelectionChanged {
                old,
                new: selected_id,
            });
            self.state.follow_selection_with_sidebar();
        } else if let (Some(id), Some(old), Some(new)) = (
            &selected_id,
            &self.watched_selected_record,
            &selected_record,
        ) {
            if !Arc::ptr_eq(old, new) {
                let _ = self.events.send(PanelEvent::SelectedUpdated(id.clone()));
            }
        }
        self.watched_selected_record = selected_record;

        let summary = self.selectors.displayed_summary(&self.state);
        if summary != self.watched_summary {
            self.watched_summary = summary;
            let _ = self.events.send(PanelEvent::SummaryChanged(summary));
        }
    }

    pub fn select_item(&mut self, id: Option<RequestId>) {
        self.dispatch(Action::SelectItem(id));
    }

    pub fn sort_by(&mut self, sort_type: SortType) {
        self.dispatch(Action::SortBy(sort_type));
    }

    pub fn toggle_filter_type(&mut self, filter: FilterType) {
        self.dispatch(Action::ToggleFilterType(filter));
    }

    pub fn enable_filter_type_only(&mut self, filter: FilterType) {
        self.dispatch(Action::EnableFilterTypeOnly(filter));
    }

    pub fn set_filter_text(&mut self, text: impl Into<String>) {
        self.dispatch(Action::SetFilterText(text.into()));
    }

    pub fn show_sidebar(&mut self, visible: bool) {
        self.dispatch(Action::ShowSidebar(visible));
    }

    pub fn toggle_sidebar(&mut self) {
        self.dispatch(Action::ToggleSidebar);
    }

    pub fn resize_waterfall(&mut self, width: f64) {
        self.dispatch(Action::ResizeWaterfall(width));
    }

    // Edit and resend

    pub fn clone_selected_request(&mut self) {
        self.dispatch(Action::CloneSelectedRequest);
    }

    pub fn remove_selected_custom_request(&mut self) {
        self.dispatch(Action::RemoveSelectedCustomRequest);
    }

    /// Apply form edits to the selected copy. Ignored unless the selection
    /// is a custom request.
    pub fn update_selected_custom(&mut self, edit: CustomEdit) {
        let Some(selected) = self.state.selected_request() else {
            return;
        };
        if !selected.is_custom || edit.is_empty() {
            return;
        }
        let id = selected.id.clone();
        self.dispatch(Action::UpdateRequest {
            id,
            data: edit.into_update(),
        });
    }

    /// Send the selected request through `transport`. The copy is removed
    /// at once; the new request is selected as soon as it shows up.
    pub fn send_custom_request(&mut self, transport: Arc<dyn ResendTransport>) {
        let Some(selected) = self.state.selected_request() else {
            return;
        };
        let request = CustomRequest::from_record(selected);

        self.follow_ups.push(
            async move {
                let url = request.url.clone();
                match transport.send(request).await {
                    Ok(id) => Some(FollowUp::Preselect(id)),
                    Err(e) => {
                        warn!("Failed to resend {}: {}", url, e);
                        None
                    }
                }
            }
            .boxed(),
        );

        self.dispatch(Action::RemoveSelectedCustomRequest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::fetch::CaptureFetcher;
    use crate::monitor::resend::ResendError;
    use async_trait::async_trait;
    use netmon_common::{ContentBody, RequestPostData, ResponseContent};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn panel(lazy_update: bool) -> NetMonitor {
        NetMonitor::new(
            Arc::new(CaptureFetcher::default()),
            PanelOptions {
                lazy_update,
                ..Default::default()
            },
        )
    }

    fn new_request(url: &str) -> NewRequest {
        NewRequest {
            started_date_time: "2016-11-02T10:00:00.000Z".to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn status(code: &str) -> RequestUpdate {
        RequestUpdate {
            status: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn image_content(text: LongString) -> RequestUpdate {
        RequestUpdate {
            mime_type: Some("image/png".to_string()),
            response_content: Some(ResponseContent {
                content: ContentBody {
                    mime_type: Some("image/png".to_string()),
                    text,
                    encoding: Some("base64".to_string()),
                },
                content_discarded: false,
            }),
            ..Default::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<PanelEvent>) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    struct FixedTransport(RequestId);

    #[async_trait]
    impl ResendTransport for FixedTransport {
        async fn send(&self, _request: CustomRequest) -> Result<RequestId, ResendError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_batch_commits_once() {
        let mut panel = panel(true);
        let start = panel.state().generation();

        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.update_request("a".into(), status("200"), None);
        panel.update_request(
            "a".into(),
            RequestUpdate {
                content_size: Some(10),
                ..Default::default()
            },
            None,
        );
        panel.update_request("a".into(), status("304"), None);
        assert!(panel.state().requests().is_empty());

        panel.flush();

        assert_eq!(panel.state().generation(), start + 1);
        let a = panel.state().request_by_id("a").unwrap();
        assert_eq!(a.status.as_deref(), Some("304"));
        assert_eq!(a.content_size, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_flush_waits_for_deadline() {
        let mut panel = panel(true);
        let (_tx, mut rx) = mpsc::channel(8);

        panel.add_request("a".into(), new_request("https://example.com/"));
        let deadline = panel.flush_deadline().unwrap();
        assert_eq!(deadline, Instant::now() + DEFAULT_REFRESH_RATE);

        tokio::time::advance(Duration::from_millis(20)).await;
        panel.add_request("b".into(), new_request("https://example.com/b"));
        assert_eq!(panel.flush_deadline(), Some(deadline));

        let _ = tokio::time::timeout(Duration::from_millis(20), panel.run(&mut rx)).await;
        assert!(panel.state().requests().is_empty());

        let _ = tokio::time::timeout(Duration::from_millis(20), panel.run(&mut rx)).await;
        assert_eq!(panel.state().requests().len(), 2);
        assert_eq!(panel.flush_deadline(), None);
    }

    #[tokio::test]
    async fn test_eager_mode_flushes_each_event() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/"));
        assert_eq!(panel.state().requests().len(), 1);
        assert_eq!(panel.flush_deadline(), None);

        let mut panel = self::panel(true);
        panel.add_request("a".into(), new_request("https://example.com/"));
        assert!(panel.state().requests().is_empty());
        panel.set_lazy_update(false);
        assert_eq!(panel.state().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_aborts_flush() {
        let mut panel = panel(true);
        panel.toggle_filter_type(FilterType::Css);
        let mut events = panel.subscribe();

        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.update_request(
            "a".into(),
            status("200"),
            Some(Box::new(move || *flag.lock().unwrap() = true)),
        );

        assert_eq!(panel.destroy(), vec![FilterType::Css]);
        panel.flush();
        panel.add_request("b".into(), new_request("https://example.com/b"));
        panel.flush();

        assert!(panel.is_destroyed());
        assert!(panel.state().requests().is_empty());
        assert_eq!(panel.flush_deadline(), None);
        assert!(drain(&mut events).is_empty());
        assert!(!*called.lock().unwrap());
        // The queued callback was dropped along with the queue
        assert_eq!(Arc::strong_count(&called), 1);
    }

    #[tokio::test]
    async fn test_empty_flush_changes_nothing() {
        let mut panel = panel(true);
        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.flush();
        panel.select_item(Some("a".into()));
        let mut events = panel.subscribe();
        let requests = Arc::clone(panel.state().requests());

        panel.flush();
        panel.flush();

        assert!(Arc::ptr_eq(panel.state().requests(), &requests));
        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("a"));
        assert!(panel.state().sidebar().visible);
        assert_eq!(panel.flush_deadline(), None);
        assert_eq!(panel.pending_follow_ups(), 0);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_huge_refresh_rate_flushes_at_once() {
        let mut panel = NetMonitor::new(
            Arc::new(CaptureFetcher::default()),
            PanelOptions {
                refresh_rate: Duration::MAX,
                ..Default::default()
            },
        );
        panel.add_request("a".into(), new_request("https://example.com/"));

        assert_eq!(panel.flush_deadline(), None);
        assert_eq!(panel.state().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_run_in_order_after_commit() {
        let mut panel = panel(true);
        let calls = Arc::new(Mutex::new(Vec::new()));

        panel.add_request("a".into(), new_request("https://example.com/"));
        for n in 1..=3 {
            let calls = Arc::clone(&calls);
            panel.update_request(
                "a".into(),
                status("200"),
                Some(Box::new(move || calls.lock().unwrap().push(n))),
            );
        }
        assert!(calls.lock().unwrap().is_empty());

        panel.flush();
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_image_thumbnail_follow_up() {
        let fetcher = CaptureFetcher::new(HashMap::from([(
            "img".to_string(),
            "iVBORw0KGgo=".to_string(),
        )]));
        let mut panel = NetMonitor::new(
            Arc::new(fetcher),
            PanelOptions {
                lazy_update: false,
                ..Default::default()
            },
        );
        let mut events = panel.subscribe();

        panel.add_request("a".into(), new_request("https://example.com/logo.png"));
        panel.update_request(
            "a".into(),
            image_content(LongString::Actor {
                actor: "img".to_string(),
                length: 12,
                initial: String::new(),
            }),
            None,
        );
        assert_eq!(panel.pending_follow_ups(), 1);

        panel.settle().await;

        let a = panel.state().request_by_id("a").unwrap();
        assert_eq!(
            a.response_content_data_uri.as_deref(),
            Some("data:image/png;base64,iVBORw0KGgo=")
        );
        assert!(drain(&mut events).contains(&PanelEvent::ThumbnailDisplayed("a".into())));
    }

    #[tokio::test]
    async fn test_non_image_content_is_not_fetched() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.update_request(
            "a".into(),
            RequestUpdate {
                response_content: Some(ResponseContent::default()),
                ..Default::default()
            },
            None,
        );

        assert_eq!(panel.pending_follow_ups(), 0);
        assert_eq!(
            panel.state().request_by_id("a").unwrap().mime_type.as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_is_dropped() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/logo.png"));
        panel.update_request(
            "a".into(),
            image_content(LongString::Actor {
                actor: "missing".to_string(),
                length: 1,
                initial: String::new(),
            }),
            None,
        );

        panel.settle().await;
        assert_eq!(panel.state().request_by_id("a").unwrap().response_content_data_uri, None);
    }

    #[tokio::test]
    async fn test_upload_stream_headers_follow_up() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/upload"));
        panel.update_request(
            "a".into(),
            RequestUpdate {
                request_post_data: Some(RequestPostData::inline(
                    "Content-Type: text/plain\r\nX-Id: 7\r\n\r\nhello",
                )),
                ..Default::default()
            },
            None,
        );

        let placeholder = panel.state().request_by_id("a").unwrap();
        assert_eq!(
            placeholder.request_headers_from_upload_stream.as_ref().map(|h| h.headers.len()),
            Some(0)
        );

        panel.settle().await;

        let a = panel.state().request_by_id("a").unwrap();
        let headers = a.request_headers_from_upload_stream.as_ref().unwrap();
        assert_eq!(headers.headers.len(), 2);
        assert_eq!(headers.headers_size, (12 + 10 + 2) + (4 + 1 + 2));
    }

    #[tokio::test]
    async fn test_follow_up_for_vanished_record() {
        let mut panel = panel(false);
        let mut events = panel.subscribe();
        panel.add_request("a".into(), new_request("https://example.com/logo.png"));
        panel.update_request(
            "a".into(),
            image_content(LongString::Inline("abc".to_string())),
            None,
        );
        panel.clear();

        panel.settle().await;

        assert!(panel.state().requests().is_empty());
        assert!(!drain(&mut events).contains(&PanelEvent::ThumbnailDisplayed("a".into())));
    }

    #[tokio::test]
    async fn test_selection_watchers() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/"));
        let mut events = panel.subscribe();

        panel.select_item(Some("a".into()));
        assert!(panel.state().sidebar().visible);
        assert_eq!(
            drain(&mut events),
            vec![PanelEvent::SelectionChanged {
                old: None,
                new: Some("a".into()),
            }]
        );

        panel.update_request("a".into(), status("200"), None);
        assert_eq!(drain(&mut events), vec![PanelEvent::SelectedUpdated("a".into())]);

        panel.select_item(None);
        assert!(!panel.state().sidebar().visible);
        assert_eq!(
            drain(&mut events),
            vec![PanelEvent::SelectionChanged {
                old: Some("a".into()),
                new: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_select_missing_id_is_ignored() {
        let mut panel = panel(false);
        let mut events = panel.subscribe();

        panel.select_item(Some("nope".into()));

        assert!(panel.state().selected_item().is_none());
        assert!(!panel.state().sidebar().visible);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_show_sidebar_follows_selection() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/a"));
        let mut events = panel.subscribe();

        panel.show_sidebar(true);
        assert!(panel.state().sidebar().visible);
        assert_eq!(
            drain(&mut events),
            vec![PanelEvent::SelectionChanged {
                old: None,
                new: Some("a".into()),
            }]
        );

        panel.show_sidebar(false);
        assert!(!panel.state().sidebar().visible);
        assert!(panel.state().selected_item().is_none());
    }

    #[tokio::test]
    async fn test_resolved_preselection_is_one_transition() {
        let mut panel = panel(true);
        panel.add_request("a".into(), new_request("https://example.com/api"));
        panel.flush();
        panel.select_item(Some("a".into()));
        panel.clone_selected_request();
        panel.send_custom_request(Arc::new(FixedTransport("resent".into())));
        panel.settle().await;
        assert!(!panel.state().sidebar().visible);

        let start = panel.state().generation();
        panel.add_request("resent".into(), new_request("https://example.com/api"));
        panel.flush();

        assert_eq!(panel.state().generation(), start + 1);
        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("resent"));
        assert!(panel.state().sidebar().visible);
    }

    #[tokio::test]
    async fn test_enable_filter_type_only() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/index.html"));
        panel.update_request(
            "a".into(),
            RequestUpdate {
                mime_type: Some("text/html".to_string()),
                ..Default::default()
            },
            None,
        );
        panel.add_request("b".into(), new_request("https://example.com/site.css"));
        panel.update_request(
            "b".into(),
            RequestUpdate {
                mime_type: Some("text/css".to_string()),
                ..Default::default()
            },
            None,
        );
        panel.toggle_filter_type(FilterType::Html);

        panel.enable_filter_type_only(FilterType::Css);

        assert_eq!(panel.state().active_filters(), vec![FilterType::Css]);
        assert!(panel.displayed_request_by_id("a").is_none());
        assert_eq!(
            panel.displayed_request_by_id("b").map(|r| r.id.clone()),
            Some(RequestId::from("b"))
        );
        assert!(panel.state().request_by_id("a").is_some());
    }

    #[tokio::test]
    async fn test_discard_custom_request() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/api"));
        panel.select_item(Some("a".into()));
        panel.remove_selected_custom_request();
        assert_eq!(panel.state().requests().len(), 1);

        panel.clone_selected_request();
        let mut events = panel.subscribe();
        panel.remove_selected_custom_request();

        assert!(panel.state().request_by_id("a-clone").is_none());
        assert!(panel.state().selected_item().is_none());
        assert!(!panel.state().sidebar().visible);
        assert!(drain(&mut events).contains(&PanelEvent::SelectionChanged {
            old: Some("a-clone".into()),
            new: None,
        }));
    }

    #[tokio::test]
    async fn test_summary_watcher() {
        let mut panel = panel(false);
        let mut events = panel.subscribe();

        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.update_request(
            "a".into(),
            RequestUpdate {
                content_size: Some(2048),
                ..Default::default()
            },
            None,
        );

        let summaries: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                PanelEvent::SummaryChanged(summary) => Some(summary),
                _ => None,
            })
            .collect();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].count, 1);
        assert_eq!(summaries[1].bytes, 2048);

        // Same totals, no notification
        panel.update_request("a".into(), status("200"), None);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_resend_preselects_new_request() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/api"));
        panel.select_item(Some("a".into()));
        panel.clone_selected_request();
        panel.update_selected_custom(CustomEdit {
            method: Some("POST".to_string()),
            ..Default::default()
        });
        assert_eq!(
            panel.state().request_by_id("a-clone").unwrap().method.as_deref(),
            Some("POST")
        );

        panel.send_custom_request(Arc::new(FixedTransport("resent".into())));
        assert!(panel.state().request_by_id("a-clone").is_none());
        assert!(panel.state().selected_item().is_none());

        panel.settle().await;
        assert_eq!(
            panel.state().preselected_item().map(RequestId::as_str),
            Some("resent")
        );

        panel.add_request("resent".into(), new_request("https://example.com/api"));
        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("resent"));
        assert!(panel.state().sidebar().visible);
    }

    #[tokio::test]
    async fn test_resend_after_request_arrived_selects_it() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/api"));
        panel.select_item(Some("a".into()));
        panel.clone_selected_request();
        panel.send_custom_request(Arc::new(FixedTransport("resent".into())));

        panel.add_request("resent".into(), new_request("https://example.com/api"));
        panel.settle().await;

        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("resent"));
        assert!(panel.state().preselected_item().is_none());
    }

    #[tokio::test]
    async fn test_edit_ignored_for_real_requests() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/"));
        panel.select_item(Some("a".into()));

        panel.update_selected_custom(CustomEdit {
            url: Some("https://evil.example.com/".to_string()),
            ..Default::default()
        });

        assert_eq!(
            panel.state().request_by_id("a").unwrap().url.as_deref(),
            Some("https://example.com/")
        );
    }

    #[tokio::test]
    async fn test_run_consumes_event_stream() {
        let mut panel = panel(true);
        let (tx, mut rx) = mpsc::channel(16);

        tx.send(NetworkEvent::Add {
            id: "a".into(),
            data: new_request("https://example.com/"),
        })
        .await
        .unwrap();
        tx.send(NetworkEvent::Clear).await.unwrap();
        tx.send(NetworkEvent::Add {
            id: "b".into(),
            data: new_request("https://example.com/b"),
        })
        .await
        .unwrap();
        tx.send(NetworkEvent::Update {
            id: "b".into(),
            data: status("404"),
        })
        .await
        .unwrap();
        drop(tx);

        panel.run(&mut rx).await;

        let ids: Vec<_> = panel.displayed_requests().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![RequestId::from("b")]);
        assert_eq!(
            panel.state().request_by_id("b").unwrap().status.as_deref(),
            Some("404")
        );
    }

    #[tokio::test]
    async fn test_select_index_over_sorted_requests() {
        let mut panel = panel(false);
        panel.add_request("a".into(), new_request("https://example.com/a"));
        panel.add_request("b".into(), new_request("https://example.com/b"));
        panel.set_filter_text("/b");

        panel.select_index(0);
        assert_eq!(panel.selected_index(), Some(0));
        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("a"));
        assert_eq!(panel.request_index_by_id("a"), None);
        assert_eq!(panel.request_index_by_id("b"), Some(0));

        panel.select_index(5);
        assert_eq!(panel.selected_index(), None);
    }

    #[tokio::test]
    async fn test_sidebar_opens_on_first_displayed() {
        let mut panel = panel(false);
        assert!(panel.is_sidebar_toggle_disabled());

        panel.add_request("a".into(), new_request("https://example.com/a"));
        assert!(!panel.is_sidebar_toggle_disabled());

        panel.toggle_sidebar();
        assert!(panel.state().sidebar().visible);
        assert_eq!(panel.state().selected_item().map(RequestId::as_str), Some("a"));

        panel.toggle_sidebar();
        assert!(!panel.state().sidebar().visible);
        assert!(panel.state().selected_item().is_none());
    }
}
