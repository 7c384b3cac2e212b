//! Request records and the application state they live in

use super::actions::Action;
use super::filters::{FilterType, Filters};
use super::selectors;
use super::sorters::SortType;
use chrono::DateTime;
use netmon_common::constants::FALLBACK_MIME_TYPE;
use netmon_common::{
    Cause, CookieList, EventTimings, HeaderList, NewRequest, RequestId, RequestPostData,
    RequestUpdate, ResponseContent,
};
use std::sync::Arc;
use tracing::warn;

/// Horizontal space (px) reserved next to the waterfall column
pub const WATERFALL_SAFE_BOUNDS: f64 = 90.0;

/// Waterfall width (px) before the first resize
pub const DEFAULT_WATERFALL_WIDTH: f64 = 300.0;

/// One tracked network request.
///
/// Everything except the id is filled in gradually by updates, and any field
/// may stay unknown for the lifetime of the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: RequestId,
    /// Editable copy created by "edit and resend"
    pub is_custom: bool,
    pub started_millis: Option<f64>,
    pub ended_millis: Option<f64>,
    pub started_delta_millis: Option<f64>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub remote_port: Option<u16>,
    pub remote_address: Option<String>,
    pub is_xhr: Option<bool>,
    pub cause: Option<Cause>,
    pub from_cache: Option<bool>,
    pub from_service_worker: Option<bool>,
    pub status: Option<String>,
    pub status_text: Option<String>,
    pub http_version: Option<String>,
    pub security_state: Option<String>,
    pub security_info: Option<serde_json::Value>,
    pub mime_type: Option<String>,
    pub content_size: Option<u64>,
    pub transferred_size: Option<u64>,
    pub total_time: Option<f64>,
    pub event_timings: Option<EventTimings>,
    pub headers_size: Option<u64>,
    pub request_headers: Option<HeaderList>,
    pub request_headers_from_upload_stream: Option<HeaderList>,
    pub request_cookies: Option<CookieList>,
    pub request_post_data: Option<RequestPostData>,
    pub response_headers: Option<HeaderList>,
    pub response_cookies: Option<CookieList>,
    pub response_content: Option<ResponseContent>,
    pub response_content_data_uri: Option<String>,
}

macro_rules! merge_fields {
    ($record:ident, $update:ident; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $update.$field {
                $record.$field = Some(value);
            }
        )+
    };
}

impl Record {
    fn new(id: RequestId, init: RecordInit) -> Self {
        Self {
            id,
            started_millis: init.started_millis,
            method: Some(init.method),
            url: Some(init.url),
            is_xhr: Some(init.is_xhr),
            cause: init.cause,
            from_cache: init.from_cache,
            from_service_worker: init.from_service_worker,
            ..Default::default()
        }
    }

    /// Editable copy keeping only what the resend form can change
    fn custom_copy(&self) -> Self {
        Self {
            id: self.id.clone_id(),
            is_custom: true,
            method: self.method.clone(),
            url: self.url.clone(),
            request_headers: self.request_headers.clone(),
            request_post_data: self.request_post_data.clone(),
            ..Default::default()
        }
    }

    /// Merge an update into the record. Returns the new end time when the
    /// update completed the request.
    fn merge(&mut self, update: RequestUpdate) -> Option<f64> {
        let record = self;
        merge_fields!(record, update;
            method,
            url,
            remote_port,
            remote_address,
            status,
            status_text,
            http_version,
            security_state,
            security_info,
            mime_type,
            content_size,
            transferred_size,
            event_timings,
            headers_size,
            request_headers,
            request_cookies,
            response_headers,
            response_cookies,
            response_content_data_uri,
        );

        if let Some(content) = update.response_content {
            if record.mime_type.is_none() {
                record.mime_type = Some(FALLBACK_MIME_TYPE.to_string());
            }
            record.response_content = Some(content);
        }

        if let Some(post_data) = update.request_post_data {
            record.request_post_data = Some(post_data);
            // Filled in once the upload stream has been parsed
            record.request_headers_from_upload_stream = Some(HeaderList::default());
        }
        if let Some(headers) = update.request_headers_from_upload_stream {
            record.request_headers_from_upload_stream = Some(headers);
        }

        let mut ended = None;
        if let Some(total_time) = update.total_time {
            record.total_time = Some(total_time);
            if let Some(started) = record.started_millis {
                record.ended_millis = Some(started + total_time);
                ended = record.ended_millis;
            }
        }
        ended
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|mime| mime.contains("image/"))
    }
}

/// Fields known when a request is first observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInit {
    pub started_millis: Option<f64>,
    pub method: String,
    pub url: String,
    pub is_xhr: bool,
    pub cause: Option<Cause>,
    pub from_cache: Option<bool>,
    pub from_service_worker: Option<bool>,
}

impl From<NewRequest> for RecordInit {
    fn from(data: NewRequest) -> Self {
        let started_millis = DateTime::parse_from_rfc3339(&data.started_date_time)
            .map(|started| started.timestamp_millis() as f64)
            .map_err(|e| warn!("Unparseable start time {:?}: {}", data.started_date_time, e))
            .ok();

        Self {
            started_millis,
            method: data.method,
            url: data.url,
            is_xhr: data.is_xhr,
            cause: data.cause,
            from_cache: data.from_cache,
            from_service_worker: data.from_service_worker,
        }
    }
}

/// Current sort column and direction. `sort_type: None` sorts by waterfall
/// without highlighting any column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBy {
    pub sort_type: Option<SortType>,
    pub ascending: bool,
}

impl Default for SortBy {
    fn default() -> Self {
        Self {
            sort_type: None,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidebarState {
    pub visible: bool,
}

/// Top-level state of the request list.
///
/// The record list and filters are shared copy-on-write so derived views can
/// be memoized on their identity.
#[derive(Debug, Clone)]
pub struct AppState {
    requests: Arc<Vec<Arc<Record>>>,
    first_request_started_millis: Option<f64>,
    last_request_ended_millis: Option<f64>,
    selected_item: Option<RequestId>,
    preselected_item: Option<RequestId>,
    filters: Arc<Filters>,
    sidebar: SidebarState,
    sort_by: SortBy,
    waterfall_width: f64,
    generation: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            requests: Arc::default(),
            first_request_started_millis: None,
            last_request_ended_millis: None,
            selected_item: None,
            preselected_item: None,
            filters: Arc::default(),
            sidebar: SidebarState::default(),
            sort_by: SortBy::default(),
            waterfall_width: DEFAULT_WATERFALL_WIDTH,
            generation: 0,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty state starting from saved preferences
    pub fn configured(filters: Filters, waterfall_width: f64) -> Self {
        Self {
            filters: Arc::new(filters),
            waterfall_width: waterfall_width.max(0.0),
            ..Self::default()
        }
    }

    /// Records in insertion order
    pub fn requests(&self) -> &Arc<Vec<Arc<Record>>> {
        &self.requests
    }

    pub fn filters(&self) -> &Arc<Filters> {
        &self.filters
    }

    pub fn first_request_started_millis(&self) -> Option<f64> {
        self.first_request_started_millis
    }

    pub fn last_request_ended_millis(&self) -> Option<f64> {
        self.last_request_ended_millis
    }

    pub fn selected_item(&self) -> Option<&RequestId> {
        self.selected_item.as_ref()
    }

    pub fn preselected_item(&self) -> Option<&RequestId> {
        self.preselected_item.as_ref()
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn sidebar(&self) -> SidebarState {
        self.sidebar
    }

    pub fn waterfall_width(&self) -> f64 {
        self.waterfall_width
    }

    /// Number of state transitions applied so far; a batch counts once
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request_by_id(&self, id: &str) -> Option<&Arc<Record>> {
        self.requests.iter().find(|r| r.id.as_str() == id)
    }

    /// The selected record, if the selection still points at one
    pub fn selected_request(&self) -> Option<&Arc<Record>> {
        self.selected_item
            .as_ref()
            .and_then(|id| self.request_by_id(id.as_str()))
    }

    pub fn active_filters(&self) -> Vec<FilterType> {
        self.filters.active()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.requests.iter().position(|r| r.id.as_str() == id)
    }

    /// Follow the selection with the sidebar. Part of the transition that
    /// changed the selection, so `generation` is left alone.
    pub(super) fn follow_selection_with_sidebar(&mut self) {
        self.sidebar.visible = self.selected_item.is_some();
    }

    /// Apply one action as a single state transition
    pub fn apply(&mut self, action: Action) {
        self.generation += 1;
        self.reduce(action);
    }

    fn reduce(&mut self, action: Action) {
        match action {
            Action::Batch(actions) => {
                for action in actions {
                    self.reduce(action);
                }
            }
            Action::AddRequest { id, data } => self.add_request(id, data),
            Action::UpdateRequest { id, data } => self.update_request(&id, data),
            Action::CloneSelectedRequest => self.clone_selected_request(),
            Action::RemoveSelectedCustomRequest => self.remove_selected_custom_request(),
            Action::ClearRequests => {
                self.requests = Arc::default();
                self.selected_item = None;
                self.preselected_item = None;
                self.first_request_started_millis = None;
                self.last_request_ended_millis = None;
            }
            Action::SelectItem(None) => self.selected_item = None,
            Action::SelectItem(Some(id)) => {
                if self.position(id.as_str()).is_some() {
                    self.selected_item = Some(id);
                }
            }
            Action::PreselectItem(id) => self.preselected_item = Some(id),
            Action::SortBy(sort_type) => {
                let ascending = if self.sort_by.sort_type == Some(sort_type) {
                    !self.sort_by.ascending
                } else {
                    true
                };
                self.sort_by = SortBy {
                    sort_type: Some(sort_type),
                    ascending,
                };
            }
            Action::ToggleFilterType(filter) => Arc::make_mut(&mut self.filters).toggle(filter),
            Action::EnableFilterTypeOnly(filter) => {
                Arc::make_mut(&mut self.filters).enable_only(filter)
            }
            Action::SetFilterText(text) => Arc::make_mut(&mut self.filters).set_text(text),
            Action::ShowSidebar(visible) => self.show_sidebar(visible),
            Action::ToggleSidebar => self.show_sidebar(!self.sidebar.visible),
            Action::ResizeWaterfall(width) => {
                self.waterfall_width = (width - WATERFALL_SAFE_BOUNDS).max(0.0);
            }
        }
    }

    fn add_request(&mut self, id: RequestId, data: RecordInit) {
        if self.position(id.as_str()).is_some() {
            warn!("Ignoring duplicate request {}", id);
            return;
        }

        if self.preselected_item.as_ref() == Some(&id) {
            self.preselected_item = None;
            self.selected_item = Some(id.clone());
        }

        let mut record = Record::new(id, data);

        if let Some(started) = record.started_millis {
            match self.first_request_started_millis {
                Some(first) if first <= started => {}
                _ => {
                    self.first_request_started_millis = Some(started);
                    self.rebase_started_deltas(started);
                }
            }
            if self.last_request_ended_millis.map_or(true, |last| started > last) {
                self.last_request_ended_millis = Some(started);
            }
            record.started_delta_millis = self
                .first_request_started_millis
                .map(|first| started - first);
        }

        Arc::make_mut(&mut self.requests).push(Arc::new(record));
    }

    fn rebase_started_deltas(&mut self, first: f64) {
        for record in Arc::make_mut(&mut self.requests).iter_mut() {
            if let Some(started) = record.started_millis {
                Arc::make_mut(record).started_delta_millis = Some(started - first);
            }
        }
    }

    fn update_request(&mut self, id: &RequestId, data: RequestUpdate) {
        let Some(idx) = self.position(id.as_str()) else {
            return;
        };

        let requests = Arc::make_mut(&mut self.requests);
        let ended = Arc::make_mut(&mut requests[idx]).merge(data);

        if let Some(ended) = ended {
            self.last_request_ended_millis = Some(
                self.last_request_ended_millis
                    .map_or(ended, |last| last.max(ended)),
            );
        }
    }

    fn clone_selected_request(&mut self) {
        let Some(selected) = self.selected_item.clone() else {
            return;
        };
        let Some(idx) = self.position(selected.as_str()) else {
            return;
        };

        let clone = self.requests[idx].custom_copy();
        let clone_id = clone.id.clone();

        // Insert right after the original so the pair stays together even when
        // the sort criteria consider them equal.
        if self.position(clone_id.as_str()).is_none() {
            Arc::make_mut(&mut self.requests).insert(idx + 1, Arc::new(clone));
        }
        self.selected_item = Some(clone_id);
    }

    fn remove_selected_custom_request(&mut self) {
        let Some(selected) = self.selected_request() else {
            return;
        };
        if !selected.is_custom {
            return;
        }

        let id = selected.id.clone();
        Arc::make_mut(&mut self.requests).retain(|r| r.id != id);
        self.selected_item = None;
    }

    fn show_sidebar(&mut self, visible: bool) {
        self.sidebar.visible = visible;
        if !visible {
            self.selected_item = None;
            return;
        }
        if self.selected_item.is_none() {
            self.selected_item = selectors::displayed_requests(self)
                .first()
                .map(|r| r.id.clone());
        }
    }
}
