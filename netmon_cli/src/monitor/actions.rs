//! State transitions understood by [`AppState::apply`](super::store::AppState::apply)

use super::filters::FilterType;
use super::sorters::SortType;
use super::store::RecordInit;
use netmon_common::{RequestId, RequestUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Several actions applied in order as one transition
    Batch(Vec<Action>),
    AddRequest {
        id: RequestId,
        data: RecordInit,
    },
    UpdateRequest {
        id: RequestId,
        data: RequestUpdate,
    },
    /// Copy the selected request for "edit and resend" and select the copy
    CloneSelectedRequest,
    /// Drop the selected request if it is an unsent copy
    RemoveSelectedCustomRequest,
    ClearRequests,
    SelectItem(Option<RequestId>),
    /// Select this request as soon as it is added
    PreselectItem(RequestId),
    /// Sort by a column; repeating the same column flips the direction
    SortBy(SortType),
    ToggleFilterType(FilterType),
    EnableFilterTypeOnly(FilterType),
    SetFilterText(String),
    ShowSidebar(bool),
    ToggleSidebar,
    /// Available width of the request list (px)
    ResizeWaterfall(f64),
}
