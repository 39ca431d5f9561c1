use serde::Serialize;

pub const TREATMENT_PENDING_ID: i64 = 1;
pub const ACTIVITY_ATTRIBUTED_ID: i64 = 2;
pub const ACTIVITY_PROPOSED_ID: i64 = 3;
pub const PROPOSAL_ACCEPTED_ID: i64 = 4;
pub const PROPOSAL_REFUSED_ID: i64 = 5;
pub const STOPPED_ID: i64 = 6;
pub const ASSESSMENT_PENDING_ID: i64 = 7;

/// Statuses after which an application is considered settled with the family:
/// it can no longer be deleted and it is eligible for confirmation mails.
pub const TERMINAL_STATUS_IDS: [i64; 3] = [
    ACTIVITY_ATTRIBUTED_ID,
    ACTIVITY_PROPOSED_ID,
    PROPOSAL_ACCEPTED_ID,
];

pub const PROCESSED_STATUS_IDS: [i64; 2] = [ACTIVITY_ATTRIBUTED_ID, STOPPED_ID];

/// Statuses excluded from the "processing" dashboard counter.
pub const NOT_PROCESSING_STATUS_IDS: [i64; 3] =
    [TREATMENT_PENDING_ID, STOPPED_ID, ACTIVITY_ATTRIBUTED_ID];

pub fn is_terminal(status_id: Option<i64>) -> bool {
    status_id
        .map(|id| TERMINAL_STATUS_IDS.contains(&id))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatus {
    pub id: i64,
    pub label: String,
}
