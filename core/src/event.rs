//! The raw product event log — the only behavioural input to the pipeline.
//!
//! RULE: Events are immutable facts. Stages may fold them into per-user
//! aggregates, but nothing downstream ever mutates or reorders the log.

use crate::types::UserId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Recognized event families. Tags outside this list still count toward
/// activity totals and recency; they land on `Other` and drop out of the
/// typed per-kind counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Login,
    PropertyAdded,
    TenantAdded,
    LeaseSigned,
    RentPaymentReceived,
    MaintenanceRequestCreated,
    ReportGenerated,
    FeatureAdopted,
    TrainingAttended,
    Other,
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "login" => Self::Login,
            "property_added" => Self::PropertyAdded,
            "tenant_added" => Self::TenantAdded,
            "lease_signed" => Self::LeaseSigned,
            "rent_payment_received" => Self::RentPaymentReceived,
            "maintenance_request_created" => Self::MaintenanceRequestCreated,
            "report_generated" => Self::ReportGenerated,
            "feature_adopted" => Self::FeatureAdopted,
            "training_attended" => Self::TrainingAttended,
            _ => Self::Other,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PropertyAdded => "property_added",
            Self::TenantAdded => "tenant_added",
            Self::LeaseSigned => "lease_signed",
            Self::RentPaymentReceived => "rent_payment_received",
            Self::MaintenanceRequestCreated => "maintenance_request_created",
            Self::ReportGenerated => "report_generated",
            Self::FeatureAdopted => "feature_adopted",
            Self::TrainingAttended => "training_attended",
            Self::Other => "other",
        }
    }
}

/// One row of the product event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub user_id: UserId,
    pub kind: EventKind,
    pub occurred_at: NaiveDateTime,
    /// Numeric payload: session minutes for logins, amount for rent payments.
    pub value_num: Option<f64>,
    /// Text payload: feature name for adoptions, course name for trainings.
    pub value_txt: Option<String>,
}

impl Event {
    pub fn new(user_id: impl Into<UserId>, kind: EventKind, occurred_at: NaiveDateTime) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            occurred_at,
            value_num: None,
            value_txt: None,
        }
    }

    pub fn with_num(mut self, value: f64) -> Self {
        self.value_num = Some(value);
        self
    }

    pub fn with_txt(mut self, value: impl Into<String>) -> Self {
        self.value_txt = Some(value.into());
        self
    }
}
