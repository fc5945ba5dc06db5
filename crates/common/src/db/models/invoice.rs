//! Invoice entity
//!
//! Carries two independent status axes: the business/payment `status`
//! (mutated only by explicit user action) and the pipeline
//! `processing_status` (mutated only by the extraction worker).

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Business/payment status, mutated via the PATCH endpoint only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Paid,
}

impl InvoiceStatus {
    /// Parse the wire/database representation; unknown values are rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(InvoiceStatus::Pending),
            "Approved" => Some(InvoiceStatus::Approved),
            "Paid" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(s: String) -> Self {
        InvoiceStatus::parse(&s).unwrap_or(InvoiceStatus::Pending)
    }
}

impl From<InvoiceStatus> for String {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Pending => "Pending".to_string(),
            InvoiceStatus::Approved => "Approved".to_string(),
            InvoiceStatus::Paid => "Paid".to_string(),
        }
    }
}

/// Pipeline lifecycle status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<String> for ProcessingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => ProcessingStatus::Pending,
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

impl From<ProcessingStatus> for String {
    fn from(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Pending => "pending".to_string(),
            ProcessingStatus::Processing => "processing".to_string(),
            ProcessingStatus::Completed => "completed".to_string(),
            ProcessingStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Matched maintenance issue, if any
    pub issue_id: Option<Uuid>,

    pub uploaded_at: DateTimeWithTimeZone,

    /// Blob-store key (timestamp-prefixed, sanitized file name)
    #[sea_orm(column_type = "Text")]
    pub file_path: String,

    /// Original upload name
    #[sea_orm(column_type = "Text")]
    pub file_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub building: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub unit: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub amount: Option<Decimal>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub processing_status: String,

    /// Diagnostic text, set only when processing failed
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Pipeline attempts consumed so far
    pub attempt_count: i32,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Get the business status as an enum
    pub fn invoice_status(&self) -> InvoiceStatus {
        InvoiceStatus::from(self.status.clone())
    }

    /// Get the pipeline status as an enum
    pub fn processing_status(&self) -> ProcessingStatus {
        ProcessingStatus::from(self.processing_status.clone())
    }

    /// Check if the pipeline is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.processing_status(),
            ProcessingStatus::Completed | ProcessingStatus::Failed
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issue::Entity",
        from = "Column::IssueId",
        to = "super::issue::Column::Id"
    )]
    Issue,
}

impl Related<super::issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(InvoiceStatus::parse("Approved"), Some(InvoiceStatus::Approved));
        assert_eq!(InvoiceStatus::parse("approved"), None);
        assert_eq!(String::from(InvoiceStatus::Paid), "Paid");
    }

    #[test]
    fn test_processing_status_round_trip() {
        assert_eq!(
            ProcessingStatus::from("failed".to_string()),
            ProcessingStatus::Failed
        );
        assert_eq!(String::from(ProcessingStatus::Processing), "processing");
    }
}
