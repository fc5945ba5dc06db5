//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. Issues are read-only here: the
//! pipeline consumes them as match candidates and never writes them.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Invoice Operations
    // ========================================================================

    /// Create a new invoice record in the pending processing state
    pub async fn create_invoice(&self, file_path: String, file_name: String) -> Result<Invoice> {
        let invoice_id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let invoice = InvoiceActiveModel {
            id: Set(invoice_id),
            issue_id: Set(None),
            uploaded_at: Set(now.into()),
            file_path: Set(file_path),
            file_name: Set(file_name),
            building: Set(None),
            unit: Set(None),
            description: Set(None),
            amount: Set(None),
            status: Set(String::from(InvoiceStatus::Pending)),
            processing_status: Set(String::from(ProcessingStatus::Pending)),
            error_message: Set(None),
            attempt_count: Set(0),
            started_at: Set(None),
            completed_at: Set(None),
        };

        invoice.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find invoice by ID
    pub async fn find_invoice_by_id(&self, id: Uuid) -> Result<Option<Invoice>> {
        InvoiceEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List all invoices, most recently uploaded first
    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        InvoiceEntity::find()
            .order_by_desc(InvoiceColumn::UploadedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Update the business/payment status (independent of the pipeline axis)
    pub async fn update_invoice_status(
        &self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice> {
        let mut invoice = self.invoice_active_model(id).await?;
        invoice.status = Set(String::from(status));
        invoice.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Mark an invoice as picked up by the extraction worker
    pub async fn mark_processing(&self, id: Uuid, attempt: u32) -> Result<Invoice> {
        let now = chrono::Utc::now();

        let existing = InvoiceEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::InvoiceNotFound { id: id.to_string() })?;
        let first_pickup = existing.started_at.is_none();

        let mut invoice: InvoiceActiveModel = existing.into();
        invoice.processing_status = Set(String::from(ProcessingStatus::Processing));
        invoice.attempt_count = Set(attempt as i32 + 1);
        if first_pickup {
            invoice.started_at = Set(Some(now.into()));
        }
        invoice.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Persist the extraction result and mark the pipeline completed.
    /// This is the single terminal write of a successful run.
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_extraction(
        &self,
        id: Uuid,
        building: Option<String>,
        unit: Option<String>,
        description: Option<String>,
        amount: Option<Decimal>,
        issue_id: Option<Uuid>,
    ) -> Result<Invoice> {
        let now = chrono::Utc::now();

        let mut invoice = self.invoice_active_model(id).await?;
        invoice.building = Set(building);
        invoice.unit = Set(unit);
        invoice.description = Set(description);
        invoice.amount = Set(amount);
        invoice.issue_id = Set(issue_id);
        invoice.processing_status = Set(String::from(ProcessingStatus::Completed));
        invoice.error_message = Set(None);
        invoice.completed_at = Set(Some(now.into()));
        invoice.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Mark the pipeline failed with a diagnostic message.
    /// No field values are written on failure.
    pub async fn fail_extraction(&self, id: Uuid, error_message: String) -> Result<Invoice> {
        let now = chrono::Utc::now();

        let mut invoice = self.invoice_active_model(id).await?;
        invoice.processing_status = Set(String::from(ProcessingStatus::Failed));
        invoice.error_message = Set(Some(error_message));
        invoice.completed_at = Set(Some(now.into()));
        invoice.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Reset a failed invoice for reprocessing: pending state, cleared
    /// diagnostics, attempt counter back to zero.
    pub async fn reset_for_retry(&self, id: Uuid) -> Result<Invoice> {
        let mut invoice = self.invoice_active_model(id).await?;
        invoice.processing_status = Set(String::from(ProcessingStatus::Pending));
        invoice.error_message = Set(None);
        invoice.attempt_count = Set(0);
        invoice.started_at = Set(None);
        invoice.completed_at = Set(None);
        invoice.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn invoice_active_model(&self, id: Uuid) -> Result<InvoiceActiveModel> {
        Ok(InvoiceEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::InvoiceNotFound { id: id.to_string() })?
            .into())
    }

    // ========================================================================
    // Issue Operations (read-only)
    // ========================================================================

    /// List all issues as match candidates. Fetched fresh per invoice,
    /// unfiltered by status.
    pub async fn list_issues(&self) -> Result<Vec<Issue>> {
        IssueEntity::find()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a single issue by ID
    pub async fn find_issue_by_id(&self, id: Uuid) -> Result<Option<Issue>> {
        IssueEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List invoices linked to an issue
    pub async fn list_invoices_for_issue(&self, issue_id: Uuid) -> Result<Vec<Invoice>> {
        InvoiceEntity::find()
            .filter(InvoiceColumn::IssueId.eq(issue_id))
            .order_by_desc(InvoiceColumn::UploadedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
