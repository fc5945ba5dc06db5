//! Invoice management handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use invoiceflow_common::{
    db::{
        models::{Invoice, InvoiceStatus, ProcessingStatus},
        Repository,
    },
    errors::{AppError, Result},
    metrics::METRICS_PREFIX,
    queue::ExtractionJobMessage,
    storage::{looks_like_pdf, storage_key},
    PDF_MIME_TYPE,
};

/// Invoice representation returned by the API
#[derive(Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub issue_id: Option<Uuid>,
    pub uploaded_at: String,
    pub file_path: String,
    pub file_name: String,
    pub building: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub status: String,
    pub processing_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            issue_id: invoice.issue_id,
            uploaded_at: invoice.uploaded_at.to_rfc3339(),
            file_path: invoice.file_path,
            file_name: invoice.file_name,
            building: invoice.building,
            unit: invoice.unit,
            description: invoice.description,
            amount: invoice.amount,
            status: invoice.status,
            processing_status: invoice.processing_status,
            error_message: invoice.error_message,
        }
    }
}

#[derive(Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
}

/// Request to update the business status
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    #[validate(custom(function = validate_status))]
    pub status: String,
}

fn validate_status(status: &str) -> std::result::Result<(), validator::ValidationError> {
    if InvoiceStatus::parse(status).is_some() {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_status"))
    }
}

/// Upload a PDF invoice and dispatch the extraction job
pub async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<InvoiceResponse>)> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Malformed multipart body: {}", e),
        field: None,
    })? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("invoice.pdf").to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| AppError::Validation {
                message: format!("Failed to read file part: {}", e),
                field: Some("file".to_string()),
            })?;
            upload = Some((file_name, content_type, bytes.to_vec()));
            break;
        }
    }

    let Some((file_name, content_type, bytes)) = upload else {
        return Err(AppError::MissingField {
            field: "file".to_string(),
        });
    };

    if content_type != PDF_MIME_TYPE || !looks_like_pdf(&bytes) {
        return Err(AppError::InvalidFormat {
            message: "Only PDF files are allowed".to_string(),
        });
    }

    if bytes.len() > state.config.server.max_upload_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: state.config.server.max_upload_bytes,
        });
    }

    // Store the blob under a collision-resistant key
    let file_path = storage_key(&file_name);
    state.store.put(&file_path, &bytes).await?;

    let repo = Repository::new(state.db.clone());
    let invoice = repo.create_invoice(file_path, file_name).await?;

    // Hand off to the extraction worker
    if let Some(ref queue) = state.queue {
        queue
            .send(&ExtractionJobMessage::new(invoice.id, &invoice.file_path))
            .await?;
    } else {
        tracing::warn!(
            invoice_id = %invoice.id,
            "No extraction queue configured, invoice stays pending"
        );
    }

    counter!(format!("{}_uploads_total", METRICS_PREFIX)).increment(1);

    tracing::info!(
        invoice_id = %invoice.id,
        file_name = %invoice.file_name,
        "Invoice uploaded"
    );

    Ok((StatusCode::ACCEPTED, Json(invoice.into())))
}

/// List all invoices, most recently uploaded first
pub async fn list_invoices(State(state): State<AppState>) -> Result<Json<InvoiceListResponse>> {
    let repo = Repository::new(state.db.clone());

    let invoices = repo.list_invoices().await?;

    Ok(Json(InvoiceListResponse {
        invoices: invoices.into_iter().map(Into::into).collect(),
    }))
}

/// Get a single invoice (used to poll processing status)
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>> {
    let repo = Repository::new(state.db.clone());

    let invoice = repo
        .find_invoice_by_id(invoice_id)
        .await?
        .ok_or_else(|| AppError::InvoiceNotFound {
            id: invoice_id.to_string(),
        })?;

    Ok(Json(invoice.into()))
}

/// Update the business/payment status of an invoice
pub async fn update_invoice_status(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("status".to_string()),
    })?;

    // Whitelist-checked by the validator above
    let status = InvoiceStatus::parse(&request.status).ok_or_else(|| AppError::Validation {
        message: format!("Invalid status: {}", request.status),
        field: Some("status".to_string()),
    })?;

    let repo = Repository::new(state.db.clone());
    let invoice = repo.update_invoice_status(invoice_id, status).await?;

    tracing::info!(
        invoice_id = %invoice.id,
        status = %invoice.status,
        "Invoice status updated"
    );

    Ok(Json(invoice.into()))
}

/// Re-enqueue a failed invoice for reprocessing
pub async fn retry_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<(StatusCode, Json<InvoiceResponse>)> {
    let repo = Repository::new(state.db.clone());

    let invoice = repo
        .find_invoice_by_id(invoice_id)
        .await?
        .ok_or_else(|| AppError::InvoiceNotFound {
            id: invoice_id.to_string(),
        })?;

    if invoice.processing_status() != ProcessingStatus::Failed {
        return Err(AppError::Conflict {
            message: format!(
                "Only failed invoices can be retried (current: {})",
                invoice.processing_status
            ),
        });
    }

    let queue = state.queue.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "Extraction queue not configured".to_string(),
    })?;

    let invoice = repo.reset_for_retry(invoice_id).await?;

    queue
        .send(&ExtractionJobMessage::new(invoice.id, &invoice.file_path))
        .await?;

    tracing::info!(invoice_id = %invoice.id, "Invoice re-enqueued for extraction");

    Ok((StatusCode::ACCEPTED, Json(invoice.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_whitelist() {
        assert!(validate_status("Pending").is_ok());
        assert!(validate_status("Approved").is_ok());
        assert!(validate_status("Paid").is_ok());
        assert!(validate_status("paid").is_err());
        assert!(validate_status("Shipped").is_err());
    }
}
