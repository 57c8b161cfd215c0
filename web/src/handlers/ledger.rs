//! Read-only ledger reporting endpoint with optional CSV rendering.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use courtbook_core::ledger::{
    Direction, LedgerEntry, LedgerFilter, Page, SettlementStatus, SourceType,
};
use courtbook_core::types::{CourtId, Money, PaymentMethod};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for the ledger report.
///
/// Enumerated filters arrive as their stable string forms and are
/// validated at the boundary.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    /// 1-based page number
    pub page: Option<u32>,
    /// Page size
    pub limit: Option<u32>,
    /// Lower bound on `paid_at` (inclusive)
    pub date_from: Option<DateTime<Utc>>,
    /// Upper bound on `paid_at` (exclusive)
    pub date_to: Option<DateTime<Utc>>,
    /// Restrict to a collection method (e.g. `CARD`)
    pub method: Option<String>,
    /// Restrict to a source type (e.g. `RESERVATION`)
    pub source_type: Option<String>,
    /// Restrict to a direction (`CREDIT` or `DEBIT`)
    pub direction: Option<String>,
    /// Restrict to a settlement status (e.g. `PAID`)
    pub status: Option<String>,
    /// Restrict to reservations on this court
    pub court_id: Option<Uuid>,
    /// `csv` renders the page as CSV instead of JSON
    pub format: Option<String>,
}

fn parse_param<T>(
    value: Option<&str>,
    parse: impl FnOnce(&str) -> Option<T>,
    what: &str,
) -> Result<Option<T>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("unknown {what} '{raw}'"))),
    }
}

/// A ledger entry as returned to clients
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry id
    pub id: Uuid,
    /// Kind of source record
    pub source_type: SourceType,
    /// Identifier of the source record
    pub source_id: Uuid,
    /// Money in or out
    pub direction: Direction,
    /// Amount in cents, tax-inclusive
    pub amount: Money,
    /// Included tax in cents at the configured flat rate
    pub included_tax: Money,
    /// Currency
    pub currency: String,
    /// Collection method
    pub method: PaymentMethod,
    /// Settlement status
    pub status: SettlementStatus,
    /// When the money moved
    pub paid_at: DateTime<Utc>,
    /// Gateway reference
    pub gateway_reference: Option<String>,
    /// Idempotency key
    pub idempotency_key: String,
}

impl LedgerEntryResponse {
    fn from_entry(entry: LedgerEntry, vat_rate_percent: u32) -> Self {
        Self {
            id: *entry.id.as_uuid(),
            source_type: entry.source_type,
            source_id: entry.source_id,
            direction: entry.direction,
            amount: entry.amount,
            included_tax: entry.amount.included_tax(vat_rate_percent),
            currency: entry.currency.as_str().to_string(),
            method: entry.method,
            status: entry.status,
            paid_at: entry.paid_at,
            gateway_reference: entry.gateway_reference,
            idempotency_key: entry.idempotency_key.as_str().to_string(),
        }
    }
}

fn to_filter(query: &LedgerQuery) -> Result<LedgerFilter, AppError> {
    Ok(LedgerFilter {
        source_type: parse_param(query.source_type.as_deref(), SourceType::parse, "source type")?,
        direction: parse_param(query.direction.as_deref(), Direction::parse, "direction")?,
        method: parse_param(query.method.as_deref(), PaymentMethod::parse, "payment method")?,
        status: parse_param(
            query.status.as_deref(),
            SettlementStatus::parse,
            "settlement status",
        )?,
        court_id: query.court_id.map(CourtId::from_uuid),
        date_from: query.date_from,
        date_to: query.date_to,
        page: query.page.unwrap_or(0),
        limit: query.limit.unwrap_or(0),
    })
}

fn render_csv(page: &Page<LedgerEntryResponse>) -> String {
    let mut csv = String::from(
        "id,source_type,source_id,direction,amount_cents,included_tax_cents,currency,method,status,paid_at,gateway_reference,idempotency_key\n",
    );
    for entry in &page.items {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}\n",
            entry.id,
            entry.source_type,
            entry.source_id,
            entry.direction,
            entry.amount.cents(),
            entry.included_tax.cents(),
            entry.currency,
            entry.method,
            entry.status,
            entry.paid_at.to_rfc3339(),
            entry.gateway_reference.as_deref().unwrap_or(""),
            entry.idempotency_key,
        ));
    }
    csv
}

/// `GET /api/ledger`: filtered, paginated ledger report.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<LedgerQuery>,
) -> Result<Response, AppError> {
    let filter = to_filter(&params)?;
    let page = state.ledger.query(&filter).await?;

    let vat = state.config.vat_rate_percent;
    let page = Page {
        items: page
            .items
            .into_iter()
            .map(|entry| LedgerEntryResponse::from_entry(entry, vat))
            .collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    };

    if params.format.as_deref() == Some("csv") {
        let body = render_csv(&page);
        Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
    } else {
        Ok(Json(page).into_response())
    }
}
