/// Health records (vital signs and lab values)
///
/// Each record is one measurement of one [`RecordType`]. The abnormal flag is
/// computed from the reference range on insert. Every query is scoped to the
/// caller's family.
///
/// # Endpoints
///
/// - `GET /api/v1/records/reference-ranges` - Range table for every type
/// - `POST /api/v1/records` - Create one record
/// - `POST /api/v1/records/batch` - Create several records in one transaction
/// - `GET /api/v1/records` - Filtered listing, newest first
/// - `GET /api/v1/records/trend` - One series for charting, oldest first
/// - `GET /api/v1/records/:id` - Detail
/// - `DELETE /api/v1/records/:id` - Permanent delete
///
/// # Example
///
/// ```text
/// POST /api/v1/records
/// {
///   "memberId": "…",
///   "recordDate": "2024-05-01T08:00:00Z",
///   "recordType": "SYSTOLIC_BP",
///   "value": 145,
///   "unit": "mmHg",
///   "context": "MORNING"
/// }
/// ```
///
/// The stored record has `isAbnormal: true` (normal range 90–139).

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{FamilyScope, RequestMeta},
    routes::members::require_member,
    services::audit,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use famhealth_shared::{
    domain::vitals::{ReferenceRange, ALL_RECORD_TYPES},
    models::{
        audit_log::{AuditAction, AuditEntry, AuditResource},
        member::FamilyMember,
        record::{CreateRecord, HealthRecord, MeasurementContext, RecordFilter, RecordType},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct MemberRef {
    pub id: Uuid,
    pub name: String,
}

/// Record as returned to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub record_type_label: &'static str,
    pub value: f64,
    pub unit: String,
    pub context: MeasurementContext,
    pub is_abnormal: bool,
    pub notes: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub member: MemberRef,
    pub reference_range: ReferenceRange,
}

impl From<HealthRecord> for RecordResponse {
    fn from(r: HealthRecord) -> Self {
        Self {
            id: r.id,
            member_id: r.member_id,
            record_date: r.record_date,
            record_type: r.record_type,
            record_type_label: r.record_type.label(),
            value: r.value,
            unit: r.unit,
            context: r.context,
            is_abnormal: r.is_abnormal,
            notes: r.notes,
            source: r.source,
            created_at: r.created_at,
            member: MemberRef {
                id: r.member_id,
                name: r.member_name,
            },
            reference_range: r.record_type.reference_range(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRangeEntry {
    pub record_type: RecordType,
    #[serde(flatten)]
    pub range: ReferenceRange,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub member_id: Uuid,
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub value: f64,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1 to 20 characters"))]
    pub unit: String,
    pub context: Option<MeasurementContext>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub record_type: RecordType,
    pub value: f64,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1 to 20 characters"))]
    pub unit: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecordRequest {
    pub member_id: Uuid,
    pub record_date: DateTime<Utc>,
    pub context: Option<MeasurementContext>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Provide 1 to 50 records"), nested)]
    pub records: Vec<BatchItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsQuery {
    pub member_id: Option<Uuid>,
    pub record_type: Option<RecordType>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    Week,
    #[default]
    Month,
    Quarter,
    All,
}

impl TrendPeriod {
    pub fn days(&self) -> Option<i64> {
        match self {
            TrendPeriod::Week => Some(7),
            TrendPeriod::Month => Some(30),
            TrendPeriod::Quarter => Some(90),
            TrendPeriod::All => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendQuery {
    pub member_id: Uuid,
    pub record_type: RecordType,
    #[serde(default)]
    pub period: TrendPeriod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub value: f64,
    pub is_abnormal: bool,
    pub context: MeasurementContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResponse {
    pub record_type: RecordType,
    pub label: &'static str,
    pub unit: &'static str,
    pub reference_range: ReferenceRange,
    pub data: Vec<TrendPoint>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Parses `YYYY-MM-DD` or RFC 3339; a bare end date covers the whole day
pub fn parse_date_bound(field: &str, raw: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_field(field, "expected YYYY-MM-DD or an RFC 3339 timestamp"))?;

    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .unwrap_or_default();

    Ok(date.and_time(time).and_utc())
}

/// Mirrors a new height or weight onto the member profile
async fn sync_body_measure<'e, E>(executor: E, member_id: Uuid, record_type: RecordType, value: f64) -> ApiResult<()>
where
    E: PgExecutor<'e>,
{
    match record_type {
        RecordType::Height => FamilyMember::set_body_measure(executor, member_id, Some(value), None).await?,
        RecordType::Weight => FamilyMember::set_body_measure(executor, member_id, None, Some(value)).await?,
        _ => {}
    }
    Ok(())
}

async fn load_record(pool: &PgPool, id: Uuid, family_id: Uuid) -> ApiResult<HealthRecord> {
    HealthRecord::find_in_family(pool, id, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Record not found".to_string()))
}

pub async fn reference_ranges() -> Json<Vec<ReferenceRangeEntry>> {
    Json(
        ALL_RECORD_TYPES
            .iter()
            .map(|t| ReferenceRangeEntry {
                record_type: *t,
                range: t.reference_range(),
            })
            .collect(),
    )
}

pub async fn create_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Json(req): Json<CreateRecordRequest>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let mut tx = state.db.begin().await?;
    let id = HealthRecord::create(
        &mut *tx,
        CreateRecord {
            member_id: req.member_id,
            record_date: req.record_date,
            record_type: req.record_type,
            value: req.value,
            unit: req.unit,
            context: req.context.unwrap_or_default(),
            notes: req.notes,
        },
    )
    .await?;
    sync_body_measure(&mut *tx, req.member_id, req.record_type, req.value).await?;
    tx.commit().await?;

    let record = load_record(&state.db, id, scope.family_id).await?;

    if record.is_abnormal {
        tracing::info!(record_id = %id, record_type = ?record.record_type, value = record.value, "abnormal record stored");
    }

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Create, AuditResource::Record)
            .resource_id(id)
            .details(json!({ "recordType": record.record_type, "value": record.value })),
    );

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// Create several records sharing a date and context
///
/// All rows are written in one transaction; any failure stores nothing.
pub async fn create_batch(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Json(req): Json<BatchRecordRequest>,
) -> ApiResult<(StatusCode, Json<Vec<RecordResponse>>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let context = req.context.unwrap_or_default();
    let mut ids = Vec::with_capacity(req.records.len());

    let mut tx = state.db.begin().await?;
    for item in req.records {
        let id = HealthRecord::create(
            &mut *tx,
            CreateRecord {
                member_id: req.member_id,
                record_date: req.record_date,
                record_type: item.record_type,
                value: item.value,
                unit: item.unit,
                context,
                notes: item.notes.or_else(|| req.notes.clone()),
            },
        )
        .await?;
        sync_body_measure(&mut *tx, req.member_id, item.record_type, item.value).await?;
        ids.push(id);
    }
    tx.commit().await?;

    tracing::info!(member_id = %req.member_id, count = ids.len(), "batch records stored");

    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        records.push(load_record(&state.db, *id, scope.family_id).await?.into());
        audit::record_request(
            &state.db,
            &meta,
            AuditEntry::new(Some(scope.user_id()), AuditAction::Create, AuditResource::Record).resource_id(*id),
        );
    }

    Ok((StatusCode::CREATED, Json(records)))
}

pub async fn list_records(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<ListRecordsQuery>,
) -> ApiResult<Json<Vec<RecordResponse>>> {
    let filter = RecordFilter {
        member_id: query.member_id,
        record_type: query.record_type,
        start: query
            .start_date
            .as_deref()
            .map(|raw| parse_date_bound("startDate", raw, false))
            .transpose()?,
        end: query
            .end_date
            .as_deref()
            .map(|raw| parse_date_bound("endDate", raw, true))
            .transpose()?,
    };

    let records = HealthRecord::list(&state.db, scope.family_id, &filter).await?;
    Ok(Json(records.into_iter().map(RecordResponse::from).collect()))
}

pub async fn trend(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Json<TrendResponse>> {
    require_member(&state.db, scope.family_id, query.member_id).await?;

    let since = query.period.days().map(|days| Utc::now() - Duration::days(days));
    let records = HealthRecord::trend(&state.db, query.member_id, query.record_type, since).await?;
    let range = query.record_type.reference_range();

    Ok(Json(TrendResponse {
        record_type: query.record_type,
        label: range.label,
        unit: range.unit,
        reference_range: range,
        data: records
            .into_iter()
            .map(|r| TrendPoint {
                id: r.id,
                date: r.record_date,
                value: r.value,
                is_abnormal: r.is_abnormal,
                context: r.context,
            })
            .collect(),
    }))
}

pub async fn get_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RecordResponse>> {
    Ok(Json(load_record(&state.db, id, scope.family_id).await?.into()))
}

pub async fn delete_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let record = load_record(&state.db, id, scope.family_id).await?;
    HealthRecord::delete(&state.db, record.id).await?;

    audit::record_request(
        &state.db,
        &meta,
        AuditEntry::new(Some(scope.user_id()), AuditAction::Delete, AuditResource::Record).resource_id(record.id),
    );

    Ok(Json(MessageResponse {
        message: "Record deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_date_bound() {
        let start = parse_date_bound("startDate", "2024-03-05", false).unwrap();
        assert_eq!((start.day(), start.hour()), (5, 0));

        let end = parse_date_bound("endDate", "2024-03-05", true).unwrap();
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));

        let ts = parse_date_bound("endDate", "2024-03-05T10:30:00+08:00", true).unwrap();
        assert_eq!(ts.hour(), 2);

        assert!(parse_date_bound("startDate", "yesterday", false).is_err());
    }

    #[test]
    fn test_trend_period() {
        let q: TrendQuery = serde_json::from_value(json!({
            "memberId": Uuid::nil(),
            "recordType": "HEART_RATE"
        }))
        .unwrap();
        assert_eq!(q.period, TrendPeriod::Month);
        assert_eq!(TrendPeriod::Quarter.days(), Some(90));
        assert_eq!(TrendPeriod::All.days(), None);
    }

    #[test]
    fn test_record_response_carries_range() {
        let record = HealthRecord {
            id: Uuid::nil(),
            member_id: Uuid::nil(),
            document_id: None,
            record_date: Utc::now(),
            record_type: RecordType::FastingGlucose,
            value: 7.2,
            unit: "mmol/L".to_string(),
            context: MeasurementContext::Morning,
            is_abnormal: true,
            notes: None,
            source: "MANUAL".to_string(),
            created_at: Utc::now(),
            member_name: "Dad".to_string(),
        };

        let json = serde_json::to_value(RecordResponse::from(record)).unwrap();
        assert_eq!(json["recordTypeLabel"], "空腹血糖");
        assert_eq!(json["referenceRange"]["max"], 6.1);
        assert_eq!(json["member"]["name"], "Dad");
        assert_eq!(json["context"], "MORNING");
    }

    #[test]
    fn test_batch_validation_is_nested() {
        let req: BatchRecordRequest = serde_json::from_value(json!({
            "memberId": Uuid::nil(),
            "recordDate": "2024-01-01T00:00:00Z",
            "records": [{ "recordType": "WEIGHT", "value": 60, "unit": "" }]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_batch_size_bounds() {
        let batch = |count: usize| -> BatchRecordRequest {
            let item = json!({ "recordType": "WEIGHT", "value": 60, "unit": "kg" });
            serde_json::from_value(json!({
                "memberId": Uuid::nil(),
                "recordDate": "2024-01-01T00:00:00Z",
                "records": vec![item; count],
            }))
            .unwrap()
        };

        assert!(batch(0).validate().is_err());
        assert!(batch(1).validate().is_ok());
        assert!(batch(50).validate().is_ok());
        assert!(batch(51).validate().is_err());
    }
}
