/// Periodic checkups
///
/// # Endpoints
///
/// - `GET /api/v1/checkups/templates` - Suggested items
/// - `GET /api/v1/checkups/summary` - Pending items per member
/// - `POST /api/v1/checkups/items` - Create an item
/// - `GET /api/v1/checkups/items/:memberId` - A member's active items with status
/// - `PATCH /api/v1/checkups/items/:id` - Update an item
/// - `DELETE /api/v1/checkups/items/:id` - Delete an item and its records
/// - `POST /api/v1/checkups/items/:id/skip` - Skip the current cycle
/// - `DELETE /api/v1/checkups/items/:id/skip` - Undo the skip
/// - `POST /api/v1/checkups/items/:id/records` - Record a completed check
/// - `DELETE /api/v1/checkups/records/:id` - Delete a record

use std::collections::HashMap;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::FamilyScope,
    routes::members::require_member,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use famhealth_shared::{
    domain::checkups::{check_progress, skip_until, CheckStatus, CheckTemplate, CHECK_TEMPLATES},
    models::{
        checkup::{CheckItem, CheckRecord, CreateCheckRecord},
        member::FamilyMember,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub member_id: Uuid,

    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    #[validate(range(min = 1, max = 120, message = "Interval must be between 1 and 120 months"))]
    pub interval_months: i32,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    #[validate(range(min = 1, max = 120, message = "Interval must be between 1 and 120 months"))]
    pub interval_months: Option<i32>,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub check_date: NaiveDate,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    #[validate(length(max = 100))]
    pub doctor: Option<String>,

    pub findings: Option<String>,

    pub notes: Option<String>,
}

/// Item with its records and computed status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckItemView {
    pub id: Uuid,
    pub name: String,
    pub interval_months: i32,
    pub description: Option<String>,
    pub is_active: bool,
    pub skipped_until: Option<NaiveDate>,
    pub status: CheckStatus,
    pub last_check_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub overdue_days: i64,
    pub records: Vec<CheckRecord>,
}

impl CheckItemView {
    /// `records` must be newest first
    fn new(item: CheckItem, records: Vec<CheckRecord>, today: NaiveDate) -> Self {
        let last_check_date = records.first().map(|r| r.check_date);
        let progress = check_progress(item.interval_months, item.skipped_until, last_check_date, today);

        Self {
            id: item.id,
            name: item.name,
            interval_months: item.interval_months,
            description: item.description,
            is_active: item.is_active,
            skipped_until: item.skipped_until,
            status: progress.status,
            last_check_date,
            next_due_date: progress.next_due,
            overdue_days: progress.overdue_days,
            records,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPending {
    pub member_id: Uuid,
    pub member_name: String,
    pub pending_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckupSummary {
    pub total_members: usize,
    pub total_pending: usize,
    pub members: Vec<MemberPending>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Loads an item and checks its member belongs to `family_id`
async fn require_item(pool: &PgPool, family_id: Uuid, id: Uuid) -> ApiResult<CheckItem> {
    let owned = CheckItem::find_owned(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Check item not found".to_string()))?;

    if owned.family_id != family_id {
        return Err(ApiError::Forbidden("No access to this check item".to_string()));
    }

    Ok(owned.item)
}

/// Active items of a member with their records attached
async fn member_items(pool: &PgPool, member_id: Uuid, today: NaiveDate) -> ApiResult<Vec<CheckItemView>> {
    let items = CheckItem::list_active(pool, member_id).await?;
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();

    let mut by_item: HashMap<Uuid, Vec<CheckRecord>> = HashMap::new();
    for record in CheckRecord::list_for_items(pool, &ids).await? {
        by_item.entry(record.item_id).or_default().push(record);
    }

    Ok(items
        .into_iter()
        .map(|item| {
            let records = by_item.remove(&item.id).unwrap_or_default();
            CheckItemView::new(item, records, today)
        })
        .collect())
}

async fn item_view(pool: &PgPool, item: CheckItem) -> ApiResult<CheckItemView> {
    let records = CheckRecord::list_for_items(pool, &[item.id]).await?;
    Ok(CheckItemView::new(item, records, Utc::now().date_naive()))
}

pub async fn templates() -> Json<&'static [CheckTemplate]> {
    Json(&CHECK_TEMPLATES)
}

pub async fn summary(State(state): State<AppState>, scope: FamilyScope) -> ApiResult<Json<CheckupSummary>> {
    let today = Utc::now().date_naive();
    let members = FamilyMember::list_by_family(&state.db, scope.family_id).await?;

    let mut entries = Vec::with_capacity(members.len());
    for member in &members {
        let pending_count = member_items(&state.db, member.id, today)
            .await?
            .iter()
            .filter(|i| i.status == CheckStatus::Pending)
            .count();

        entries.push(MemberPending {
            member_id: member.id,
            member_name: member.name.clone(),
            pending_count,
        });
    }

    Ok(Json(CheckupSummary {
        total_members: members.len(),
        total_pending: entries.iter().map(|e| e.pending_count).sum(),
        members: entries,
    }))
}

pub async fn list_items(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CheckItemView>>> {
    require_member(&state.db, scope.family_id, member_id).await?;
    Ok(Json(member_items(&state.db, member_id, Utc::now().date_naive()).await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    scope: FamilyScope,
    Json(req): Json<CreateItemRequest>,
) -> ApiResult<(StatusCode, Json<CheckItemView>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let item = CheckItem::create(
        &state.db,
        req.member_id,
        req.name.trim(),
        req.interval_months,
        req.description.as_deref(),
    )
    .await?;

    tracing::debug!(item_id = %item.id, member_id = %item.member_id, "check item created");

    Ok((StatusCode::CREATED, Json(item_view(&state.db, item).await?)))
}

pub async fn update_item(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<CheckItemView>> {
    req.validate()?;
    require_item(&state.db, scope.family_id, id).await?;

    let item = CheckItem::update(
        &state.db,
        id,
        req.name.as_deref().map(str::trim),
        req.interval_months,
        req.description.as_deref(),
    )
    .await?;

    Ok(Json(item_view(&state.db, item).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    require_item(&state.db, scope.family_id, id).await?;
    CheckItem::delete(&state.db, id).await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Skip the current cycle: the item is not due again until one interval
/// from today
pub async fn skip_item(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CheckItemView>> {
    let item = require_item(&state.db, scope.family_id, id).await?;

    let until = skip_until(item.interval_months, Utc::now().date_naive());
    let item = CheckItem::set_skipped_until(&state.db, id, Some(until)).await?;

    Ok(Json(item_view(&state.db, item).await?))
}

pub async fn unskip_item(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CheckItemView>> {
    require_item(&state.db, scope.family_id, id).await?;
    let item = CheckItem::set_skipped_until(&state.db, id, None).await?;

    Ok(Json(item_view(&state.db, item).await?))
}

/// Record a completed check; clears any skip on the item
pub async fn create_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(item_id): Path<Uuid>,
    Json(req): Json<CreateRecordRequest>,
) -> ApiResult<(StatusCode, Json<CheckRecord>)> {
    req.validate()?;
    require_item(&state.db, scope.family_id, item_id).await?;

    let record = CheckRecord::create(
        &state.db,
        item_id,
        CreateCheckRecord {
            check_date: req.check_date,
            location: req.location,
            doctor: req.doctor,
            findings: req.findings,
            notes: req.notes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    if !CheckRecord::delete_in_family(&state.db, id, scope.family_id).await? {
        return Err(ApiError::NotFound("Check record not found".to_string()));
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn item(interval: i32, skipped_until: Option<NaiveDate>) -> CheckItem {
        CheckItem {
            id: Uuid::new_v4(),
            member_id: Uuid::nil(),
            name: "洗牙".to_string(),
            interval_months: interval,
            description: None,
            is_active: true,
            skipped_until,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(item_id: Uuid, date: NaiveDate) -> CheckRecord {
        CheckRecord {
            id: Uuid::new_v4(),
            item_id,
            check_date: date,
            location: None,
            doctor: None,
            findings: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_uses_newest_record() {
        let item = item(6, None);
        let records = vec![record(item.id, d(2024, 3, 1)), record(item.id, d(2023, 9, 1))];

        let view = CheckItemView::new(item, records, d(2024, 10, 1));
        assert_eq!(view.last_check_date, Some(d(2024, 3, 1)));
        assert_eq!(view.next_due_date, Some(d(2024, 9, 1)));
        assert_eq!(view.status, CheckStatus::Pending);
        assert_eq!(view.overdue_days, 30);
    }

    #[test]
    fn test_view_serializes_status() {
        let view = CheckItemView::new(item(12, Some(d(2030, 1, 1))), vec![], d(2024, 1, 1));
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["status"], "skipped");
        assert_eq!(value["nextDueDate"], "2030-01-01");
        assert_eq!(value["records"], json!([]));
    }

    #[test]
    fn test_interval_bounds() {
        let req = UpdateItemRequest {
            interval_months: Some(121),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateItemRequest {
            interval_months: Some(120),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }
}
