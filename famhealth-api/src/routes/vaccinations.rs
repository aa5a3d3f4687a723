/// Vaccinations
///
/// Records are matched to built-in definitions by `vaccineCode`; records
/// without a known code are shown as custom doses. Skips mark a vaccine as
/// declined for the current flu season (yearly vaccines) or for good.
///
/// # Endpoints
///
/// - `GET /api/v1/vaccinations` - Records, optionally for one member
/// - `POST /api/v1/vaccinations` - Create a record
/// - `GET /api/v1/vaccinations/definitions` - Built-in vaccines by group
/// - `GET /api/v1/vaccinations/summary` - Pending and overdue across the family
/// - `GET /api/v1/vaccinations/schedule/:memberId` - Status per vaccine
/// - `POST /api/v1/vaccinations/skip` - Skip a vaccine
/// - `DELETE /api/v1/vaccinations/skip/:id` - Undo a skip
/// - `GET|POST /api/v1/vaccinations/custom` - Family-defined vaccines
/// - `DELETE /api/v1/vaccinations/custom/:id`
/// - `GET|PATCH|DELETE /api/v1/vaccinations/:id` - One record

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::FamilyScope,
    routes::members::require_member,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use famhealth_shared::{
    domain::vaccines::{
        self, build_schedule, find_definition, flu_season, VaccineDefinitions, VaccineSchedule, VaccineStatus,
        LIFETIME_SEASON,
    },
    models::{
        member::FamilyMember,
        vaccine::{
            CreateVaccineRecord, CustomVaccine, UpdateVaccineRecord, VaccineFrequency, VaccineRecord, VaccineSkip,
        },
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

const SKIP_EXISTS: &str = "该疫苗已被跳过";

fn duplicate_dose(name: &str, dose: i32) -> String {
    format!("该成员已存在{}第{}剂的接种记录", name, dose)
}

/// Maps a unique violation to `409` with `message`
fn conflict_or(err: sqlx::Error, message: impl FnOnce() -> String) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::Conflict(message()),
        _ => err.into(),
    }
}

fn default_dose() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVaccinationsQuery {
    pub member_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVaccinationRequest {
    pub member_id: Uuid,

    #[validate(length(max = 50))]
    pub vaccine_code: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Vaccine name must be 1 to 100 characters"))]
    pub vaccine_name: String,

    #[validate(range(min = 1, max = 10, message = "Dose number must be between 1 and 10"))]
    #[serde(default = "default_dose")]
    pub dose_number: i32,

    #[validate(range(min = 1, max = 10, message = "Total doses must be between 1 and 10"))]
    pub total_doses: Option<i32>,

    pub vaccinated_at: NaiveDate,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    #[validate(length(max = 100))]
    pub manufacturer: Option<String>,

    #[validate(length(max = 50))]
    pub batch_number: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVaccinationRequest {
    #[validate(length(max = 50))]
    pub vaccine_code: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Vaccine name must be 1 to 100 characters"))]
    pub vaccine_name: Option<String>,

    #[validate(range(min = 1, max = 10, message = "Dose number must be between 1 and 10"))]
    pub dose_number: Option<i32>,

    #[validate(range(min = 1, max = 10, message = "Total doses must be between 1 and 10"))]
    pub total_doses: Option<i32>,

    pub vaccinated_at: Option<NaiveDate>,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    #[validate(length(max = 100))]
    pub manufacturer: Option<String>,

    #[validate(length(max = 50))]
    pub batch_number: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SkipVaccineRequest {
    pub member_id: Uuid,

    #[validate(length(min = 1, max = 50))]
    pub vaccine_code: String,

    /// Defaults to the current flu season for yearly vaccines, `lifetime`
    /// otherwise
    #[validate(length(min = 1, max = 20))]
    pub season_label: Option<String>,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomVaccineRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    pub frequency: VaccineFrequency,

    #[validate(range(min = 1, max = 10, message = "Total doses must be between 1 and 10"))]
    pub total_doses: i32,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVaccine {
    pub member_id: Uuid,
    pub member_name: String,
    pub vaccine_name: &'static str,
    pub status: VaccineStatus,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationSummary {
    pub total_members: usize,
    pub total_records: i64,
    pub pending_count: usize,
    pub overdue_count: usize,
    pub pending_list: Vec<PendingVaccine>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

async fn require_record(pool: &PgPool, family_id: Uuid, id: Uuid) -> ApiResult<VaccineRecord> {
    VaccineRecord::find_in_family(pool, id, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Vaccination record not found".to_string()))
}

/// Pending and overdue entries of one schedule
fn pending_entries(schedule: &VaccineSchedule) -> impl Iterator<Item = PendingVaccine> + '_ {
    schedule
        .recommended()
        .filter(|v| matches!(v.status, VaccineStatus::Pending | VaccineStatus::Overdue))
        .map(|v| PendingVaccine {
            member_id: schedule.member_id,
            member_name: schedule.member_name.clone(),
            vaccine_name: v.vaccine.name,
            status: v.status,
            description: v.vaccine.description,
        })
}

async fn member_schedule(pool: &PgPool, member: &FamilyMember) -> ApiResult<VaccineSchedule> {
    let records = VaccineRecord::list_for_member(pool, member.id).await?;
    let skips = VaccineSkip::list_for_member(pool, member.id).await?;

    Ok(build_schedule(member, &records, &skips, Utc::now().date_naive()))
}

pub async fn definitions() -> Json<VaccineDefinitions> {
    Json(vaccines::definitions())
}

pub async fn list_records(
    State(state): State<AppState>,
    scope: FamilyScope,
    Query(query): Query<ListVaccinationsQuery>,
) -> ApiResult<Json<Vec<VaccineRecord>>> {
    Ok(Json(VaccineRecord::list(&state.db, scope.family_id, query.member_id).await?))
}

pub async fn get_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VaccineRecord>> {
    Ok(Json(require_record(&state.db, scope.family_id, id).await?))
}

/// Create a vaccination record
///
/// A known `vaccineCode` fixes `totalDoses` to the definition's count.
///
/// # Errors
///
/// - `409 Conflict`: The member already has this dose of this vaccine
pub async fn create_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Json(req): Json<CreateVaccinationRequest>,
) -> ApiResult<(StatusCode, Json<VaccineRecord>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let total_doses = req
        .vaccine_code
        .as_deref()
        .and_then(find_definition)
        .map(|d| d.total_doses)
        .or(req.total_doses);

    let name = req.vaccine_name.trim().to_string();
    let dose = req.dose_number;

    let id = VaccineRecord::create(
        &state.db,
        CreateVaccineRecord {
            member_id: req.member_id,
            vaccine_code: req.vaccine_code,
            vaccine_name: name.clone(),
            dose_number: dose,
            total_doses,
            vaccinated_at: req.vaccinated_at,
            location: req.location,
            manufacturer: req.manufacturer,
            batch_number: req.batch_number,
            notes: req.notes,
        },
    )
    .await
    .map_err(|e| conflict_or(e, || duplicate_dose(&name, dose)))?;

    tracing::info!(record_id = %id, member_id = %req.member_id, vaccine = %name, dose, "vaccination recorded");

    Ok((StatusCode::CREATED, Json(require_record(&state.db, scope.family_id, id).await?)))
}

pub async fn update_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVaccinationRequest>,
) -> ApiResult<Json<VaccineRecord>> {
    req.validate()?;
    let current = require_record(&state.db, scope.family_id, id).await?;

    let total_doses = req
        .vaccine_code
        .as_deref()
        .and_then(find_definition)
        .map(|d| d.total_doses)
        .or(req.total_doses);

    let name = req
        .vaccine_name
        .as_deref()
        .map(str::trim)
        .unwrap_or(current.vaccine_name.as_str())
        .to_string();
    let dose = req.dose_number.unwrap_or(current.dose_number);

    VaccineRecord::update(
        &state.db,
        id,
        UpdateVaccineRecord {
            vaccine_code: req.vaccine_code,
            vaccine_name: req.vaccine_name.map(|n| n.trim().to_string()),
            dose_number: req.dose_number,
            total_doses,
            vaccinated_at: req.vaccinated_at,
            location: req.location,
            manufacturer: req.manufacturer,
            batch_number: req.batch_number,
            notes: req.notes,
        },
    )
    .await
    .map_err(|e| conflict_or(e, || duplicate_dose(&name, dose)))?;

    Ok(Json(require_record(&state.db, scope.family_id, id).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    require_record(&state.db, scope.family_id, id).await?;
    VaccineRecord::delete(&state.db, id).await?;

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn schedule(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<VaccineSchedule>> {
    let member = require_member(&state.db, scope.family_id, member_id).await?;
    Ok(Json(member_schedule(&state.db, &member).await?))
}

pub async fn summary(State(state): State<AppState>, scope: FamilyScope) -> ApiResult<Json<VaccinationSummary>> {
    let members = FamilyMember::list_by_family(&state.db, scope.family_id).await?;
    let total_records = VaccineRecord::count_for_family(&state.db, scope.family_id).await?;

    let mut pending_list = Vec::new();
    for member in &members {
        let schedule = member_schedule(&state.db, member).await?;
        pending_list.extend(pending_entries(&schedule));
    }

    let overdue_count = pending_list
        .iter()
        .filter(|p| p.status == VaccineStatus::Overdue)
        .count();

    Ok(Json(VaccinationSummary {
        total_members: members.len(),
        total_records,
        pending_count: pending_list.len() - overdue_count,
        overdue_count,
        pending_list,
    }))
}

/// Skip a built-in vaccine
///
/// # Errors
///
/// - `404 Not Found`: Unknown vaccine code
/// - `409 Conflict`: Already skipped for that season
pub async fn skip_vaccine(
    State(state): State<AppState>,
    scope: FamilyScope,
    Json(req): Json<SkipVaccineRequest>,
) -> ApiResult<(StatusCode, Json<VaccineSkip>)> {
    req.validate()?;
    require_member(&state.db, scope.family_id, req.member_id).await?;

    let vaccine = find_definition(&req.vaccine_code)
        .ok_or_else(|| ApiError::NotFound("Vaccine not found".to_string()))?;

    let season_label = req.season_label.unwrap_or_else(|| match vaccine.frequency {
        VaccineFrequency::Yearly => flu_season(Utc::now().date_naive()).label,
        _ => LIFETIME_SEASON.to_string(),
    });

    let skip = VaccineSkip::create(
        &state.db,
        req.member_id,
        vaccine.code,
        &season_label,
        req.reason.as_deref(),
    )
    .await
    .map_err(|e| conflict_or(e, || SKIP_EXISTS.to_string()))?;

    Ok((StatusCode::CREATED, Json(skip)))
}

pub async fn unskip_vaccine(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    if !VaccineSkip::delete_in_family(&state.db, id, scope.family_id).await? {
        return Err(ApiError::NotFound("Skip not found".to_string()));
    }

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn list_custom(State(state): State<AppState>, scope: FamilyScope) -> ApiResult<Json<Vec<CustomVaccine>>> {
    Ok(Json(CustomVaccine::list(&state.db, scope.family_id).await?))
}

pub async fn create_custom(
    State(state): State<AppState>,
    scope: FamilyScope,
    Json(req): Json<CreateCustomVaccineRequest>,
) -> ApiResult<(StatusCode, Json<CustomVaccine>)> {
    req.validate()?;

    let vaccine = CustomVaccine::create(
        &state.db,
        scope.family_id,
        &req.name,
        req.frequency,
        req.total_doses,
        req.description.as_deref(),
    )
    .await
    .map_err(|e| conflict_or(e, || format!("自定义疫苗「{}」已存在", req.name.trim())))?;

    Ok((StatusCode::CREATED, Json(vaccine)))
}

pub async fn delete_custom(
    State(state): State<AppState>,
    scope: FamilyScope,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    if !CustomVaccine::delete_in_family(&state.db, id, scope.family_id).await? {
        return Err(ApiError::NotFound("Custom vaccine not found".to_string()));
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use famhealth_shared::models::member::{BloodType, Gender, Relationship};
    use serde_json::json;

    fn toddler() -> FamilyMember {
        let today = Utc::now().date_naive();
        FamilyMember {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            user_id: None,
            name: "小宝".to_string(),
            relationship: Relationship::Son,
            gender: Gender::Male,
            birth_date: today - chrono::Duration::days(3 * 365),
            avatar: None,
            blood_type: BloodType::Unknown,
            height: None,
            weight: None,
            chronic_diseases: Vec::new(),
            allergies: None,
            notes: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_message() {
        assert_eq!(duplicate_dose("乙肝疫苗", 2), "该成员已存在乙肝疫苗第2剂的接种记录");
    }

    #[test]
    fn test_dose_defaults_to_one() {
        let req: CreateVaccinationRequest = serde_json::from_value(json!({
            "memberId": Uuid::nil(),
            "vaccineName": "流感疫苗",
            "vaccinatedAt": "2024-10-01"
        }))
        .unwrap();

        assert_eq!(req.dose_number, 1);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_dose_bounds() {
        let req = UpdateVaccinationRequest {
            dose_number: Some(11),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_unvaccinated_toddler_has_overdue_entries() {
        let member = toddler();
        let schedule = build_schedule(&member, &[], &[], Utc::now().date_naive());
        let pending: Vec<_> = pending_entries(&schedule).collect();

        assert!(!pending.is_empty());
        assert!(pending.iter().any(|p| p.status == VaccineStatus::Overdue));
        assert!(pending.iter().all(|p| p.member_name == "小宝"));
    }
}
