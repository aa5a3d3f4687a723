//! Built-in vaccine definitions and per-member schedule status
//!
//! The definitions follow the Chinese national immunization program for
//! children plus common adult and elderly vaccines. [`build_schedule`] turns a
//! member's vaccination records and skips into a status per vaccine.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use famhealth_shared::domain::vaccines::{find_definition, flu_season};
//!
//! let season = flu_season(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap());
//! assert_eq!(season.label, "2024-2025");
//! assert_eq!(find_definition("BCG").map(|v| v.total_doses), Some(1));
//! ```

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::age::months_between;
use crate::models::member::FamilyMember;
use crate::models::vaccine::VaccineFrequency::{MultiDose, Once, Yearly};
use crate::models::vaccine::{VaccineFrequency, VaccineRecord, VaccineSkip};

/// Season label used for skips of non-yearly vaccines
pub const LIFETIME_SEASON: &str = "lifetime";

/// Months past the scheduled age after which a child dose is overdue
const OVERDUE_GRACE_MONTHS: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaccineCategory {
    Child,
    Adult,
    Elderly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineDefinition {
    pub code: &'static str,
    pub name: &'static str,
    pub category: VaccineCategory,
    pub frequency: VaccineFrequency,
    pub total_doses: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_months: Option<&'static [i32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_age_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_years: Option<i32>,
    pub description: &'static str,
}

impl VaccineDefinition {
    fn applies_to_age(&self, age_years: i32) -> bool {
        age_years >= self.min_age_years.unwrap_or(0) && age_years <= self.max_age_years.unwrap_or(150)
    }
}

const fn child(
    code: &'static str,
    name: &'static str,
    frequency: VaccineFrequency,
    total_doses: i32,
    schedule: &'static [i32],
    max_age_years: i32,
    description: &'static str,
) -> VaccineDefinition {
    VaccineDefinition {
        code,
        name,
        category: VaccineCategory::Child,
        frequency,
        total_doses,
        schedule_months: Some(schedule),
        min_age_years: None,
        max_age_years: Some(max_age_years),
        description,
    }
}

const fn later_life(
    code: &'static str,
    name: &'static str,
    category: VaccineCategory,
    frequency: VaccineFrequency,
    total_doses: i32,
    min_age_years: i32,
    max_age_years: Option<i32>,
    description: &'static str,
) -> VaccineDefinition {
    VaccineDefinition {
        code,
        name,
        category,
        frequency,
        total_doses,
        schedule_months: None,
        min_age_years: Some(min_age_years),
        max_age_years,
        description,
    }
}

pub static CHILD_VACCINES: [VaccineDefinition; 11] = [
    child("HEP_B", "乙肝疫苗", MultiDose, 3, &[0, 1, 6], 6, "出生时、1月龄、6月龄各接种1剂"),
    child("BCG", "卡介苗", Once, 1, &[0], 1, "出生时接种"),
    child("POLIO", "脊灰疫苗", MultiDose, 4, &[2, 3, 4, 48], 6, "2、3、4月龄及4岁各接种1剂"),
    child("DTP", "百白破疫苗", MultiDose, 4, &[3, 4, 5, 18], 6, "3、4、5月龄及18月龄各接种1剂"),
    child("MR", "麻风疫苗", Once, 1, &[8], 6, "8月龄接种"),
    child("JE", "乙脑疫苗", MultiDose, 2, &[8, 24], 6, "8月龄、2岁各接种1剂"),
    child("MEN_A", "A群流脑疫苗", MultiDose, 2, &[6, 9], 6, "6、9月龄各接种1剂"),
    child("MMR", "麻腮风疫苗", Once, 1, &[18], 6, "18月龄接种"),
    child("HEP_A", "甲肝疫苗", Once, 1, &[24], 6, "2岁接种"),
    child("MEN_AC", "A+C群流脑疫苗", MultiDose, 2, &[36, 72], 6, "3岁、6岁各接种1剂"),
    child("DT", "白破疫苗", Once, 1, &[72], 7, "6岁接种"),
];

pub static ADULT_VACCINES: [VaccineDefinition; 4] = [
    later_life("FLU", "流感疫苗", VaccineCategory::Adult, Yearly, 1, 6, None, "每年接种1剂，建议秋冬季节前接种"),
    later_life("COVID", "新冠疫苗", VaccineCategory::Adult, Yearly, 1, 3, None, "建议每年加强接种"),
    later_life("HPV", "HPV疫苗", VaccineCategory::Adult, MultiDose, 3, 9, Some(45), "9-45岁女性，共3剂"),
    later_life("HEP_B_ADULT", "乙肝疫苗(成人)", VaccineCategory::Adult, MultiDose, 3, 18, None, "未接种者可补种，共3剂"),
];

pub static ELDERLY_VACCINES: [VaccineDefinition; 2] = [
    later_life("PPSV23", "肺炎疫苗(23价)", VaccineCategory::Elderly, Once, 1, 60, None, "60岁以上老人推荐接种"),
    later_life("SHINGLES", "带状疱疹疫苗", VaccineCategory::Elderly, MultiDose, 2, 50, None, "50岁以上推荐接种，共2剂"),
];

/// Every built-in definition: child, then adult, then elderly
pub fn all_definitions() -> impl Iterator<Item = &'static VaccineDefinition> {
    CHILD_VACCINES.iter().chain(ADULT_VACCINES.iter()).chain(ELDERLY_VACCINES.iter())
}

pub fn find_definition(code: &str) -> Option<&'static VaccineDefinition> {
    all_definitions().find(|v| v.code == code)
}

/// Definitions grouped the way clients render them
#[derive(Debug, Serialize)]
pub struct VaccineDefinitions {
    pub child: &'static [VaccineDefinition],
    pub adult: &'static [VaccineDefinition],
    pub elderly: &'static [VaccineDefinition],
    pub all: Vec<&'static VaccineDefinition>,
}

pub fn definitions() -> VaccineDefinitions {
    VaccineDefinitions {
        child: &CHILD_VACCINES,
        adult: &ADULT_VACCINES,
        elderly: &ELDERLY_VACCINES,
        all: all_definitions().collect(),
    }
}

/// Flu season containing a date, from Sep 15 through the next Sep 14
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluSeason {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl FluSeason {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

pub fn flu_season(date: NaiveDate) -> FluSeason {
    let year = date.year();
    let first_year = if (date.month(), date.day()) < (9, 15) { year - 1 } else { year };

    FluSeason {
        start: NaiveDate::from_ymd_opt(first_year, 9, 15).unwrap_or(date),
        end: NaiveDate::from_ymd_opt(first_year + 1, 9, 14).unwrap_or(date),
        label: format!("{}-{}", first_year, first_year + 1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaccineStatus {
    Completed,
    Pending,
    Overdue,
    Skipped,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseSummary {
    pub id: Uuid,
    pub dose_number: i32,
    pub vaccinated_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedVaccine {
    pub vaccine: &'static VaccineDefinition,
    pub status: VaccineStatus,
    pub completed_doses: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_dose_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_vaccinated_at: Option<NaiveDate>,
    pub records: Vec<DoseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_label: Option<String>,
}

/// Record that does not match a built-in vaccine code
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDose {
    pub id: Uuid,
    pub vaccine_name: String,
    pub dose_number: i32,
    pub total_doses: Option<i32>,
    pub vaccinated_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineSchedule {
    pub member_id: Uuid,
    pub member_name: String,
    pub age_years: i32,
    pub age_months: i32,
    pub child_vaccines: Vec<RecommendedVaccine>,
    pub adult_vaccines: Vec<RecommendedVaccine>,
    pub elderly_vaccines: Vec<RecommendedVaccine>,
    pub custom_records: Vec<CustomDose>,
}

impl VaccineSchedule {
    /// Every recommended vaccine across the three groups
    pub fn recommended(&self) -> impl Iterator<Item = &RecommendedVaccine> {
        self.child_vaccines
            .iter()
            .chain(self.adult_vaccines.iter())
            .chain(self.elderly_vaccines.iter())
    }
}

struct ScheduleContext<'a> {
    age_years: i32,
    age_months: i32,
    season: FluSeason,
    records: HashMap<&'a str, Vec<&'a VaccineRecord>>,
    skips: HashMap<(&'a str, &'a str), &'a VaccineSkip>,
}

impl ScheduleContext<'_> {
    fn status_of(&self, vaccine: &'static VaccineDefinition) -> RecommendedVaccine {
        let records: &[&VaccineRecord] = self.records.get(vaccine.code).map(Vec::as_slice).unwrap_or(&[]);
        let completed = records.len() as i32;

        let mut entry = RecommendedVaccine {
            vaccine,
            status: VaccineStatus::Pending,
            completed_doses: completed,
            next_dose_number: None,
            last_vaccinated_at: records.last().map(|r| r.vaccinated_at),
            records: records
                .iter()
                .map(|r| DoseSummary {
                    id: r.id,
                    dose_number: r.dose_number,
                    vaccinated_at: r.vaccinated_at,
                })
                .collect(),
            skip_id: None,
            season_label: None,
        };

        if !vaccine.applies_to_age(self.age_years) {
            entry.status = VaccineStatus::NotApplicable;
            return entry;
        }

        if vaccine.frequency == VaccineFrequency::Yearly {
            entry.season_label = Some(self.season.label.clone());
            if records.iter().any(|r| self.season.contains(r.vaccinated_at)) {
                entry.status = VaccineStatus::Completed;
            } else if let Some(skip) = self.skips.get(&(vaccine.code, self.season.label.as_str())) {
                entry.status = VaccineStatus::Skipped;
                entry.skip_id = Some(skip.id);
            } else {
                entry.next_dose_number = Some(1);
            }
            return entry;
        }

        if completed >= vaccine.total_doses {
            entry.status = VaccineStatus::Completed;
            return entry;
        }

        entry.season_label = Some(LIFETIME_SEASON.to_string());
        if let Some(skip) = self.skips.get(&(vaccine.code, LIFETIME_SEASON)) {
            entry.status = VaccineStatus::Skipped;
            entry.skip_id = Some(skip.id);
            return entry;
        }

        entry.next_dose_number = Some(completed + 1);
        if let (VaccineCategory::Child, Some(schedule)) = (vaccine.category, vaccine.schedule_months) {
            let due_month = schedule.get(completed as usize).copied().unwrap_or(0);
            if self.age_months > due_month + OVERDUE_GRACE_MONTHS {
                entry.status = VaccineStatus::Overdue;
            }
        }
        entry
    }

    fn group(&self, vaccines: &'static [VaccineDefinition]) -> Vec<RecommendedVaccine> {
        vaccines.iter().map(|v| self.status_of(v)).collect()
    }
}

/// Builds a member's schedule from records (oldest first) and skips
///
/// Child vaccines are listed through age 7, adult vaccines from age 6 and
/// elderly vaccines from age 50.
pub fn build_schedule(
    member: &FamilyMember,
    records: &[VaccineRecord],
    skips: &[VaccineSkip],
    today: NaiveDate,
) -> VaccineSchedule {
    let age_months = months_between(member.birth_date, today);
    let age_years = age_months / 12;

    let mut by_code: HashMap<&str, Vec<&VaccineRecord>> = HashMap::new();
    let mut custom_records = Vec::new();
    for record in records {
        match record.vaccine_code.as_deref().and_then(find_definition) {
            Some(definition) => by_code.entry(definition.code).or_default().push(record),
            None => custom_records.push(CustomDose {
                id: record.id,
                vaccine_name: record.vaccine_name.clone(),
                dose_number: record.dose_number,
                total_doses: record.total_doses,
                vaccinated_at: record.vaccinated_at,
            }),
        }
    }

    let ctx = ScheduleContext {
        age_years,
        age_months,
        season: flu_season(today),
        records: by_code,
        skips: skips
            .iter()
            .map(|s| ((s.vaccine_code.as_str(), s.season_label.as_str()), s))
            .collect(),
    };

    VaccineSchedule {
        member_id: member.id,
        member_name: member.name.clone(),
        age_years,
        age_months,
        child_vaccines: if age_years <= 7 { ctx.group(&CHILD_VACCINES) } else { Vec::new() },
        adult_vaccines: if age_years >= 6 { ctx.group(&ADULT_VACCINES) } else { Vec::new() },
        elderly_vaccines: if age_years >= 50 { ctx.group(&ELDERLY_VACCINES) } else { Vec::new() },
        custom_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::member::{BloodType, Gender, Relationship};
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn member(birth: NaiveDate) -> FamilyMember {
        FamilyMember {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            user_id: None,
            name: "小明".to_string(),
            relationship: Relationship::Son,
            gender: Gender::Male,
            birth_date: birth,
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

    fn record(m: &FamilyMember, code: Option<&str>, name: &str, dose: i32, at: NaiveDate) -> VaccineRecord {
        VaccineRecord {
            id: Uuid::new_v4(),
            member_id: m.id,
            vaccine_code: code.map(str::to_string),
            vaccine_name: name.to_string(),
            dose_number: dose,
            total_doses: None,
            vaccinated_at: at,
            location: None,
            manufacturer: None,
            batch_number: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            member_name: m.name.clone(),
        }
    }

    fn skip(m: &FamilyMember, code: &str, season: &str) -> VaccineSkip {
        VaccineSkip {
            id: Uuid::new_v4(),
            member_id: m.id,
            vaccine_code: code.to_string(),
            season_label: season.to_string(),
            reason: None,
            created_at: Utc::now(),
        }
    }

    fn find<'a>(list: &'a [RecommendedVaccine], code: &str) -> &'a RecommendedVaccine {
        list.iter().find(|v| v.vaccine.code == code).unwrap()
    }

    #[test]
    fn test_definition_counts() {
        assert_eq!(all_definitions().count(), 17);
        assert_eq!(find_definition("HEP_B_ADULT").unwrap().min_age_years, Some(18));
        assert!(find_definition("NOPE").is_none());
    }

    #[test]
    fn test_flu_season_boundary() {
        assert_eq!(flu_season(d(2024, 9, 14)).label, "2023-2024");
        assert_eq!(flu_season(d(2024, 9, 15)).label, "2024-2025");

        let season = flu_season(d(2025, 1, 5));
        assert_eq!(season.start, d(2024, 9, 15));
        assert_eq!(season.end, d(2025, 9, 14));
        assert!(season.contains(d(2025, 9, 14)));
        assert!(!season.contains(d(2025, 9, 15)));
    }

    #[test]
    fn test_infant_schedule() {
        let baby = member(d(2024, 1, 1));
        let records = vec![
            record(&baby, Some("HEP_B"), "乙肝疫苗", 1, d(2024, 1, 1)),
            record(&baby, Some("BCG"), "卡介苗", 1, d(2024, 1, 2)),
        ];
        let schedule = build_schedule(&baby, &records, &[], d(2024, 4, 1));

        assert_eq!(schedule.age_years, 0);
        assert!(schedule.adult_vaccines.is_empty());
        assert!(schedule.elderly_vaccines.is_empty());

        let hep_b = find(&schedule.child_vaccines, "HEP_B");
        assert_eq!(hep_b.status, VaccineStatus::Pending);
        assert_eq!(hep_b.completed_doses, 1);
        assert_eq!(hep_b.next_dose_number, Some(2));
        assert_eq!(hep_b.season_label.as_deref(), Some(LIFETIME_SEASON));

        assert_eq!(find(&schedule.child_vaccines, "BCG").status, VaccineStatus::Completed);
    }

    #[test]
    fn test_child_dose_becomes_overdue() {
        let kid = member(d(2021, 1, 1));
        let schedule = build_schedule(&kid, &[], &[], d(2024, 1, 1));

        assert_eq!(schedule.age_years, 2);
        // BCG is only given in the first year
        assert_eq!(find(&schedule.child_vaccines, "BCG").status, VaccineStatus::NotApplicable);
        // first dose was due at birth
        assert_eq!(find(&schedule.child_vaccines, "HEP_B").status, VaccineStatus::Overdue);
        // first MEN_AC dose is due at 36 months
        assert_eq!(find(&schedule.child_vaccines, "MEN_AC").status, VaccineStatus::Pending);
    }

    #[test]
    fn test_lifetime_skip() {
        let kid = member(d(2021, 1, 1));
        let skips = vec![skip(&kid, "HEP_B", LIFETIME_SEASON)];
        let schedule = build_schedule(&kid, &[], &skips, d(2024, 1, 1));

        let hep_b = find(&schedule.child_vaccines, "HEP_B");
        assert_eq!(hep_b.status, VaccineStatus::Skipped);
        assert_eq!(hep_b.skip_id, Some(skips[0].id));
    }

    #[test]
    fn test_yearly_vaccine_tracks_season() {
        let adult = member(d(1980, 5, 5));
        let today = d(2024, 11, 1);

        let none = build_schedule(&adult, &[], &[], today);
        let flu = find(&none.adult_vaccines, "FLU");
        assert_eq!(flu.status, VaccineStatus::Pending);
        assert_eq!(flu.next_dose_number, Some(1));
        assert_eq!(flu.season_label.as_deref(), Some("2024-2025"));

        let last_season = vec![record(&adult, Some("FLU"), "流感疫苗", 1, d(2024, 9, 1))];
        let stale = build_schedule(&adult, &last_season, &[], today);
        assert_eq!(find(&stale.adult_vaccines, "FLU").status, VaccineStatus::Pending);

        let this_season = vec![record(&adult, Some("FLU"), "流感疫苗", 1, d(2024, 10, 1))];
        let done = build_schedule(&adult, &this_season, &[], today);
        assert_eq!(find(&done.adult_vaccines, "FLU").status, VaccineStatus::Completed);

        let skips = vec![skip(&adult, "FLU", "2024-2025")];
        let skipped = build_schedule(&adult, &[], &skips, today);
        assert_eq!(find(&skipped.adult_vaccines, "FLU").status, VaccineStatus::Skipped);
    }

    #[test]
    fn test_age_groups_and_custom_records() {
        let senior = member(d(1960, 1, 1));
        let records = vec![record(&senior, None, "狂犬疫苗", 1, d(2023, 3, 1))];
        let schedule = build_schedule(&senior, &records, &[], d(2024, 6, 1));

        assert!(schedule.child_vaccines.is_empty());
        assert_eq!(schedule.elderly_vaccines.len(), 2);
        assert_eq!(find(&schedule.adult_vaccines, "HPV").status, VaccineStatus::NotApplicable);
        assert_eq!(find(&schedule.elderly_vaccines, "PPSV23").status, VaccineStatus::Pending);
        assert_eq!(schedule.custom_records.len(), 1);
        assert_eq!(schedule.custom_records[0].vaccine_name, "狂犬疫苗");
    }
}
