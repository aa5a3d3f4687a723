//! Gathers a member's records and documents for the language model
//!
//! Advice generation and chat both describe the same member to the model but
//! with different windows:
//!
//! | | records | documents |
//! |---|---|---|
//! | advice | last 30 days, at most 50 | latest 5, analyzed content quoted in full |
//! | chat | last 30 days, or the latest 30 when fewer | latest 10, first 3 summarized, best report quoted |

use chrono::{Duration, NaiveDate, Utc};
use famhealth_shared::{
    domain::advice::AdviceContent,
    models::{
        document::HealthDocument,
        member::{BloodType, FamilyMember},
        record::HealthRecord,
    },
};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::services::prompts::{ChatContext, MemberProfile, RecordLine};

const RECENT_DAYS: i64 = 30;
const ADVICE_RECORD_LIMIT: i64 = 50;
const ADVICE_DOCUMENT_LIMIT: i64 = 5;
const CHAT_RECORD_FLOOR: usize = 30;
const CHAT_DOCUMENT_LIMIT: i64 = 10;
const CHAT_SUMMARY_DOCUMENTS: usize = 3;

/// Upper bound on records loaded for the 30 day chat window
const CHAT_RECORD_CAP: i64 = 200;

pub fn member_profile(member: &FamilyMember, today: NaiveDate) -> MemberProfile {
    MemberProfile {
        name: member.name.clone(),
        age: member.age_on(today),
        gender_label: member.gender.label(),
        blood_type: match member.blood_type {
            BloodType::Unknown => None,
            other => Some(other.as_str().to_string()),
        },
        chronic_diseases: member.chronic_diseases.clone(),
    }
}

pub fn record_line(record: &HealthRecord) -> RecordLine {
    RecordLine {
        date: record.record_date.format("%Y-%m-%d").to_string(),
        label: record.record_type.label().to_string(),
        value: record.value,
        unit: record.unit.clone(),
        is_abnormal: record.is_abnormal,
    }
}

/// `date - name` lines for the first `take` documents
pub fn document_summary(documents: &[HealthDocument], take: usize) -> Option<String> {
    let lines: Vec<String> = documents
        .iter()
        .take(take)
        .map(|d| format!("{} - {}", d.check_date.format("%Y-%m-%d"), d.name))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Parsed text of the most relevant analyzed document
///
/// Documents are ranked by type priority; among equals the first one (the
/// newest check date) wins. Falls back to pretty JSON when the parsed data
/// has no `content` string.
pub fn latest_report(documents: &[HealthDocument]) -> Option<String> {
    let best = documents
        .iter()
        .filter(|d| d.parsed_data.is_some())
        .min_by_key(|d| d.doc_type.priority())?;

    best.parsed_content().map(str::to_string).or_else(|| {
        best.parsed_data
            .as_ref()
            .and_then(|v| serde_json::to_string_pretty(v).ok())
    })
}

/// `### date - name` sections for every analyzed document
pub fn analyzed_content(documents: &[HealthDocument]) -> Option<String> {
    let sections: Vec<String> = documents
        .iter()
        .filter_map(|d| {
            d.parsed_content()
                .map(|content| format!("### {} - {}\n{}", d.check_date.format("%Y-%m-%d"), d.name, content))
        })
        .collect();

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

/// Inputs of one advice request
#[derive(Debug, Clone)]
pub struct AdviceInput {
    pub profile: MemberProfile,
    pub records: Vec<RecordLine>,
    pub document_summary: Option<String>,
    pub document_content: Option<String>,
    pub document_count: usize,
}

impl AdviceInput {
    /// Advice needs at least one record or one analyzed document
    pub fn has_enough_data(&self) -> bool {
        !self.records.is_empty() || self.document_content.is_some()
    }

    /// Stored next to the advice so it can be compared later
    pub fn snapshot(&self) -> Value {
        json!({
            "recordCount": self.records.len(),
            "documentCount": self.document_count,
            "hasDocumentContent": self.document_content.is_some(),
            "collectedAt": Utc::now(),
        })
    }
}

pub async fn collect_advice_input(pool: &PgPool, member: &FamilyMember) -> Result<AdviceInput, sqlx::Error> {
    let since = Utc::now() - Duration::days(RECENT_DAYS);
    let records = HealthRecord::recent_for_member(pool, member.id, Some(since), ADVICE_RECORD_LIMIT).await?;
    let documents = HealthDocument::recent_for_member(pool, member.id, ADVICE_DOCUMENT_LIMIT).await?;

    Ok(AdviceInput {
        profile: member_profile(member, Utc::now().date_naive()),
        records: records.iter().map(record_line).collect(),
        document_summary: document_summary(&documents, documents.len()),
        document_content: analyzed_content(&documents),
        document_count: documents.len(),
    })
}

pub async fn collect_chat_context(
    pool: &PgPool,
    member: &FamilyMember,
    advice: Option<AdviceContent>,
) -> Result<ChatContext, sqlx::Error> {
    let since = Utc::now() - Duration::days(RECENT_DAYS);
    let mut records = HealthRecord::recent_for_member(pool, member.id, Some(since), CHAT_RECORD_CAP).await?;
    if records.len() < CHAT_RECORD_FLOOR {
        records = HealthRecord::recent_for_member(pool, member.id, None, CHAT_RECORD_FLOOR as i64).await?;
    }

    let documents = HealthDocument::recent_for_member(pool, member.id, CHAT_DOCUMENT_LIMIT).await?;

    Ok(ChatContext {
        profile: member_profile(member, Utc::now().date_naive()),
        records: records.iter().map(record_line).collect(),
        document_summary: document_summary(&documents, CHAT_SUMMARY_DOCUMENTS),
        latest_report: latest_report(&documents),
        advice,
    })
}
