use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::fmt;
use tracing::{info, instrument};

use crate::db::{
    find_arrear_by_reg, subjects_by_codes, subjects_by_ids, subjects_by_names, subjects_for_class,
};
use crate::error::AppError;
use crate::models::{Exam, Student, Subject};

pub const ATTENDANCE_THRESHOLD: f64 = 75.0;
pub const NOT_SCHEDULED: &str = "Not Scheduled";

const ARREAR_FEE_LABEL: &str = "Paid Separately";

/// The specific unmet gate, surfaced to the caller so low attendance and
/// unpaid fees are distinguishable rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityFailure {
    LowAttendance,
    FeesUnpaid,
}

impl fmt::Display for EligibilityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EligibilityFailure::LowAttendance => write!(f, "Low attendance"),
            EligibilityFailure::FeesUnpaid => write!(f, "Fees not paid"),
        }
    }
}

/// Re-evaluated at every gated action (registration, hall-ticket fetch,
/// hall-ticket email); never cached.
pub fn check_eligibility(student: &Student) -> Result<(), EligibilityFailure> {
    if student.attendance < ATTENDANCE_THRESHOLD {
        return Err(EligibilityFailure::LowAttendance);
    }
    if !student.fees_paid {
        return Err(EligibilityFailure::FeesUnpaid);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Regular,
    Arrear,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Regular => write!(f, "Regular"),
            SubjectKind::Arrear => write!(f, "Arrear"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectEntry {
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub fees: String,
    pub exam_schedule: String,
}

fn schedule_or_placeholder(subject: &Subject) -> String {
    subject
        .exam_schedule
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NOT_SCHEDULED.to_string())
}

fn regular_entry(subject: &Subject) -> SubjectEntry {
    SubjectEntry {
        name: subject.name.clone(),
        code: subject.code.clone(),
        kind: SubjectKind::Regular,
        fees: format!("₹{}", subject.cost),
        exam_schedule: schedule_or_placeholder(subject),
    }
}

fn arrear_entry(subject: &Subject) -> SubjectEntry {
    SubjectEntry {
        name: subject.name.clone(),
        code: subject.code.clone(),
        kind: SubjectKind::Arrear,
        fees: ARREAR_FEE_LABEL.to_string(),
        exam_schedule: schedule_or_placeholder(subject),
    }
}

async fn arrear_identifiers(
    pool: &Pool<Sqlite>,
    reg_number: &str,
) -> Result<Vec<String>, AppError> {
    match find_arrear_by_reg(pool, reg_number).await? {
        Some(record) if !record.subjects.is_empty() => Ok(record.subjects),
        _ => {
            info!(reg_number = %reg_number, "No arrear subjects found for student");
            Ok(Vec::new())
        }
    }
}

/// Student-dashboard merge: regular subjects from the department/semester
/// catalog, arrear subjects resolved by subject *name* from the student's
/// arrear record. Identifiers with no catalog match are dropped silently,
/// and no dedup is performed across the two halves.
#[instrument(skip(pool, student), fields(reg_number = %student.reg_number))]
pub async fn student_view_subjects(
    pool: &Pool<Sqlite>,
    student: &Student,
) -> Result<Vec<SubjectEntry>, AppError> {
    let regular = subjects_for_class(pool, &student.department, student.semester).await?;

    let identifiers = arrear_identifiers(pool, &student.reg_number).await?;
    let arrear = subjects_by_names(pool, &identifiers).await?;

    let mut entries: Vec<SubjectEntry> = regular.iter().map(regular_entry).collect();
    entries.extend(arrear.iter().map(arrear_entry));
    Ok(entries)
}

/// Hall-ticket merge: same regular rule as the student view, but arrear
/// subjects are resolved by subject *code*. Kept distinct from
/// `student_view_subjects` on purpose; the two read paths disagree in the
/// source system and both behaviors are preserved.
#[instrument(skip(pool, student), fields(reg_number = %student.reg_number))]
pub async fn hall_ticket_subjects(
    pool: &Pool<Sqlite>,
    student: &Student,
) -> Result<Vec<SubjectEntry>, AppError> {
    let regular = subjects_for_class(pool, &student.department, student.semester).await?;

    let identifiers = arrear_identifiers(pool, &student.reg_number).await?;
    let arrear = subjects_by_codes(pool, &identifiers).await?;

    let mut entries: Vec<SubjectEntry> = regular.iter().map(regular_entry).collect();
    entries.extend(arrear.iter().map(arrear_entry));
    Ok(entries)
}

/// Email merge: regular subjects come from the student's registered exam
/// selection (not the catalog match), arrear subjects by code. The third
/// of the three merge rules, used only for hall-ticket delivery.
#[instrument(skip(pool, student, exam), fields(reg_number = %student.reg_number))]
pub async fn email_subjects(
    pool: &Pool<Sqlite>,
    student: &Student,
    exam: Option<&Exam>,
) -> Result<Vec<SubjectEntry>, AppError> {
    let registered_ids: Vec<i64> = exam.map(|e| e.subjects.clone()).unwrap_or_default();
    let regular = subjects_by_ids(pool, &registered_ids).await?;

    let identifiers = arrear_identifiers(pool, &student.reg_number).await?;
    let arrear = subjects_by_codes(pool, &identifiers).await?;

    let mut entries: Vec<SubjectEntry> = regular.iter().map(regular_entry).collect();
    entries.extend(arrear.iter().map(arrear_entry));
    Ok(entries)
}
