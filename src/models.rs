use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

fn parse_json_list<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Vec<T> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

#[derive(Serialize, Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub reg_number: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub semester: i64,
    pub attendance: f64,
    pub fees_paid: bool,
    pub arrears: Vec<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbStudent {
    pub id: Option<i64>,
    pub reg_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub attendance: Option<f64>,
    pub fees_paid: Option<bool>,
    pub arrears: Option<String>,
}

impl From<DbStudent> for Student {
    fn from(student: DbStudent) -> Self {
        Self {
            id: student.id.unwrap_or_default(),
            reg_number: student.reg_number.unwrap_or_default(),
            name: student.name.unwrap_or_default(),
            email: student.email.unwrap_or_default(),
            department: student.department.unwrap_or_default(),
            semester: student.semester.unwrap_or_default(),
            attendance: student.attendance.unwrap_or_default(),
            fees_paid: student.fees_paid.unwrap_or_default(),
            arrears: parse_json_list(student.arrears),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Subject {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub department: String,
    pub semester: i64,
    pub cost: f64,
    pub exam_schedule: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubject {
    pub id: Option<i64>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub cost: Option<f64>,
    pub exam_schedule: Option<String>,
}

impl From<DbSubject> for Subject {
    fn from(subject: DbSubject) -> Self {
        Self {
            id: subject.id.unwrap_or_default(),
            code: subject.code.unwrap_or_default(),
            name: subject.name.unwrap_or_default(),
            department: subject.department.unwrap_or_default(),
            semester: subject.semester.unwrap_or_default(),
            cost: subject.cost.unwrap_or_default(),
            exam_schedule: subject.exam_schedule,
        }
    }
}

/// Audit copy of an imported arrear row. The student's current arrear list
/// lives on `Student.arrears`; re-imports append new rows here without dedup.
#[derive(Serialize, Debug, Clone)]
pub struct ArrearRecord {
    pub id: i64,
    pub reg_number: String,
    pub name: String,
    pub department: String,
    pub semester: i64,
    pub subjects: Vec<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbArrearRecord {
    pub id: Option<i64>,
    pub reg_number: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub subjects: Option<String>,
}

impl From<DbArrearRecord> for ArrearRecord {
    fn from(record: DbArrearRecord) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            reg_number: record.reg_number.unwrap_or_default(),
            name: record.name.unwrap_or_default(),
            department: record.department.unwrap_or_default(),
            semester: record.semester.unwrap_or_default(),
            subjects: parse_json_list(record.subjects),
        }
    }
}

/// Append-only attendance snapshot, one row per imported batch row.
#[derive(Serialize, Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub reg_number: String,
    pub name: String,
    pub department: String,
    pub semester: i64,
    pub email: String,
    pub percentage: f64,
    pub fees_paid: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAttendanceRecord {
    pub id: Option<i64>,
    pub reg_number: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub email: Option<String>,
    pub percentage: Option<f64>,
    pub fees_paid: Option<bool>,
    pub recorded_at: Option<NaiveDateTime>,
}

impl From<DbAttendanceRecord> for AttendanceRecord {
    fn from(record: DbAttendanceRecord) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            reg_number: record.reg_number.unwrap_or_default(),
            name: record.name.unwrap_or_default(),
            department: record.department.unwrap_or_default(),
            semester: record.semester.unwrap_or_default(),
            email: record.email.unwrap_or_default(),
            percentage: record.percentage.unwrap_or_default(),
            fees_paid: record.fees_paid.unwrap_or_default(),
            recorded_at: record
                .recorded_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

/// One registration record per student. `hall_ticket_generated` is reset to
/// false on every (re-)registration and is never flipped to true anywhere;
/// the flag is kept for the issuance workflow that never landed.
#[derive(Serialize, Debug, Clone)]
pub struct Exam {
    pub id: i64,
    pub student_id: i64,
    pub subjects: Vec<i64>,
    pub hall_ticket_generated: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbExam {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub subjects: Option<String>,
    pub hall_ticket_generated: Option<bool>,
}

impl From<DbExam> for Exam {
    fn from(exam: DbExam) -> Self {
        Self {
            id: exam.id.unwrap_or_default(),
            student_id: exam.student_id.unwrap_or_default(),
            subjects: parse_json_list(exam.subjects),
            hall_ticket_generated: exam.hall_ticket_generated.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct UploadedFile {
    pub id: i64,
    pub file_name: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUploadedFile {
    pub id: Option<i64>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub uploaded_at: Option<NaiveDateTime>,
}

impl From<DbUploadedFile> for UploadedFile {
    fn from(file: DbUploadedFile) -> Self {
        Self {
            id: file.id.unwrap_or_default(),
            file_name: file.file_name.unwrap_or_default(),
            file_type: file.file_type.unwrap_or_default(),
            uploaded_at: file
                .uploaded_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}
