use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::db::{
    create_student, create_subject, find_student_by_reg_or_email, find_subject_by_code,
    insert_arrear_record, insert_attendance_record, set_student_arrears, set_student_standing,
};
use crate::error::AppError;

/// A parsed spreadsheet row: column name to raw cell value. Numeric cells
/// may arrive as JSON numbers or as numeric strings depending on the parser.
pub type ImportRow = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    StudentList,
    ArrearList,
    Attendance,
    SubjectList,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct StudentRow {
    reg_number: String,
    name: String,
    email: String,
    department: String,
    semester: i64,
}

#[derive(Debug, Clone)]
struct ArrearRow {
    reg_number: String,
    name: String,
    department: String,
    semester: i64,
    subjects: Vec<String>,
}

#[derive(Debug, Clone)]
struct AttendanceRow {
    reg_number: String,
    name: String,
    department: String,
    semester: i64,
    email: String,
    percentage: f64,
    fees_paid: bool,
}

#[derive(Debug, Clone)]
struct SubjectRow {
    code: String,
    name: String,
    department: String,
    semester: i64,
    cost: f64,
}

enum ParsedRows {
    Students(Vec<StudentRow>),
    Arrears(Vec<ArrearRow>),
    Attendance(Vec<AttendanceRow>),
    Subjects(Vec<SubjectRow>),
}

fn missing_column(index: usize, column: &str) -> AppError {
    AppError::Validation(format!("Row {}: missing column '{}'", index + 1, column))
}

fn cell_str(row: &ImportRow, index: usize, column: &str) -> Result<String, AppError> {
    match row.get(column) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(missing_column(index, column)),
    }
}

fn cell_i64(row: &ImportRow, index: usize, column: &str) -> Result<i64, AppError> {
    match row.get(column) {
        Some(Value::Number(n)) if n.as_i64().is_some() => Ok(n.as_i64().unwrap_or_default()),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            AppError::Validation(format!(
                "Row {}: column '{}' is not a whole number",
                index + 1,
                column
            ))
        }),
        _ => Err(missing_column(index, column)),
    }
}

fn cell_f64(row: &ImportRow, index: usize, column: &str) -> Result<f64, AppError> {
    match row.get(column) {
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or_default()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            AppError::Validation(format!(
                "Row {}: column '{}' is not a number",
                index + 1,
                column
            ))
        }),
        _ => Err(missing_column(index, column)),
    }
}

/// Validate every row against the schema for its import type before any
/// write happens. A single nonconforming row rejects the whole batch.
fn parse_rows(import_type: ImportType, rows: &[ImportRow]) -> Result<ParsedRows, AppError> {
    match import_type {
        ImportType::StudentList => {
            let mut parsed = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                parsed.push(StudentRow {
                    reg_number: cell_str(row, i, "Reg no")?,
                    name: cell_str(row, i, "Name")?,
                    email: cell_str(row, i, "Email")?,
                    department: cell_str(row, i, "Dep")?,
                    semester: cell_i64(row, i, "Sem")?,
                });
            }
            Ok(ParsedRows::Students(parsed))
        }
        ImportType::ArrearList => {
            let mut parsed = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                // Raw comma split, no trimming: the identifiers are matched
                // verbatim against the subject catalog later.
                let subjects = cell_str(row, i, "Arrear sub")?
                    .split(',')
                    .map(String::from)
                    .collect();
                parsed.push(ArrearRow {
                    reg_number: cell_str(row, i, "Reg no")?,
                    name: cell_str(row, i, "Name")?,
                    department: cell_str(row, i, "Dep")?,
                    semester: cell_i64(row, i, "Sem")?,
                    subjects,
                });
            }
            Ok(ParsedRows::Arrears(parsed))
        }
        ImportType::Attendance => {
            let mut parsed = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                let fees_paid = cell_str(row, i, "Fees Status")?.to_lowercase() == "paid";
                parsed.push(AttendanceRow {
                    reg_number: cell_str(row, i, "Reg no")?,
                    name: cell_str(row, i, "Name")?,
                    department: cell_str(row, i, "Dep")?,
                    semester: cell_i64(row, i, "Sem")?,
                    email: cell_str(row, i, "Email")?,
                    percentage: cell_f64(row, i, "Percentage")?,
                    fees_paid,
                });
            }
            Ok(ParsedRows::Attendance(parsed))
        }
        ImportType::SubjectList => {
            let mut parsed = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                parsed.push(SubjectRow {
                    code: cell_str(row, i, "Subject Code")?,
                    name: cell_str(row, i, "Subject Name")?,
                    department: cell_str(row, i, "Dept")?,
                    semester: cell_i64(row, i, "Sem")?,
                    cost: cell_f64(row, i, "Cost")?,
                });
            }
            Ok(ParsedRows::Subjects(parsed))
        }
    }
}

/// Reconcile a batch of spreadsheet rows into the record store.
///
/// Rows are processed sequentially in input order. There is no transaction:
/// a database failure partway leaves earlier rows persisted, which callers
/// accept for this human-paced workload.
#[instrument(skip(pool, rows), fields(rows = rows.len()))]
pub async fn run_import(
    pool: &Pool<Sqlite>,
    import_type: ImportType,
    rows: &[ImportRow],
) -> Result<ImportSummary, AppError> {
    let parsed = parse_rows(import_type, rows)?;
    let mut summary = ImportSummary::default();

    match parsed {
        ParsedRows::Students(rows) => {
            info!("Processing student list");
            for row in rows {
                let existing =
                    find_student_by_reg_or_email(pool, &row.reg_number, &row.email).await?;
                match existing {
                    // Duplicate registration number or email: skip, never merge.
                    Some(_) => {
                        info!(reg_number = %row.reg_number, "Student already exists, skipping");
                        summary.skipped += 1;
                    }
                    _ => {
                        create_student(
                            pool,
                            &row.reg_number,
                            &row.name,
                            &row.email,
                            &row.department,
                            row.semester,
                        )
                        .await?;
                        summary.created += 1;
                    }
                }
            }
        }
        ParsedRows::Arrears(rows) => {
            info!("Processing arrear list");
            for row in rows {
                let touched = set_student_arrears(pool, &row.reg_number, &row.subjects).await?;
                if touched > 0 {
                    summary.updated += 1;
                } else {
                    info!(reg_number = %row.reg_number, "No student for arrear row, student untouched");
                }

                insert_arrear_record(
                    pool,
                    &row.reg_number,
                    &row.name,
                    &row.department,
                    row.semester,
                    &row.subjects,
                )
                .await?;
                summary.created += 1;
            }
        }
        ParsedRows::Attendance(rows) => {
            info!("Processing attendance and fee status");
            for row in rows {
                let touched =
                    set_student_standing(pool, &row.reg_number, row.percentage, row.fees_paid)
                        .await?;
                if touched > 0 {
                    summary.updated += 1;
                } else {
                    info!(reg_number = %row.reg_number, "Student not found, skipping update");
                }

                insert_attendance_record(
                    pool,
                    &row.reg_number,
                    &row.name,
                    &row.department,
                    row.semester,
                    &row.email,
                    row.percentage,
                    row.fees_paid,
                )
                .await?;
                summary.created += 1;
            }
        }
        ParsedRows::Subjects(rows) => {
            info!("Processing subject list");
            for row in rows {
                match find_subject_by_code(pool, &row.code).await? {
                    Some(_) => {
                        info!(code = %row.code, "Subject already exists, skipping");
                        summary.skipped += 1;
                    }
                    _ => {
                        create_subject(
                            pool,
                            &row.code,
                            &row.name,
                            &row.department,
                            row.semester,
                            row.cost,
                            None,
                        )
                        .await?;
                        summary.created += 1;
                    }
                }
            }
        }
    }

    Ok(summary)
}
