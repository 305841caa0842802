use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{AuthUser, DbAuthUser, DbUserSession, UserSession};
use crate::error::AppError;
use crate::models::{
    ArrearRecord, AttendanceRecord, DbArrearRecord, DbAttendanceRecord, DbExam, DbStudent,
    DbSubject, DbUploadedFile, Exam, Student, Subject, UploadedFile,
};

const STUDENT_COLUMNS: &str =
    "id, reg_number, name, email, department, semester, attendance, fees_paid, arrears";
const SUBJECT_COLUMNS: &str = "id, code, name, department, semester, cost, exam_schedule";

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("JSON encoding error: {}", e)))
}

fn in_placeholders(len: usize) -> String {
    vec!["?"; len].join(", ")
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &Pool<Sqlite>, id: i64) -> Result<Student, AppError> {
    info!("Fetching student by ID");
    let row = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {} FROM students WHERE id = ?",
        STUDENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(student) => Ok(Student::from(student)),
        _ => Err(AppError::NotFound(format!(
            "Student with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_student_by_reg(
    pool: &Pool<Sqlite>,
    reg_number: &str,
) -> Result<Option<Student>, AppError> {
    let row = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {} FROM students WHERE reg_number = ?",
        STUDENT_COLUMNS
    ))
    .bind(reg_number)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

#[instrument(skip(pool))]
pub async fn find_student_by_reg_or_email(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    email: &str,
) -> Result<Option<Student>, AppError> {
    let row = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {} FROM students WHERE reg_number = ? OR email = ?",
        STUDENT_COLUMNS
    ))
    .bind(reg_number)
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Student::from))
}

#[instrument(skip(pool))]
pub async fn create_student(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    name: &str,
    email: &str,
    department: &str,
    semester: i64,
) -> Result<i64, AppError> {
    info!("Creating student");
    let res = sqlx::query(
        "INSERT INTO students (reg_number, name, email, department, semester, attendance, fees_paid, arrears)
         VALUES (?, ?, ?, ?, ?, 0, FALSE, '[]')",
    )
    .bind(reg_number)
    .bind(name)
    .bind(email)
    .bind(department)
    .bind(semester)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_students(pool: &Pool<Sqlite>) -> Result<Vec<Student>, AppError> {
    info!("Listing students");
    let rows = sqlx::query_as::<_, DbStudent>(&format!(
        "SELECT {} FROM students ORDER BY reg_number",
        STUDENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Student::from).collect())
}

/// Field replacement of the student's arrear list, keyed by registration
/// number. A no-op (0 rows) when the student does not exist.
#[instrument(skip(pool, arrears))]
pub async fn set_student_arrears(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    arrears: &[String],
) -> Result<u64, AppError> {
    let encoded = to_json(&arrears)?;
    let res = sqlx::query("UPDATE students SET arrears = ? WHERE reg_number = ?")
        .bind(encoded)
        .bind(reg_number)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

/// Attendance/fee update keyed by registration number, used by imports.
/// A no-op (0 rows) when the student does not exist.
#[instrument(skip(pool))]
pub async fn set_student_standing(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    attendance: f64,
    fees_paid: bool,
) -> Result<u64, AppError> {
    let res = sqlx::query("UPDATE students SET attendance = ?, fees_paid = ? WHERE reg_number = ?")
        .bind(attendance)
        .bind(fees_paid)
        .bind(reg_number)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn update_student_standing_by_id(
    pool: &Pool<Sqlite>,
    student_id: i64,
    attendance: f64,
    fees_paid: bool,
) -> Result<Student, AppError> {
    info!("Admin updating student standing");
    let res = sqlx::query("UPDATE students SET attendance = ?, fees_paid = ? WHERE id = ?")
        .bind(attendance)
        .bind(fees_paid)
        .bind(student_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Student with id {} not found",
            student_id
        )));
    }

    get_student(pool, student_id).await
}

#[instrument(skip(pool))]
pub async fn find_subject_by_code(
    pool: &Pool<Sqlite>,
    code: &str,
) -> Result<Option<Subject>, AppError> {
    let row = sqlx::query_as::<_, DbSubject>(&format!(
        "SELECT {} FROM subjects WHERE code = ?",
        SUBJECT_COLUMNS
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Subject::from))
}

#[instrument(skip(pool))]
pub async fn create_subject(
    pool: &Pool<Sqlite>,
    code: &str,
    name: &str,
    department: &str,
    semester: i64,
    cost: f64,
    exam_schedule: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating subject");
    let res = sqlx::query(
        "INSERT INTO subjects (code, name, department, semester, cost, exam_schedule)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(code)
    .bind(name)
    .bind(department)
    .bind(semester)
    .bind(cost)
    .bind(exam_schedule)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_subjects(pool: &Pool<Sqlite>) -> Result<Vec<Subject>, AppError> {
    let rows = sqlx::query_as::<_, DbSubject>(&format!(
        "SELECT {} FROM subjects ORDER BY code",
        SUBJECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Subject::from).collect())
}

/// Catalog subjects scheduled for a department/semester pair.
#[instrument(skip(pool))]
pub async fn subjects_for_class(
    pool: &Pool<Sqlite>,
    department: &str,
    semester: i64,
) -> Result<Vec<Subject>, AppError> {
    let rows = sqlx::query_as::<_, DbSubject>(&format!(
        "SELECT {} FROM subjects WHERE department = ? AND semester = ? ORDER BY code",
        SUBJECT_COLUMNS
    ))
    .bind(department)
    .bind(semester)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Subject::from).collect())
}

async fn subjects_in(
    pool: &Pool<Sqlite>,
    column: &str,
    values: &[String],
) -> Result<Vec<Subject>, AppError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM subjects WHERE {} IN ({}) ORDER BY code",
        SUBJECT_COLUMNS,
        column,
        in_placeholders(values.len())
    );

    let mut query = sqlx::query_as::<_, DbSubject>(&sql);
    for value in values {
        query = query.bind(value);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(Subject::from).collect())
}

#[instrument(skip(pool, codes))]
pub async fn subjects_by_codes(
    pool: &Pool<Sqlite>,
    codes: &[String],
) -> Result<Vec<Subject>, AppError> {
    subjects_in(pool, "code", codes).await
}

#[instrument(skip(pool, names))]
pub async fn subjects_by_names(
    pool: &Pool<Sqlite>,
    names: &[String],
) -> Result<Vec<Subject>, AppError> {
    subjects_in(pool, "name", names).await
}

#[instrument(skip(pool, ids))]
pub async fn subjects_by_ids(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<Vec<Subject>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM subjects WHERE id IN ({}) ORDER BY code",
        SUBJECT_COLUMNS,
        in_placeholders(ids.len())
    );

    let mut query = sqlx::query_as::<_, DbSubject>(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(Subject::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_exam_schedule(
    pool: &Pool<Sqlite>,
    subject_id: i64,
    exam_schedule: &str,
) -> Result<Subject, AppError> {
    info!("Updating exam schedule");
    let res = sqlx::query("UPDATE subjects SET exam_schedule = ? WHERE id = ?")
        .bind(exam_schedule)
        .bind(subject_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Subject with id {} not found",
            subject_id
        )));
    }

    let row = sqlx::query_as::<_, DbSubject>(&format!(
        "SELECT {} FROM subjects WHERE id = ?",
        SUBJECT_COLUMNS
    ))
    .bind(subject_id)
    .fetch_one(pool)
    .await?;

    Ok(Subject::from(row))
}

/// Always inserts a fresh audit row; re-imports for the same registration
/// number intentionally accumulate duplicates.
#[instrument(skip(pool, subjects))]
pub async fn insert_arrear_record(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    name: &str,
    department: &str,
    semester: i64,
    subjects: &[String],
) -> Result<i64, AppError> {
    let encoded = to_json(&subjects)?;
    let res = sqlx::query(
        "INSERT INTO arrears (reg_number, name, department, semester, subjects)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(reg_number)
    .bind(name)
    .bind(department)
    .bind(semester)
    .bind(encoded)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn find_arrear_by_reg(
    pool: &Pool<Sqlite>,
    reg_number: &str,
) -> Result<Option<ArrearRecord>, AppError> {
    let row = sqlx::query_as::<_, DbArrearRecord>(
        "SELECT id, reg_number, name, department, semester, subjects
         FROM arrears WHERE reg_number = ? ORDER BY id LIMIT 1",
    )
    .bind(reg_number)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ArrearRecord::from))
}

#[instrument(skip(pool))]
pub async fn list_arrears_for_reg(
    pool: &Pool<Sqlite>,
    reg_number: &str,
) -> Result<Vec<ArrearRecord>, AppError> {
    let rows = sqlx::query_as::<_, DbArrearRecord>(
        "SELECT id, reg_number, name, department, semester, subjects
         FROM arrears WHERE reg_number = ? ORDER BY id",
    )
    .bind(reg_number)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ArrearRecord::from).collect())
}

#[instrument(skip(pool))]
pub async fn insert_attendance_record(
    pool: &Pool<Sqlite>,
    reg_number: &str,
    name: &str,
    department: &str,
    semester: i64,
    email: &str,
    percentage: f64,
    fees_paid: bool,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO attendance_records (reg_number, name, department, semester, email, percentage, fees_paid)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(reg_number)
    .bind(name)
    .bind(department)
    .bind(semester)
    .bind(email)
    .bind(percentage)
    .bind(fees_paid)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_attendance_for_reg(
    pool: &Pool<Sqlite>,
    reg_number: &str,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let rows = sqlx::query_as::<_, DbAttendanceRecord>(
        "SELECT id, reg_number, name, department, semester, email, percentage, fees_paid, recorded_at
         FROM attendance_records WHERE reg_number = ? ORDER BY id",
    )
    .bind(reg_number)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AttendanceRecord::from).collect())
}

/// Create-or-overwrite the student's registration. Overwrites the chosen
/// subject list and resets `hall_ticket_generated` on every call.
#[instrument(skip(pool, subject_ids))]
pub async fn upsert_exam(
    pool: &Pool<Sqlite>,
    student_id: i64,
    subject_ids: &[i64],
) -> Result<Exam, AppError> {
    info!("Upserting exam registration");
    let encoded = to_json(&subject_ids)?;
    sqlx::query(
        "INSERT INTO exams (student_id, subjects, hall_ticket_generated)
         VALUES (?, ?, FALSE)
         ON CONFLICT(student_id) DO UPDATE
         SET subjects = excluded.subjects, hall_ticket_generated = FALSE",
    )
    .bind(student_id)
    .bind(encoded)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbExam>(
        "SELECT id, student_id, subjects, hall_ticket_generated FROM exams WHERE student_id = ?",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(Exam::from(row))
}

#[instrument(skip(pool))]
pub async fn find_exam_by_student(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Option<Exam>, AppError> {
    let row = sqlx::query_as::<_, DbExam>(
        "SELECT id, student_id, subjects, hall_ticket_generated FROM exams WHERE student_id = ?",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Exam::from))
}

#[instrument(skip(pool))]
pub async fn create_uploaded_file(
    pool: &Pool<Sqlite>,
    file_name: &str,
    file_type: &str,
) -> Result<i64, AppError> {
    info!("Recording uploaded file");
    let res = sqlx::query("INSERT INTO uploaded_files (file_name, file_type) VALUES (?, ?)")
        .bind(file_name)
        .bind(file_type)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_uploaded_files(pool: &Pool<Sqlite>) -> Result<Vec<UploadedFile>, AppError> {
    let rows = sqlx::query_as::<_, DbUploadedFile>(
        "SELECT id, file_name, file_type, uploaded_at FROM uploaded_files ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UploadedFile::from).collect())
}

#[instrument(skip(pool))]
pub async fn delete_uploaded_file(pool: &Pool<Sqlite>, file_id: i64) -> Result<u64, AppError> {
    info!("Deleting uploaded file record");
    let res = sqlx::query("DELETE FROM uploaded_files WHERE id = ?")
        .bind(file_id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool, password))]
pub async fn create_admin(
    pool: &Pool<Sqlite>,
    name: &str,
    email: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating admin account");

    let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "Account with email '{}' already exists",
            email
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query("INSERT INTO users (name, email, password, role) VALUES (?, ?, ?, 'admin')")
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(email))]
pub async fn authenticate_admin(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<AuthUser>, AppError> {
    info!("Authenticating admin");
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE email = ? AND role = 'admin'")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    match row {
        Some((id, stored_hash)) => match bcrypt::verify(password, &stored_hash) {
            Ok(true) => Ok(Some(get_auth_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Students authenticate by registration number alone; the backing auth
/// account is created on first login and keyed to the student row. An
/// email already owned by a different account is rejected so this path
/// can never hand out someone else's session.
#[instrument(skip(pool))]
pub async fn ensure_student_user(
    pool: &Pool<Sqlite>,
    student: &Student,
) -> Result<AuthUser, AppError> {
    let linked = sqlx::query_as::<_, DbAuthUser>(
        "SELECT id, name, email, role, student_id FROM users
         WHERE role = 'student' AND student_id = ?",
    )
    .bind(student.id)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = linked {
        return Ok(AuthUser::from(user));
    }

    let email_taken = sqlx::query("SELECT id FROM users WHERE email = ?")
        .bind(&student.email)
        .fetch_optional(pool)
        .await?;

    if email_taken.is_some() {
        return Err(AppError::Authentication(format!(
            "Email '{}' is already registered to another account",
            student.email
        )));
    }

    let res = sqlx::query(
        "INSERT INTO users (name, email, password, role, student_id)
         VALUES (?, ?, '', 'student', ?)",
    )
    .bind(&student.name)
    .bind(&student.email)
    .bind(student.id)
    .execute(pool)
    .await?;

    get_auth_user(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_auth_user(pool: &Pool<Sqlite>, id: i64) -> Result<AuthUser, AppError> {
    let row = sqlx::query_as::<_, DbAuthUser>(
        "SELECT id, name, email, role, student_id FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(AuthUser::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
