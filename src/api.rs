use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{AuthUser, Permission, UserSession};
use crate::db::{
    authenticate_admin, create_admin, create_subject, create_uploaded_file, create_user_session,
    delete_uploaded_file, ensure_student_user, find_exam_by_student, find_student_by_reg,
    find_subject_by_code, get_student, invalidate_session, list_students, list_subjects,
    list_uploaded_files, update_exam_schedule, update_student_standing_by_id, upsert_exam,
};
use crate::eligibility::{
    SubjectEntry, check_eligibility, email_subjects, hall_ticket_subjects, student_view_subjects,
};
use crate::error::AppError;
use crate::import::{ImportRow, ImportSummary, ImportType, run_import};
use crate::mail::{HALL_TICKET_SUBJECT, Mailer, format_hall_ticket};
use crate::models::{Exam, Student, Subject, UploadedFile};

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_id: Option<i64>,
}

impl From<AuthUser> for UserData {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.to_string(),
            student_id: user.student_id,
        }
    }
}

async fn open_session(
    db: &Pool<Sqlite>,
    cookies: &CookieJar<'_>,
    user: &AuthUser,
) -> Result<(), AppError> {
    let token = UserSession::generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(1);

    create_user_session(db, user.id, &token, expires_at.naive_utc()).await?;

    let cookie = Cookie::build(("session_token", token))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(1));
    cookies.add_private(cookie);

    cookies.add_private(
        Cookie::build(("user_id", user.id.to_string()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(1)),
    );

    cookies.add_private(
        Cookie::build(("user_role", user.role.to_string()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(1)),
    );

    Ok(())
}

#[derive(Deserialize, Validate)]
pub struct StudentLoginRequest {
    #[validate(length(min = 1, message = "Registration number is required"))]
    reg_number: String,
}

#[derive(Serialize)]
pub struct StudentLoginResponse {
    pub success: bool,
    pub student: Option<Student>,
    pub error: Option<String>,
}

#[post("/students/login", data = "<login>")]
pub async fn api_student_login(
    login: Json<StudentLoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentLoginResponse>, AppError> {
    login.validate()?;

    match find_student_by_reg(db, &login.reg_number).await? {
        Some(student) => {
            let user = ensure_student_user(db, &student).await?;
            open_session(db, cookies, &user).await?;

            Ok(Json(StudentLoginResponse {
                success: true,
                student: Some(student),
                error: None,
            }))
        }
        None => Ok(Json(StudentLoginResponse {
            success: false,
            student: None,
            error: Some("Student not found. Check your registration number".to_string()),
        })),
    }
}

#[derive(Deserialize, Validate)]
pub struct AdminRegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    name: String,
    #[validate(email(message = "A valid email address is required"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

#[post("/admin/register", data = "<registration>")]
pub async fn api_admin_register(
    registration: Json<AdminRegisterRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    registration.validate()?;

    create_admin(db, &registration.name, &registration.email, &registration.password).await?;

    Ok(Status::Created)
}

#[derive(Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[post("/admin/login", data = "<login>")]
pub async fn api_admin_login(
    login: Json<AdminLoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, AppError> {
    login.validate()?;

    match authenticate_admin(db, &login.email, &login.password).await? {
        Some(user) => {
            open_session(db, cookies, &user).await?;

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(Cookie::build("session_token"));
    cookies.remove_private(Cookie::build("user_id"));
    cookies.remove_private(Cookie::build("user_role"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: AuthUser) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[derive(Deserialize)]
pub struct ImportRequest {
    pub import_type: ImportType,
    pub rows: Vec<ImportRow>,
    /// Recorded upload backing this batch; removed once processing succeeds.
    pub file_id: Option<i64>,
}

#[derive(Serialize, Deserialize)]
pub struct ImportResponse {
    pub message: String,
    pub summary: ImportSummary,
}

#[post("/admin/import", data = "<request>")]
pub async fn api_import(
    request: Json<ImportRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ImportResponse>, AppError> {
    user.require_permission(Permission::ImportRecords)?;

    let summary = run_import(db, request.import_type, &request.rows).await?;

    if let Some(file_id) = request.file_id {
        delete_uploaded_file(db, file_id).await?;
    }

    Ok(Json(ImportResponse {
        message: "File processed successfully".to_string(),
        summary,
    }))
}

#[derive(Deserialize, Validate)]
pub struct RecordUploadRequest {
    #[validate(length(min = 1, message = "File name is required"))]
    file_name: String,
    #[validate(length(min = 1, message = "File type is required"))]
    file_type: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecordUploadResponse {
    pub id: i64,
}

#[post("/admin/uploads", data = "<request>")]
pub async fn api_record_upload(
    request: Json<RecordUploadRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RecordUploadResponse>, AppError> {
    user.require_permission(Permission::ImportRecords)?;
    request.validate()?;

    let id = create_uploaded_file(db, &request.file_name, &request.file_type).await?;

    Ok(Json(RecordUploadResponse { id }))
}

#[get("/admin/uploads")]
pub async fn api_list_uploads(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UploadedFile>>, AppError> {
    user.require_permission(Permission::ViewUploads)?;

    let files = list_uploaded_files(db).await?;
    Ok(Json(files))
}

#[derive(Serialize, Deserialize)]
pub struct StudentViewResponse {
    pub id: i64,
    pub reg_number: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub semester: i64,
    pub attendance: f64,
    pub fees_paid: bool,
    pub arrears: Vec<String>,
    pub subjects: Vec<SubjectEntry>,
    pub registered_subjects: Vec<i64>,
}

#[get("/students/<id>")]
pub async fn api_get_student_view(
    id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentViewResponse>, AppError> {
    user.require_student_access(id)?;

    let student = get_student(db, id).await?;
    let subjects = student_view_subjects(db, &student).await?;
    let registered_subjects = find_exam_by_student(db, id)
        .await?
        .map(|exam| exam.subjects)
        .unwrap_or_default();

    Ok(Json(StudentViewResponse {
        id: student.id,
        reg_number: student.reg_number,
        name: student.name,
        email: student.email,
        department: student.department,
        semester: student.semester,
        attendance: student.attendance,
        fees_paid: student.fees_paid,
        arrears: student.arrears,
        subjects,
        registered_subjects,
    }))
}

#[derive(Deserialize)]
pub struct ExamRegistrationRequest {
    pub student_id: i64,
    pub subject_ids: Vec<i64>,
}

#[derive(Serialize)]
pub struct ExamRegistrationResponse {
    pub message: String,
    pub exam: Exam,
}

#[post("/exams", data = "<request>")]
pub async fn api_register_exam(
    request: Json<ExamRegistrationRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ExamRegistrationResponse>, AppError> {
    user.require_permission(Permission::RegisterForExams)?;
    user.require_student_access(request.student_id)?;

    let student = get_student(db, request.student_id).await?;

    check_eligibility(&student).map_err(AppError::Ineligible)?;

    let exam = upsert_exam(db, request.student_id, &request.subject_ids).await?;

    Ok(Json(ExamRegistrationResponse {
        message: "Exam registered successfully".to_string(),
        exam,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct RegistrationStatusResponse {
    pub student_name: String,
    pub attendance: f64,
    pub fees_paid: bool,
    pub subjects: Vec<i64>,
    pub hall_ticket_generated: bool,
}

#[get("/exams/<student_id>")]
pub async fn api_get_registration_status(
    student_id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RegistrationStatusResponse>, AppError> {
    user.require_student_access(student_id)?;

    let student = get_student(db, student_id).await?;

    let exam = find_exam_by_student(db, student_id).await?.ok_or_else(|| {
        AppError::NotFound("No registered exams found for this student".to_string())
    })?;

    Ok(Json(RegistrationStatusResponse {
        student_name: student.name,
        attendance: student.attendance,
        fees_paid: student.fees_paid,
        subjects: exam.subjects,
        hall_ticket_generated: exam.hall_ticket_generated,
    }))
}

#[derive(Serialize, Deserialize)]
pub struct HallTicketResponse {
    pub student_name: String,
    pub attendance: f64,
    pub fees_paid: bool,
    pub subjects: Vec<SubjectEntry>,
}

#[get("/hallticket/<student_id>")]
pub async fn api_get_hall_ticket(
    student_id: i64,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<HallTicketResponse>, AppError> {
    user.require_permission(Permission::RequestHallTicket)?;
    user.require_student_access(student_id)?;

    let student = get_student(db, student_id).await?;

    check_eligibility(&student).map_err(AppError::Ineligible)?;

    let subjects = hall_ticket_subjects(db, &student).await?;

    Ok(Json(HallTicketResponse {
        student_name: student.name,
        attendance: student.attendance,
        fees_paid: student.fees_paid,
        subjects,
    }))
}

#[derive(Deserialize)]
pub struct SendHallTicketRequest {
    pub student_id: i64,
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[post("/hallticket/email", data = "<request>")]
pub async fn api_send_hall_ticket(
    request: Json<SendHallTicketRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
    mailer: &State<Box<dyn Mailer>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::RequestHallTicket)?;
    user.require_student_access(request.student_id)?;

    let student = get_student(db, request.student_id).await?;

    check_eligibility(&student).map_err(AppError::Ineligible)?;

    let exam = find_exam_by_student(db, request.student_id).await?;
    let subjects = email_subjects(db, &student, exam.as_ref()).await?;

    let body = format_hall_ticket(&student, &subjects);
    mailer.send(&student.email, HALL_TICKET_SUBJECT, &body).await?;

    Ok(Json(MessageResponse {
        message: "Hall ticket sent successfully".to_string(),
    }))
}

#[derive(Deserialize, Validate)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, message = "Subject code is required"))]
    code: String,
    #[validate(length(min = 1, message = "Subject name is required"))]
    name: String,
    #[validate(length(min = 1, message = "Department is required"))]
    department: String,
    semester: i64,
    cost: f64,
    exam_schedule: Option<String>,
}

#[post("/admin/subjects", data = "<request>")]
pub async fn api_create_subject(
    request: Json<CreateSubjectRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    user.require_permission(Permission::ManageSubjects)?;
    request.validate()?;

    if find_subject_by_code(db, &request.code).await?.is_some() {
        return Err(AppError::Validation(format!(
            "Subject code '{}' already exists",
            request.code
        )));
    }

    create_subject(
        db,
        &request.code,
        &request.name,
        &request.department,
        request.semester,
        request.cost,
        request.exam_schedule.as_deref(),
    )
    .await?;

    Ok(Status::Created)
}

#[get("/admin/subjects")]
pub async fn api_list_subjects(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Subject>>, AppError> {
    user.require_permission(Permission::ManageSubjects)?;

    let subjects = list_subjects(db).await?;
    Ok(Json(subjects))
}

#[derive(Deserialize, Validate)]
pub struct UpdateExamScheduleRequest {
    #[validate(length(min = 1, message = "Exam schedule is required"))]
    exam_schedule: String,
}

#[patch("/admin/subjects/<id>", data = "<request>")]
pub async fn api_update_exam_schedule(
    id: i64,
    request: Json<UpdateExamScheduleRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Subject>, AppError> {
    user.require_permission(Permission::ManageSubjects)?;
    request.validate()?;

    let subject = update_exam_schedule(db, id, &request.exam_schedule).await?;

    Ok(Json(subject))
}

#[get("/admin/students")]
pub async fn api_list_students(
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Student>>, AppError> {
    user.require_permission(Permission::ManageStudents)?;

    let students = list_students(db).await?;
    Ok(Json(students))
}

#[derive(Deserialize)]
pub struct PatchStudentRequest {
    pub attendance: f64,
    pub fees_paid: bool,
}

#[patch("/admin/students/<id>", data = "<request>")]
pub async fn api_patch_student(
    id: i64,
    request: Json<PatchStudentRequest>,
    user: AuthUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Student>, AppError> {
    user.require_permission(Permission::ManageStudents)?;

    let student =
        update_student_standing_by_id(db, id, request.attendance, request.fees_paid).await?;

    Ok(Json(student))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
