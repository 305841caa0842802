use crate::db::{
    create_admin, create_student, create_subject, insert_arrear_record, set_student_arrears,
    set_student_standing,
};
use crate::error::AppError;
use crate::init_rocket;
use crate::mail::test_mailer::RecordingMailer;
use rocket::http::ContentType;
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Once;
use tracing::log::LevelFilter;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

#[derive(Default)]
pub struct TestDbBuilder {
    students: Vec<TestStudent>,
    subjects: Vec<TestSubject>,
    arrears: Vec<TestArrear>,
    admins: Vec<TestAdmin>,
}

pub struct TestStudent {
    pub reg_number: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub semester: i64,
    pub attendance: f64,
    pub fees_paid: bool,
}

pub struct TestSubject {
    pub code: String,
    pub name: String,
    pub department: String,
    pub semester: i64,
    pub cost: f64,
    pub exam_schedule: Option<String>,
}

pub struct TestArrear {
    pub reg_number: String,
    pub name: String,
    pub department: String,
    pub semester: i64,
    pub subjects: Vec<String>,
}

pub struct TestAdmin {
    pub name: String,
    pub email: String,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(self, reg_number: &str, name: &str, email: &str, dept: &str, sem: i64) -> Self {
        self.student_with_standing(reg_number, name, email, dept, sem, 0.0, false)
    }

    pub fn student_with_standing(
        mut self,
        reg_number: &str,
        name: &str,
        email: &str,
        dept: &str,
        sem: i64,
        attendance: f64,
        fees_paid: bool,
    ) -> Self {
        self.students.push(TestStudent {
            reg_number: reg_number.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            department: dept.to_string(),
            semester: sem,
            attendance,
            fees_paid,
        });
        self
    }

    pub fn subject(self, code: &str, name: &str, dept: &str, sem: i64, cost: f64) -> Self {
        self.subject_with_schedule(code, name, dept, sem, cost, None)
    }

    pub fn subject_with_schedule(
        mut self,
        code: &str,
        name: &str,
        dept: &str,
        sem: i64,
        cost: f64,
        exam_schedule: Option<&str>,
    ) -> Self {
        self.subjects.push(TestSubject {
            code: code.to_string(),
            name: name.to_string(),
            department: dept.to_string(),
            semester: sem,
            cost,
            exam_schedule: exam_schedule.map(String::from),
        });
        self
    }

    pub fn arrear(
        mut self,
        reg_number: &str,
        name: &str,
        dept: &str,
        sem: i64,
        subjects: &[&str],
    ) -> Self {
        self.arrears.push(TestArrear {
            reg_number: reg_number.to_string(),
            name: name.to_string(),
            department: dept.to_string(),
            semester: sem,
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn admin(mut self, name: &str, email: &str) -> Self {
        self.admins.push(TestAdmin {
            name: name.to_string(),
            email: email.to_string(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .filter_level(LevelFilter::Debug)
                .is_test(true)
                .try_init();
        });

        let pool = SqlitePool::connect("sqlite::memory:").await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut student_id_map: HashMap<String, i64> = HashMap::new();
        let mut subject_id_map: HashMap<String, i64> = HashMap::new();

        for student in &self.students {
            let id = create_student(
                &pool,
                &student.reg_number,
                &student.name,
                &student.email,
                &student.department,
                student.semester,
            )
            .await?;

            if student.attendance != 0.0 || student.fees_paid {
                set_student_standing(
                    &pool,
                    &student.reg_number,
                    student.attendance,
                    student.fees_paid,
                )
                .await?;
            }

            student_id_map.insert(student.reg_number.clone(), id);
        }

        for subject in &self.subjects {
            let id = create_subject(
                &pool,
                &subject.code,
                &subject.name,
                &subject.department,
                subject.semester,
                subject.cost,
                subject.exam_schedule.as_deref(),
            )
            .await?;

            subject_id_map.insert(subject.code.clone(), id);
        }

        for arrear in &self.arrears {
            // Mirror the import: the student row is updated in place and an
            // audit row is appended.
            set_student_arrears(&pool, &arrear.reg_number, &arrear.subjects).await?;
            insert_arrear_record(
                &pool,
                &arrear.reg_number,
                &arrear.name,
                &arrear.department,
                arrear.semester,
                &arrear.subjects,
            )
            .await?;
        }

        for admin in &self.admins {
            create_admin(&pool, &admin.name, &admin.email, STANDARD_PASSWORD).await?;
        }

        Ok(TestDb {
            pool,
            student_id_map,
            subject_id_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub student_id_map: HashMap<String, i64>,
    pub subject_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn student_id(&self, reg_number: &str) -> Option<i64> {
        self.student_id_map.get(reg_number).copied()
    }

    pub fn subject_id(&self, code: &str) -> Option<i64> {
        self.subject_id_map.get(code).copied()
    }
}

/// Standard fixture: one admin, two CS semester-3 students (one eligible,
/// one with low attendance), a small catalog and an arrear for the
/// eligible student.
pub fn standard_test_db() -> TestDbBuilder {
    TestDbBuilder::new()
        .admin("Exam Admin", "admin@example.edu")
        .student_with_standing("R1", "Asha", "asha@example.edu", "CS", 3, 85.0, true)
        .student_with_standing("R2", "Vikram", "vikram@example.edu", "CS", 3, 60.0, true)
        .student_with_standing("R3", "Meena", "meena@example.edu", "CS", 3, 90.0, false)
        .subject_with_schedule("CS301", "Algorithms", "CS", 3, 1500.0, Some("2026-04-10 09:00"))
        .subject("CS302", "Operating Systems", "CS", 3, 1500.0)
        .subject("MA201", "Mathematics II", "CS", 2, 1200.0)
        .arrear("R1", "Asha", "CS", 3, &["MA201"])
}

pub async fn setup_test_client(test_db: &TestDb) -> (Client, RecordingMailer) {
    let mailer = RecordingMailer::default();
    let client = setup_test_client_with_mailer(test_db, mailer.clone()).await;
    (client, mailer)
}

pub async fn setup_test_client_with_mailer(test_db: &TestDb, mailer: RecordingMailer) -> Client {
    let rocket = init_rocket(test_db.pool.clone(), Box::new(mailer)).await;

    Client::tracked(rocket)
        .await
        .expect("Failed to build test client")
}

/// Logs the admin in; the tracked client carries the session cookie into
/// subsequent requests.
pub async fn login_admin(client: &Client, email: &str) {
    let response = client
        .post("/api/admin/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "email": email,
                "password": STANDARD_PASSWORD
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), rocket::http::Status::Ok);
}

pub async fn login_student(client: &Client, reg_number: &str) {
    let response = client
        .post("/api/students/login")
        .header(ContentType::JSON)
        .body(json!({ "reg_number": reg_number }).to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), rocket::http::Status::Ok);
}
