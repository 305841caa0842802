#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod eligibility;
mod env;
mod error;
mod import;
mod mail;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_admin_login, api_admin_register, api_create_subject, api_get_hall_ticket,
    api_get_registration_status, api_get_student_view, api_import, api_list_students,
    api_list_subjects, api_list_uploads, api_logout, api_me, api_me_unauthorized,
    api_patch_student, api_record_upload, api_register_exam, api_send_hall_ticket,
    api_student_login, api_update_exam_schedule, health,
};
use auth::unauthorized_api;
use db::clean_expired_sessions;
use mail::{Mailer, SmtpMailer};
use rocket::{Build, Rocket, tokio};
use telemetry::{TelemetryFairing, init_tracing};

use sqlx::SqlitePool;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    init_tracing();

    if let Err(e) = env::load_environment() {
        error!("Failed to load environment files: {}", e);
    }

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    let mailer = SmtpMailer::from_env().expect("Failed to configure SMTP mailer");

    init_rocket(pool, Box::new(mailer)).await
}

pub async fn init_rocket(pool: SqlitePool, mailer: Box<dyn Mailer>) -> Rocket<Build> {
    info!("Starting hall ticket service");

    rocket::build()
        .manage(pool)
        .manage(mailer)
        .mount(
            "/api",
            routes![
                api_student_login,
                api_admin_register,
                api_admin_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_import,
                api_record_upload,
                api_list_uploads,
                api_get_student_view,
                api_register_exam,
                api_get_registration_status,
                api_get_hall_ticket,
                api_send_hall_ticket,
                api_create_subject,
                api_list_subjects,
                api_update_exam_schedule,
                api_list_students,
                api_patch_student,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
