use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use crate::eligibility::SubjectEntry;
use crate::error::AppError;
use crate::models::Student;

/// Outbound mail seam. The production implementation speaks SMTP; tests
/// substitute a recording fake through the same managed-state slot.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_env() -> Result<Self, AppError> {
        let host = require_env("SMTP_HOST")?;
        let username = require_env("SMTP_USERNAME")?;
        let password = require_env("SMTP_PASSWORD")?;
        let from = require_env("MAIL_FROM")?
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid MAIL_FROM address: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .map_err(|e| AppError::Internal(format!("SMTP transport error: {}", e)))?
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self { transport, from })
    }
}

fn require_env(key: &str) -> Result<String, AppError> {
    std::env::var(key)
        .map_err(|_| AppError::Internal(format!("{} environment variable not set", key)))
}

#[rocket::async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, body))]
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::Mail(format!("Invalid recipient address '{}': {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| AppError::Mail(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;

        info!("Hall ticket email sent");
        Ok(())
    }
}

pub const HALL_TICKET_SUBJECT: &str = "Your Hall Ticket";

/// Plain-text hall ticket body: one line per subject with its kind tag and
/// exam schedule, then attendance and fee status.
pub fn format_hall_ticket(student: &Student, entries: &[SubjectEntry]) -> String {
    let subject_lines = entries
        .iter()
        .map(|entry| {
            format!(
                "- {} ({}) [{}] - {}",
                entry.name, entry.code, entry.kind, entry.exam_schedule
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Hello {},\n\n\
         Your hall ticket is ready for download.\n\n\
         Subjects to write:\n{}\n\n\
         Attendance: {}%\n\
         Fees paid: {}\n\n\
         Best of luck!\n\
         Exam Department\n",
        student.name,
        subject_lines,
        student.attendance,
        if student.fees_paid { "Yes" } else { "No" }
    )
}
