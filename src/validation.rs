use serde::Serialize;
use std::collections::HashMap;

use crate::error::AppError;

#[derive(Debug, Serialize, Clone)]
pub struct ValidationResponse {
    pub status: &'static str,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error",
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

impl From<&AppError> for ValidationResponse {
    fn from(error: &AppError) -> Self {
        let (field, message) = match error {
            AppError::Database(db_err) => ("database", format!("Database error: {}", db_err)),
            AppError::Authentication(msg) => {
                ("authentication", format!("Authentication error: {}", msg))
            }
            AppError::Authorization(msg) => {
                ("authorization", format!("Permission denied: {}", msg))
            }
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Validation(msg) => ("validation", msg.clone()),
            AppError::Ineligible(reason) => ("eligibility", reason.to_string()),
            AppError::Mail(msg) => ("mail", format!("Mail delivery failed: {}", msg)),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        ValidationResponse::with_error(field, &message)
    }
}
