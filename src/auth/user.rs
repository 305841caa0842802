use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Link to the `students` row for accounts created by student login.
    pub student_id: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAuthUser {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub student_id: Option<i64>,
}

impl From<DbAuthUser> for AuthUser {
    fn from(user: DbAuthUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            role: Role::from_str(&user.role.unwrap_or_default()).unwrap_or(Role::Student),
            student_id: user.student_id,
        }
    }
}

impl AuthUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "{:?} permission required",
                permission
            )))
        }
    }

    /// Students may only read/act on their own student record; admins on any.
    pub fn require_student_access(&self, student_id: i64) -> Result<(), AppError> {
        if self.role == Role::Admin || self.student_id == Some(student_id) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                student_id = %student_id,
                "Cross-student access denied"
            );
            Err(AppError::Authorization(
                "You may only access your own record".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session.created_at.unwrap_or_else(|| Utc::now().naive_utc()),
            expires_at: session.expires_at.unwrap_or_else(|| Utc::now().naive_utc()),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}
