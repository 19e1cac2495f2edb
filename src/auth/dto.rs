use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{auth::repo_types::User, error::AppError};

const MAX_USERNAME: usize = 80;
const MAX_EMAIL: usize = 120;
const MIN_PASSWORD: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation(format!("{field} is required")))
}

fn parse_username(raw: Option<String>) -> Result<String, AppError> {
    let username = required(raw, "username")?;
    if username.chars().count() > MAX_USERNAME {
        return Err(AppError::validation("Username too long"));
    }
    Ok(username)
}

fn parse_email(raw: Option<String>) -> Result<String, AppError> {
    let email = required(raw, "email")?.to_lowercase();
    if email.len() > MAX_EMAIL || !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }
    Ok(email)
}

/// Request body for `/signup` and `/register`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub is_artisan: bool,
}

#[derive(Debug)]
pub struct SignupInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_artisan: bool,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<SignupInput, AppError> {
        let username = parse_username(self.username)?;
        let email = parse_email(self.email)?;
        let password = self
            .password
            .ok_or_else(|| AppError::validation("password is required"))?;
        if password.chars().count() < MIN_PASSWORD {
            return Err(AppError::validation("Password too short"));
        }
        Ok(SignupInput {
            username,
            email,
            password,
            is_artisan: self.is_artisan,
        })
    }
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(self) -> Result<LoginInput, AppError> {
        Ok(LoginInput {
            email: parse_email(self.email)?,
            password: self
                .password
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::validation("password is required"))?,
        })
    }
}

/// Partial profile update; omitted fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub is_artisan: Option<bool>,
}

#[derive(Debug, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub is_artisan: Option<bool>,
}

impl UpdateProfileRequest {
    pub fn validate(self) -> Result<ProfilePatch, AppError> {
        let username = match self.username {
            Some(raw) => Some(parse_username(Some(raw))?),
            None => None,
        };
        Ok(ProfilePatch {
            username,
            is_artisan: self.is_artisan,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            is_artisan: true,
        }
    }

    #[test]
    fn signup_normalizes_email() {
        let input = register(" alice ", "  Alice@X.com ", "password1").validate().unwrap();
        assert_eq!(input.username, "alice");
        assert_eq!(input.email, "alice@x.com");
        assert!(input.is_artisan);
    }

    #[test]
    fn signup_rejects_bad_input() {
        assert!(register("alice", "not-an-email", "password1").validate().is_err());
        assert!(register("alice", "a@x.com", "short").validate().is_err());
        assert!(register("   ", "a@x.com", "password1").validate().is_err());
        assert!(RegisterRequest::default().validate().is_err());
    }

    #[test]
    fn is_artisan_defaults_to_false() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{"username":"a","email":"a@x.com","password":"password1"}"#)
                .unwrap();
        assert!(!req.is_artisan);
    }

    #[test]
    fn login_requires_password() {
        let req = LoginRequest {
            email: Some("a@x.com".into()),
            password: None,
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn profile_patch_keeps_omitted_fields_empty() {
        let patch = UpdateProfileRequest {
            username: None,
            is_artisan: Some(false),
        }
        .validate()
        .unwrap();
        assert!(patch.username.is_none());
        assert_eq!(patch.is_artisan, Some(false));
        assert!(UpdateProfileRequest {
            username: Some(" ".into()),
            is_artisan: None
        }
        .validate()
        .is_err());
    }

    #[test]
    fn email_regex() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user example@x.com"));
    }
}
