//! Form payloads posted by the HTML pages, and their validation.

use serde::Deserialize;
use thiserror::Error;

use crate::db::NewsDraft;

const TITLE_MAX: usize = 200;
const CATEGORY_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Username must be 3 to 32 characters of letters, digits, '.', '_' or '-'")]
    InvalidUsername,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Checkbox; present only when ticked
    pub remember: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_username(self.username.trim())?;
        validate_email(self.email.trim())?;
        if self.password.chars().count() < PASSWORD_MIN {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category: String,
    pub is_draft: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl NewsForm {
    pub fn is_draft(&self) -> bool {
        self.is_draft.is_some()
    }

    /// Validates and trims the form into a draft owned by `author`
    pub fn to_draft(&self, author: &str) -> Result<NewsDraft, ValidationError> {
        let title = self.title.trim();
        let category = self.category.trim();
        let body = self.body.trim();

        required("Title", title)?;
        max_len("Title", title, TITLE_MAX)?;
        required("Category", category)?;
        max_len("Category", category, CATEGORY_MAX)?;
        required("Body", body)?;

        Ok(NewsDraft {
            title: title.to_string(),
            body: body.replace("\r\n", "\n"),
            category: category.to_string(),
            author: author.to_string(),
            is_draft: self.is_draft.is_some(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("Name", self.name.trim())?;
        required("Email", self.email.trim())?;
        validate_email(self.email.trim())?;
        required("Message", self.message.trim())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub csrf_token: String,
}

impl PasswordForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("Current password", &self.current_password)?;
        if self.new_password.chars().count() < PASSWORD_MIN {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
    #[serde(default)]
    pub csrf_token: String,
}

/// Body of the button-only POST forms (delete, toggle, logout)
#[derive(Debug, Deserialize)]
pub struct ActionForm {
    #[serde(default)]
    pub csrf_token: String,
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}

fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !(3..=32).contains(&len) || !allowed {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}
