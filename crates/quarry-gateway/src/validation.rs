use quarry_common::{Error, Result};

use crate::handlers::CreateUserRequest;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 64;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 8;

/// Input validation for user requests. Runs before any storage call so that
/// malformed input never reaches the database.
pub fn validate_new_user(req: &CreateUserRequest) -> Result<()> {
    validate_username(&req.username)?;
    validate_email(&req.email)?;
    if let Some(password) = &req.password {
        validate_password(password)?;
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<()> {
    if username.len() < USERNAME_MIN {
        return Err(Error::Validation(format!(
            "username must be at least {USERNAME_MIN} characters"
        )));
    }
    if username.len() > USERNAME_MAX {
        return Err(Error::Validation(format!(
            "username must be at most {USERNAME_MAX} characters"
        )));
    }
    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(Error::Validation(
            "username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if email.len() > EMAIL_MAX {
        return Err(Error::Validation("email too long".into()));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(Error::Validation("email must not contain whitespace".into()));
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next();
    match domain {
        Some(domain) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(()),
        _ => Err(Error::Validation(format!("'{email}' is not a valid email"))),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < PASSWORD_MIN {
        return Err(Error::Validation(format!(
            "password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}
