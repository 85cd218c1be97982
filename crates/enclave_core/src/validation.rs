//! Input rules for account fields.

use regex::Regex;
use std::sync::OnceLock;

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 128;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{3,30}$").expect("valid username regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
    })
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err("Username must be 3-30 characters of letters, digits or underscores".to_string())
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() <= 254 && email_pattern().is_match(email) {
        Ok(())
    } else {
        Err("Email address is not valid".to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    let length = password.chars().count();
    if length < PASSWORD_MIN_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LENGTH
        ));
    }
    if length > PASSWORD_MAX_LENGTH {
        return Err(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX_LENGTH
        ));
    }
    Ok(())
}
