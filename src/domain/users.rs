//! Account form rules.

use super::validation::{FieldErrors, REQUIRED_MESSAGE, non_blank};

pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Username accepted at sign-up: up to 150 letters, digits and `@ . + - _`.
pub fn validate_username(raw: &str) -> Result<String, FieldErrors> {
    let Some(username) = non_blank(raw) else {
        return Err(FieldErrors::single("username", REQUIRED_MESSAGE));
    };

    let mut errors = FieldErrors::new();
    if username.chars().count() > MAX_USERNAME_LEN {
        errors.add(
            "username",
            format!("Ensure this value has at most {MAX_USERNAME_LEN} characters."),
        );
    }
    if !username
        .chars()
        .all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    errors.into_result(username)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupDraft {
    pub username: String,
    pub password: String,
}

impl SignupDraft {
    pub fn parse(username: &str, password: &str, confirmation: &str) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let username = match validate_username(username) {
            Ok(username) => Some(username),
            Err(err) => {
                errors.merge(err);
                None
            }
        };

        if password.is_empty() {
            errors.add("password1", REQUIRED_MESSAGE);
        } else if password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password1",
                format!(
                    "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
                ),
            );
        }

        if confirmation.is_empty() {
            errors.add("password2", REQUIRED_MESSAGE);
        } else if password != confirmation {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors.into_result(()).map(|()| Self {
            username: username.unwrap_or_default(),
            password: password.to_string(),
        })
    }
}
