// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{Error, Result};

pub const MIN_CREDENTIAL_LEN: usize = 4;
pub const MAX_CREDENTIAL_LEN: usize = 20;

const FORBIDDEN: &[char] = &[
    ';', '&', '|', '>', '<', '`', '\'', '"', '\\', '$', '*', '?', '{', '}', '(', ')', '[', ']',
    '\n', '\r',
];

/// Trim and check a username/password pair; returns the trimmed values.
pub fn validate_credentials(username: &str, password: &str) -> Result<(String, String)> {
    let username = check("username", username)?;
    let password = check("password", password)?;
    Ok((username, password))
}

fn check(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidCredentials(format!("{field} must not be empty")));
    }
    let len = value.chars().count();
    if !(MIN_CREDENTIAL_LEN..=MAX_CREDENTIAL_LEN).contains(&len) {
        return Err(Error::InvalidCredentials(format!(
            "{field} must be {MIN_CREDENTIAL_LEN} to {MAX_CREDENTIAL_LEN} characters long"
        )));
    }
    if let Some(c) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(Error::InvalidCredentials(format!(
            "{field} contains the forbidden character {c:?}"
        )));
    }
    Ok(value.to_string())
}
