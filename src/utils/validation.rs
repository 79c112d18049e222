// Input validation utilities

use regex::Regex;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate the admin identity fields from the installation request.
pub fn validate_admin_credentials(
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Admin email is required.".to_string());
    }
    if !is_valid_email(email) {
        return Err("Admin email is not a valid email address.".to_string());
    }
    if password.is_empty() {
        return Err("Admin password is required.".to_string());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Admin password must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if password != confirm_password {
        return Err("Passwords do not match.".to_string());
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    // Conservative: local@domain.tld with no whitespace. Not an RFC validator.
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex");
    re.is_match(email)
}

/// Validate a database name for CREATE DATABASE (letters, numbers, underscore;
/// 1-63 chars; not a reserved maintenance database).
pub fn validate_database_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Database name is required.".to_string());
    }
    if name.len() > 63 {
        return Err("Database name must be 63 characters or fewer.".to_string());
    }
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("db name regex");
    if !re.is_match(name) {
        return Err(
            "Database name must start with a letter or underscore and contain only letters, numbers, and underscores.".to_string(),
        );
    }
    let reserved = ["postgres", "template0", "template1"];
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(format!("'{}' is a reserved database name.", name));
    }
    Ok(())
}

/// Validate a custom collation name (e.g. "de_DE.utf8", "C", "en-US-x-icu").
pub fn validate_collation_name(collation: &str) -> Result<(), String> {
    let s = collation.trim();
    if s.is_empty() {
        return Err("Collation name is required when custom collation is enabled.".to_string());
    }
    let re = Regex::new(r"^[A-Za-z0-9_.@\-]+$").expect("collation regex");
    if !re.is_match(s) {
        return Err("Collation name contains invalid characters.".to_string());
    }
    Ok(())
}
