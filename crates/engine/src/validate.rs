//! Argument checks that run before any OS call.

use crate::config::AccountConfig;

const MAX_USER_NAME_LEN: usize = 20;
const FORBIDDEN_NAME_CHARS: &[char] = &['"', '/', '\\', '[', ']', ':', ';', '|', '=', ',', '+', '*', '?', '<', '>', '@'];

/// Local account names: 1–20 characters, none of the reserved ones, not
/// only dots and spaces.
pub fn user_name(raw: &str) -> Result<&str, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("user name must not be empty".into());
    }
    if name.chars().count() > MAX_USER_NAME_LEN {
        return Err(format!(
            "user name '{}' is longer than {} characters",
            name, MAX_USER_NAME_LEN
        ));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c) || c.is_control()) {
        return Err(format!("user name '{}' contains forbidden character '{}'", name, c));
    }
    if name.chars().all(|c| c == '.' || c == ' ') {
        return Err(format!("user name '{}' must contain a letter or digit", name));
    }
    Ok(name)
}

/// Password complexity as configured in [`AccountConfig`].
pub fn password(password: &str, policy: &AccountConfig) -> Result<(), String> {
    if password.chars().count() < policy.min_password_length {
        return Err(format!(
            "password must be at least {} characters",
            policy.min_password_length
        ));
    }
    let classes = [
        password.chars().any(|c| c.is_uppercase()),
        password.chars().any(|c| c.is_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if classes < policy.min_character_classes {
        return Err(format!(
            "password must mix at least {} of upper case, lower case, digits and symbols",
            policy.min_character_classes
        ));
    }
    Ok(())
}

pub fn is_protected_account(name: &str, policy: &AccountConfig) -> bool {
    policy.protected.iter().any(|p| p.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_rules() {
        assert_eq!(user_name("  alice ").unwrap(), "alice");
        assert!(user_name("").is_err());
        assert!(user_name("a".repeat(21).as_str()).is_err());
        assert!(user_name("bad/name").is_err());
        assert!(user_name("...").is_err());
        assert!(user_name("svc.backup").is_ok());
    }

    #[test]
    fn test_password_policy() {
        let policy = AccountConfig::default();
        assert!(password("Pwd!2345", &policy).is_ok());
        assert!(password("short1!", &policy).is_err());
        assert!(password("alllowercase", &policy).is_err());
        assert!(password("lower123", &policy).is_err());
        assert!(password("Lower123", &policy).is_ok());
    }

    #[test]
    fn test_protected_accounts_case_insensitive() {
        let policy = AccountConfig::default();
        assert!(is_protected_account("administrator", &policy));
        assert!(is_protected_account("Guest", &policy));
        assert!(!is_protected_account("alice", &policy));
    }
}
