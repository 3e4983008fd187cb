//! Name, password and record validation shared by the menu and user stores.
//!
//! Menu names and user names both end up as file names under the data
//! directory, so everything that reaches a path goes through this module first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Maximum size of a single menu or user JSON record.
pub const MAX_RECORD_BYTES: usize = 256 * 1024;

/// Maximum menu name length.
pub const MAX_MENU_NAME: usize = 32;

/// Username validation errors with helpful messages
#[derive(Debug, thiserror::Error)]
pub enum UsernameError {
    #[error("Username is too short (minimum 2 characters)")]
    TooShort,

    #[error("Username is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Username cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Username contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Username contains path separators (/ or \\)")]
    PathTraversal,

    #[error("Username is a reserved system name")]
    Reserved,
}

/// Failures when checking menu names, passwords or raw record contents.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Invalid menu name: {reason}")]
    InvalidMenuName { reason: String },

    #[error("Password too short (min {min})")]
    PasswordTooShort { min: usize },

    #[error("Password too long (max {max})")]
    PasswordTooLong { max: usize },

    #[error("Record exceeds limit ({limit} bytes)")]
    RecordTooLarge { limit: usize },

    #[error("Invalid format")]
    InvalidFormat,
}

/// Username validation rules configuration
#[derive(Debug, Clone)]
pub struct UsernameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_spaces: bool,
    pub allow_unicode: bool,
    pub allow_reserved_sysop: bool,
}

impl UsernameRules {
    /// Strict rules used by `termbbs adduser` for sysop accounts.
    pub fn sysop() -> Self {
        UsernameRules {
            min_length: 2,
            max_length: 20,
            allow_spaces: false,
            allow_unicode: false,
            allow_reserved_sysop: true,
        }
    }

    /// Rules applied to self-service signups.
    pub fn user() -> Self {
        UsernameRules {
            min_length: 2,
            max_length: 30,
            allow_spaces: true,
            allow_unicode: true,
            allow_reserved_sysop: false,
        }
    }
}

/// Generate safe filename from username using percent encoding
pub fn safe_filename(username: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    utf8_percent_encode(&username.to_lowercase(), NON_ALPHANUMERIC).to_string()
}

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "sysop", "operator", "guest", "anonymous",
        "new", "con", "prn", "aux", "nul", "logoff", "logon", "login", "logout", "signup",
        "apply", "matrix", "main", "quit", "exit", "bye",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate a username according to the given rules
pub fn validate_username(username: &str, rules: &UsernameRules) -> Result<String, UsernameError> {
    let trimmed = username.trim();
    if trimmed.chars().count() < rules.min_length {
        return Err(UsernameError::TooShort);
    }
    if trimmed.chars().count() > rules.max_length {
        return Err(UsernameError::TooLong { max: rules.max_length });
    }
    if trimmed != username {
        return Err(UsernameError::InvalidWhitespace);
    }

    let lower = trimmed.to_lowercase();
    if reserved_names().contains(lower.as_str()) && !(rules.allow_reserved_sysop && lower == "sysop") {
        return Err(UsernameError::Reserved);
    }
    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(UsernameError::PathTraversal);
    }

    let invalid: HashSet<char> = trimmed
        .chars()
        .filter(|&ch| {
            let ok = if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
                true
            } else if ch == ' ' {
                rules.allow_spaces
            } else if ch.is_control() || "<>:\"|?*".contains(ch) {
                false
            } else if !ch.is_ascii() {
                rules.allow_unicode && ch.is_alphanumeric()
            } else {
                false
            };
            !ok
        })
        .collect();
    if !invalid.is_empty() {
        let mut chars: Vec<char> = invalid.into_iter().collect();
        chars.sort_unstable();
        let chars = chars
            .into_iter()
            .map(|c| if c.is_control() { format!("\\u{{{:04x}}}", c as u32) } else { c.to_string() })
            .collect::<String>();
        return Err(UsernameError::InvalidCharacters { chars });
    }

    Ok(trimmed.to_string())
}

/// Validate a sysop name with strict rules
pub fn validate_sysop_name(name: &str) -> Result<String, UsernameError> {
    validate_username(name, &UsernameRules::sysop())
}

/// Validate a regular user name with permissive rules
pub fn validate_user_name(name: &str) -> Result<String, UsernameError> {
    validate_username(name, &UsernameRules::user())
}

/// Normalize and validate a menu name. Returns the lowercase form used as the file stem.
pub fn validate_menu_name(name: &str) -> Result<String, SecurityError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SecurityError::InvalidMenuName { reason: "empty".into() });
    }
    if trimmed.len() > MAX_MENU_NAME {
        return Err(SecurityError::InvalidMenuName {
            reason: format!("longer than {} characters", MAX_MENU_NAME),
        });
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(SecurityError::InvalidMenuName {
            reason: "only letters, digits, '_' and '-' are allowed".into(),
        });
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Check password length bounds before hashing.
pub fn validate_password(password: &str, min: usize) -> Result<(), SecurityError> {
    const MAX: usize = 128;
    if password.chars().count() < min {
        return Err(SecurityError::PasswordTooShort { min });
    }
    if password.len() > MAX {
        return Err(SecurityError::PasswordTooLong { max: MAX });
    }
    Ok(())
}

/// Path of a menu definition file. The name must already be validated.
pub fn menu_path(data_dir: &Path, menu_name: &str) -> PathBuf {
    data_dir.join("menus").join(format!("{}.json", menu_name))
}

/// Path of a user record file.
pub fn user_path(data_dir: &Path, username: &str) -> PathBuf {
    data_dir.join("users").join(format!("{}.json", safe_filename(username)))
}

/// Securely parse JSON with size limits and error handling
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, SecurityError>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        return Err(SecurityError::RecordTooLarge { limit: max_bytes });
    }
    // Interrupted writes have been seen to leave leading NULs; valid JSON never starts with one.
    let normalized = content.trim_start_matches('\0');
    serde_json::from_str(normalized).map_err(|_| SecurityError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysop_validation() {
        assert!(validate_sysop_name("martin").is_ok());
        assert!(validate_sysop_name("sysop").is_ok());
        assert!(validate_sysop_name("Al Sayeed").is_err());
        assert!(validate_sysop_name("José").is_err());
        assert!(validate_sysop_name("admin").is_err());
    }

    #[test]
    fn test_user_validation() {
        assert!(validate_user_name("Al Sayeed Bin Ramen").is_ok());
        assert!(validate_user_name("José María").is_ok());
        assert!(matches!(validate_user_name("../etc/passwd"), Err(UsernameError::PathTraversal)));
        assert!(matches!(validate_user_name("sysop"), Err(UsernameError::Reserved)));
        assert!(matches!(validate_user_name("matrix"), Err(UsernameError::Reserved)));
        assert!(matches!(validate_user_name(" bob"), Err(UsernameError::InvalidWhitespace)));
        assert!(matches!(validate_user_name("a"), Err(UsernameError::TooShort)));
        assert!(matches!(
            validate_user_name("bad<name>"),
            Err(UsernameError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn test_safe_filename_is_case_folded() {
        assert_eq!(safe_filename("Martin"), "martin");
        assert_eq!(safe_filename("Al Sayeed"), "al%20sayeed");
        assert!(!safe_filename("user/file").contains('/'));
    }

    #[test]
    fn test_menu_name_validation() {
        assert_eq!(validate_menu_name("Main").unwrap(), "main");
        assert_eq!(validate_menu_name(" file_area-2 ").unwrap(), "file_area-2");
        assert!(validate_menu_name("").is_err());
        assert!(validate_menu_name("../etc").is_err());
        assert!(validate_menu_name("two words").is_err());
        assert!(validate_menu_name(&"m".repeat(MAX_MENU_NAME + 1)).is_err());
    }

    #[test]
    fn test_password_bounds() {
        assert_eq!(validate_password("abc", 6), Err(SecurityError::PasswordTooShort { min: 6 }));
        assert!(validate_password("abcdef", 6).is_ok());
        assert!(validate_password(&"x".repeat(200), 6).is_err());
    }

    #[test]
    fn test_secure_json_parse_limits() {
        let v: Vec<u8> = secure_json_parse("\0\0[1,2]", 64).unwrap();
        assert_eq!(v, vec![1, 2]);
        assert_eq!(
            secure_json_parse::<Vec<u8>>("[1,2,3]", 3),
            Err(SecurityError::RecordTooLarge { limit: 3 })
        );
        assert_eq!(secure_json_parse::<Vec<u8>>("{", 64), Err(SecurityError::InvalidFormat));
    }
}
