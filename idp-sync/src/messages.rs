//! Human-readable messages for Identity Toolkit error codes.

const MESSAGES: &[(&str, &str)] = &[
    ("EMAIL_EXISTS", "The email address is already in use by another account."),
    ("EMAIL_NOT_FOUND", "There is no user record corresponding to this email."),
    ("INVALID_PASSWORD", "The password is invalid or the user does not have a password."),
    ("INVALID_LOGIN_CREDENTIALS", "The email or password is incorrect."),
    ("INVALID_EMAIL", "The email address is badly formatted."),
    ("MISSING_PASSWORD", "A password is required."),
    ("USER_DISABLED", "The user account has been disabled by an administrator."),
    ("USER_NOT_FOUND", "There is no user record corresponding to this identifier."),
    ("WEAK_PASSWORD", "The password must be 6 characters long or more."),
    ("PHONE_NUMBER_EXISTS", "The phone number is already in use by another account."),
    ("INVALID_PHONE_NUMBER", "The phone number is not a valid E.164 number."),
    ("DUPLICATE_LOCAL_ID", "The provided user ID is already in use by another account."),
    ("INVALID_ID_TOKEN", "The user's credential is no longer valid. The user must sign in again."),
    ("TOKEN_EXPIRED", "The user's credential has expired. The user must sign in again."),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", "The user must sign in again to perform this operation."),
    ("OPERATION_NOT_ALLOWED", "Password sign-in is disabled for this project."),
    ("TOO_MANY_ATTEMPTS_TRY_LATER", "Access has been temporarily disabled due to many failed attempts. Try again later."),
    ("INVALID_CLAIMS", "The custom claims provided are invalid."),
    ("CLAIMS_TOO_LARGE", "The custom claims payload exceeds the maximum allowed size."),
    ("QUOTA_EXCEEDED", "The project quota for this operation has been exceeded."),
    ("PROJECT_NOT_FOUND", "No project was found for the configured credentials.")
];

/// Message for a provider error code.
///
/// Codes may carry a trailing detail (`WEAK_PASSWORD : Password should be
/// ...`); only the leading code word is looked up. Unknown codes fall back to
/// `default`, then to the code itself.
pub fn message(code: &str, default: Option<&str>) -> String {
    let base = code.split(':').next().unwrap_or_default().trim();
    MESSAGES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(base))
        .map(|(_, text)| (*text).to_string())
        .or_else(|| default.map(str::to_string))
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code() {
        assert_eq!(
            message("EMAIL_EXISTS", None),
            "The email address is already in use by another account."
        );
    }

    #[test]
    fn test_code_with_detail_matches_prefix() {
        assert_eq!(
            message("WEAK_PASSWORD : Password should be at least 6 characters", None),
            "The password must be 6 characters long or more."
        );
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(message("x", Some("Default")), "Default");
        assert_eq!(message("fallback", None), "fallback");
        assert_eq!(message("", None), "");
    }
}
