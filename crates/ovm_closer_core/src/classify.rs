//! Classification of the two failure signals the closure workflow recovers
//! from: a console sign-in rejected because the account is already suspended,
//! and an admin-role probe denied because the account is already closed.

/// Outcome of classifying a console sign-in failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureClass {
    /// The account was already suspended; closure can be recorded directly.
    AccountSuspended,
    /// Any other sign-in failure; fatal.
    Other,
}

/// Pluggable classifier seam so the substring heuristic can be swapped for a
/// structured error code if the console-automation contract changes.
pub type AuthClassifier = fn(&str) -> AuthFailureClass;

/// Default classifier: the console reports suspended accounts only through
/// the message text of an invalid-authentication failure.
pub fn classify_auth_failure(message: &str) -> AuthFailureClass {
    if message.contains("Suspended") {
        AuthFailureClass::AccountSuspended
    } else {
        AuthFailureClass::Other
    }
}

pub const ACCESS_DENIED_ERROR_CODE: &str = "AccessDenied";

pub fn is_access_denied_code(code: &str) -> bool {
    code == ACCESS_DENIED_ERROR_CODE
}

/// Classified result of attempting to assume an account's admin role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleAssumptionOutcome {
    /// The role was assumable; the account is still accessible.
    Granted,
    /// Access denied; confirms the account is no longer reachable.
    AccessDenied(String),
    /// Any other failure; fatal.
    Failed(String),
}
