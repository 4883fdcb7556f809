use serde::{Deserialize, Serialize};

/// Secret holding the console credentials and billing/tax configuration
/// shared by every vended account.
pub const DEFAULT_SECRET_ID: &str = "/aws-organizations-vending-machine/ccdata";
/// Cross-account administrative role provisioned into every vended account.
pub const DEFAULT_ADMIN_ROLE_NAME: &str = "OVMCrossAccountRole";
/// Seconds to wait for a console-side setting to propagate before the next
/// dependent operation.
pub const DEFAULT_PROPAGATION_WAIT_SECS: u64 = 10;
/// Seconds to wait after termination before probing the admin role.
pub const DEFAULT_VERIFICATION_WAIT_SECS: u64 = 120;

/// Lifecycle states an account record moves through, as stored in the
/// record store's `account_status` attribute. Values outside the known
/// lifecycle are preserved as-is: the closure workflow reads only
/// `account_id` and must not refuse a record over an unfamiliar status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    ToCreate,
    Created,
    Vended,
    Buried,
    BuriedAndClosed,
    Closed,
    Other(String),
}

impl AccountStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ToCreate => "TO_CREATE",
            Self::Created => "CREATED",
            Self::Vended => "VENDED",
            Self::Buried => "BURIED",
            Self::BuriedAndClosed => "BURIED_AND_CLOSED",
            Self::Closed => "CLOSED",
            Self::Other(value) => value,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "TO_CREATE" => Self::ToCreate,
            "CREATED" => Self::Created,
            "VENDED" => Self::Vended,
            "BURIED" => Self::Buried,
            "BURIED_AND_CLOSED" => Self::BuriedAndClosed,
            "CLOSED" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account metadata persisted in the record store, keyed by
/// `account_name`. Only `account_id` is required; older records may lack
/// the status attribute entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_name: String,
    pub account_id: String,
    pub account_status: Option<AccountStatus>,
    pub account_email: Option<String>,
    pub deletion_date: Option<String>,
}

/// Inputs identifying the account to close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseRequest {
    pub account_name: String,
    pub account_email: String,
}

pub fn normalize_close_request(request: CloseRequest) -> Result<CloseRequest, ValidationError> {
    let account_name = request.account_name.trim().to_string();
    if account_name.is_empty() {
        return Err(ValidationError::new("account_name cannot be empty"));
    }

    let account_email = request.account_email.trim().to_string();
    if account_email.is_empty() {
        return Err(ValidationError::new("account_email cannot be empty"));
    }

    Ok(CloseRequest {
        account_name,
        account_email,
    })
}

/// Flat credential/configuration blob stored under [`DEFAULT_SECRET_ID`].
/// Field names match the secret's JSON keys exactly.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SecretBundle {
    pub password: String,
    pub twocaptcha_apikey: String,
    pub streetaddress: String,
    pub city: String,
    pub postalcode: String,
    pub company: String,
    pub vatid: String,
    pub countrycode: String,
}

impl SecretBundle {
    pub fn tax_information(&self) -> TaxInformation {
        TaxInformation {
            street_address: self.streetaddress.clone(),
            city: self.city.clone(),
            postal_code: self.postalcode.clone(),
            company: self.company.clone(),
            vat_id: self.vatid.clone(),
            country_code: self.countrycode.clone(),
        }
    }
}

pub fn parse_secret_bundle(raw: &str) -> Result<SecretBundle, ValidationError> {
    serde_json::from_str(raw)
        .map_err(|error| ValidationError::new(format!("malformed secret bundle: {error}")))
}

/// Billing tax profile written to the console in a single operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaxInformation {
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub company: String,
    pub vat_id: String,
    pub country_code: String,
}

/// ARN of the assumable administrative role inside a member account.
pub fn admin_role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_arn_follows_role_name_convention() {
        let arn = admin_role_arn("111122223333", DEFAULT_ADMIN_ROLE_NAME);
        assert_eq!(arn, "arn:aws:iam::111122223333:role/OVMCrossAccountRole");
    }

    #[test]
    fn normalize_close_request_trims_fields() {
        let request = normalize_close_request(CloseRequest {
            account_name: " acct-42 ".to_string(),
            account_email: " root+acct-42@example.org ".to_string(),
        })
        .expect("request should pass");

        assert_eq!(request.account_name, "acct-42");
        assert_eq!(request.account_email, "root+acct-42@example.org");
    }

    #[test]
    fn normalize_close_request_rejects_empty_name() {
        let error = normalize_close_request(CloseRequest {
            account_name: "  ".to_string(),
            account_email: "root@example.org".to_string(),
        })
        .expect_err("request should fail");

        assert_eq!(error.message(), "account_name cannot be empty");
    }

    #[test]
    fn normalize_close_request_rejects_empty_email() {
        let error = normalize_close_request(CloseRequest {
            account_name: "acct-42".to_string(),
            account_email: "".to_string(),
        })
        .expect_err("request should fail");

        assert_eq!(error.message(), "account_email cannot be empty");
    }

    #[test]
    fn account_status_round_trips_wire_strings() {
        for status in [
            AccountStatus::ToCreate,
            AccountStatus::Created,
            AccountStatus::Vended,
            AccountStatus::Buried,
            AccountStatus::BuriedAndClosed,
            AccountStatus::Closed,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn status_outside_lifecycle_is_preserved() {
        let status = AccountStatus::parse("OPEN");
        assert_eq!(status, AccountStatus::Other("OPEN".to_string()));
        assert_eq!(status.as_str(), "OPEN");
    }

    #[test]
    fn parse_secret_bundle_reads_fixed_keys() {
        let bundle = parse_secret_bundle(
            r#"{
                "password": "hunter2",
                "twocaptcha_apikey": "captcha-key",
                "streetaddress": "1 Example Street",
                "city": "Exampletown",
                "postalcode": "12345",
                "company": "Example Corp",
                "vatid": "EX123456789",
                "countrycode": "DE"
            }"#,
        )
        .expect("bundle should parse");

        assert_eq!(bundle.password, "hunter2");
        let tax = bundle.tax_information();
        assert_eq!(tax.street_address, "1 Example Street");
        assert_eq!(tax.country_code, "DE");
    }

    #[test]
    fn parse_secret_bundle_rejects_missing_keys() {
        let error =
            parse_secret_bundle(r#"{"password": "hunter2"}"#).expect_err("bundle should fail");
        assert!(error.message().starts_with("malformed secret bundle"));
    }
}
