use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::runtime::contract::TaxInformation;

// Console operations drive a real browser behind the automation service
// and can take minutes, CAPTCHA solving included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleErrorKind {
    /// The console rejected the credentials during sign-in.
    InvalidAuthentication,
    /// Any other failed console call.
    Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleError {
    pub kind: ConsoleErrorKind,
    pub message: String,
}

impl ConsoleError {
    pub fn invalid_authentication(message: impl Into<String>) -> Self {
        Self {
            kind: ConsoleErrorKind::InvalidAuthentication,
            message: message.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self {
            kind: ConsoleErrorKind::Operation,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConsoleError {}

/// Credentials and CAPTCHA capability handed to the automation service when
/// opening a console session. The CAPTCHA key is passed through opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInDetails<'a> {
    pub account_email: &'a str,
    pub password: &'a str,
    pub region: &'a str,
    pub captcha_api_key: &'a str,
}

/// An authenticated console session. Each operation is a blocking call that
/// may fail; ordering and waits between them are the caller's concern.
pub trait ConsoleSession {
    fn set_billing_console_access(&self, enabled: bool) -> Result<(), ConsoleError>;
    fn set_tax_inheritance(&self, enabled: bool) -> Result<(), ConsoleError>;
    fn set_tax_information(&self, information: &TaxInformation) -> Result<(), ConsoleError>;
    fn set_pdf_invoice_by_mail(&self, enabled: bool) -> Result<(), ConsoleError>;
    fn terminate_account(&self) -> Result<(), ConsoleError>;
}

pub trait ConsoleGateway {
    type Session: ConsoleSession;

    fn sign_in(&self, details: &SignInDetails<'_>) -> Result<Self::Session, ConsoleError>;
}

#[derive(Deserialize)]
struct SignInResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct ConsoleErrorResponse {
    message: String,
}

/// Thin HTTP client for the external console-automation service.
#[derive(Debug, Clone)]
pub struct HttpConsoleGateway {
    client: Client,
    endpoint: String,
}

impl HttpConsoleGateway {
    /// Create a client for the given automation endpoint
    /// (e.g. `http://localhost:8400`).
    pub fn new(endpoint: &str) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| {
                ConsoleError::operation(format!("failed to build console client: {error}"))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl ConsoleGateway for HttpConsoleGateway {
    type Session = HttpConsoleSession;

    fn sign_in(&self, details: &SignInDetails<'_>) -> Result<HttpConsoleSession, ConsoleError> {
        let url = format!("{}/sessions", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "account_email": details.account_email,
                "password": details.password,
                "region": details.region,
                "captcha_api_key": details.captcha_api_key,
            }))
            .send()
            .map_err(|error| {
                ConsoleError::operation(format!("console sign-in request failed: {error}"))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let message = response
                .json::<ConsoleErrorResponse>()
                .map(|body| body.message)
                .unwrap_or_else(|_| "invalid authentication".to_string());
            return Err(ConsoleError::invalid_authentication(message));
        }
        if !status.is_success() {
            return Err(ConsoleError::operation(format!(
                "console sign-in returned status {status}"
            )));
        }

        let body: SignInResponse = response.json().map_err(|error| {
            ConsoleError::operation(format!("invalid console sign-in response: {error}"))
        })?;

        Ok(HttpConsoleSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            session_id: body.session_id,
        })
    }
}

/// Session handle bound to one signed-in browser session on the automation
/// service.
#[derive(Debug, Clone)]
pub struct HttpConsoleSession {
    client: Client,
    endpoint: String,
    session_id: String,
}

impl HttpConsoleSession {
    fn post_operation(&self, route: &str, body: Value) -> Result<(), ConsoleError> {
        let url = format!("{}/sessions/{}/{route}", self.endpoint, self.session_id);
        let response = self.client.post(&url).json(&body).send().map_err(|error| {
            ConsoleError::operation(format!("console operation '{route}' request failed: {error}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsoleError::operation(format!(
                "console operation '{route}' returned status {status}"
            )));
        }
        Ok(())
    }
}

impl ConsoleSession for HttpConsoleSession {
    fn set_billing_console_access(&self, enabled: bool) -> Result<(), ConsoleError> {
        self.post_operation("billing-console-access", json!({ "enabled": enabled }))
    }

    fn set_tax_inheritance(&self, enabled: bool) -> Result<(), ConsoleError> {
        self.post_operation("tax-inheritance", json!({ "enabled": enabled }))
    }

    fn set_tax_information(&self, information: &TaxInformation) -> Result<(), ConsoleError> {
        let body = serde_json::to_value(information).map_err(|error| {
            ConsoleError::operation(format!("failed to serialize tax information: {error}"))
        })?;
        self.post_operation("tax-information", body)
    }

    fn set_pdf_invoice_by_mail(&self, enabled: bool) -> Result<(), ConsoleError> {
        self.post_operation("pdf-invoice-by-mail", json!({ "enabled": enabled }))
    }

    fn terminate_account(&self) -> Result<(), ConsoleError> {
        self.post_operation("terminate", json!({}))
    }
}
