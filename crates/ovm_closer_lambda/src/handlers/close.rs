use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::clock::Clock;
use crate::adapters::console::{
    ConsoleError, ConsoleErrorKind, ConsoleGateway, ConsoleSession, SignInDetails,
};
use crate::adapters::record_store::AccountStore;
use crate::adapters::role_probe::AdminRoleProbe;
use crate::adapters::secret_store::SecretSource;
use crate::adapters::wait::Waiter;
use crate::runtime::classify::{AuthClassifier, AuthFailureClass, RoleAssumptionOutcome};
use crate::runtime::contract::{admin_role_arn, parse_secret_bundle, CloseRequest, SecretBundle};

#[derive(Debug, Clone)]
pub struct CloseHandlerConfig {
    pub secret_id: String,
    pub region: String,
    pub admin_role_name: String,
    pub probe_session_name: String,
    pub propagation_wait: Duration,
    pub verification_wait: Duration,
    pub verify_closure: bool,
    pub auth_classifier: AuthClassifier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseSuccessResponse {
    pub status: String,
    pub account_name: String,
    pub account_id: String,
    pub deletion_date: String,
    pub already_suspended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseFailureKind {
    Lookup,
    Secret,
    Authentication,
    ConsoleOperation,
    Verification,
    AccountStillOpen,
    RecordUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseHandlerError {
    pub message: String,
    pub kind: CloseFailureKind,
}

impl CloseHandlerError {
    fn new(kind: CloseFailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Drive the full closure sequence for one account: record lookup, secret
/// retrieval, console sign-in, billing/tax configuration, termination,
/// optional closure verification, and the final status write.
///
/// A sign-in failure classified as "account suspended" short-circuits the
/// console work and still records closure; every other failure aborts the
/// run before the record is touched.
#[allow(clippy::too_many_arguments)]
pub fn handle_close_request(
    request: &CloseRequest,
    config: &CloseHandlerConfig,
    store: &impl AccountStore,
    secrets: &impl SecretSource,
    console: &impl ConsoleGateway,
    probe: &impl AdminRoleProbe,
    waiter: &impl Waiter,
    clock: &impl Clock,
) -> Result<CloseSuccessResponse, CloseHandlerError> {
    let started_at = Instant::now();
    log_close_info(
        "close_started",
        json!({
            "account_name": request.account_name.clone(),
            "verify_closure": config.verify_closure,
        }),
    );

    match run_close(request, config, store, secrets, console, probe, waiter, clock) {
        Ok(response) => {
            log_close_info(
                "close_completed",
                json!({
                    "account_name": response.account_name.clone(),
                    "account_id": response.account_id.clone(),
                    "already_suspended": response.already_suspended,
                    "duration_ms": started_at.elapsed().as_millis(),
                }),
            );
            Ok(response)
        }
        Err(error) => {
            log_close_error(
                "close_failed",
                json!({
                    "account_name": request.account_name.clone(),
                    "kind": format!("{:?}", error.kind),
                    "error": error.message.clone(),
                    "duration_ms": started_at.elapsed().as_millis(),
                }),
            );
            Err(error)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_close(
    request: &CloseRequest,
    config: &CloseHandlerConfig,
    store: &impl AccountStore,
    secrets: &impl SecretSource,
    console: &impl ConsoleGateway,
    probe: &impl AdminRoleProbe,
    waiter: &impl Waiter,
    clock: &impl Clock,
) -> Result<CloseSuccessResponse, CloseHandlerError> {
    let record = store.fetch_record(&request.account_name).map_err(|error| {
        CloseHandlerError::new(
            CloseFailureKind::Lookup,
            format!("failed to fetch account record: {error}"),
        )
    })?;

    let raw_secret = secrets.fetch_secret(&config.secret_id).map_err(|error| {
        CloseHandlerError::new(
            CloseFailureKind::Secret,
            format!("failed to fetch credential secret: {error}"),
        )
    })?;
    let bundle = parse_secret_bundle(&raw_secret)
        .map_err(|error| CloseHandlerError::new(CloseFailureKind::Secret, error.message()))?;

    let sign_in = console.sign_in(&SignInDetails {
        account_email: &request.account_email,
        password: &bundle.password,
        region: &config.region,
        captcha_api_key: &bundle.twocaptcha_apikey,
    });

    let already_suspended = match sign_in {
        Ok(session) => {
            run_console_closure(&session, &bundle, config, waiter)?;
            log_close_info(
                "account_terminated",
                json!({
                    "account_name": request.account_name.clone(),
                    "account_id": record.account_id.clone(),
                }),
            );

            if config.verify_closure {
                let role_arn = admin_role_arn(&record.account_id, &config.admin_role_name);
                verify_account_closed(&role_arn, config, probe, waiter)?;
            }
            false
        }
        Err(error) if is_suspended_sign_in(&error, config.auth_classifier) => {
            log_close_info(
                "account_already_suspended",
                json!({
                    "account_name": request.account_name.clone(),
                    "sign_in_message": error.message.clone(),
                }),
            );
            true
        }
        Err(error) => {
            return Err(CloseHandlerError::new(
                CloseFailureKind::Authentication,
                format!("console sign-in failed: {error}"),
            ));
        }
    };

    let deletion_date = clock.utc_now_iso8601();
    store
        .mark_closed(&request.account_name, &deletion_date)
        .map_err(|error| {
            CloseHandlerError::new(
                CloseFailureKind::RecordUpdate,
                format!("failed to record closure: {error}"),
            )
        })?;

    Ok(CloseSuccessResponse {
        status: "closed".to_string(),
        account_name: request.account_name.clone(),
        account_id: record.account_id,
        deletion_date,
        already_suspended,
    })
}

fn is_suspended_sign_in(error: &ConsoleError, classifier: AuthClassifier) -> bool {
    error.kind == ConsoleErrorKind::InvalidAuthentication
        && classifier(&error.message) == AuthFailureClass::AccountSuspended
}

/// Fixed console sequence; the two propagation waits give the billing
/// permission and the inheritance flag time to take effect before the
/// operations that depend on them.
fn run_console_closure(
    session: &impl ConsoleSession,
    bundle: &SecretBundle,
    config: &CloseHandlerConfig,
    waiter: &impl Waiter,
) -> Result<(), CloseHandlerError> {
    let operation_failed = |error: ConsoleError| {
        CloseHandlerError::new(
            CloseFailureKind::ConsoleOperation,
            format!("console closure step failed: {error}"),
        )
    };

    session
        .set_billing_console_access(true)
        .map_err(operation_failed)?;
    waiter.wait(config.propagation_wait);

    session.set_tax_inheritance(true).map_err(operation_failed)?;
    waiter.wait(config.propagation_wait);

    session
        .set_tax_information(&bundle.tax_information())
        .map_err(operation_failed)?;
    session
        .set_pdf_invoice_by_mail(true)
        .map_err(operation_failed)?;
    session.terminate_account().map_err(operation_failed)?;
    Ok(())
}

/// Probe the admin role after the verification wait. A granted assumption
/// means the account is unexpectedly still open; access denied confirms the
/// closure took effect.
fn verify_account_closed(
    role_arn: &str,
    config: &CloseHandlerConfig,
    probe: &impl AdminRoleProbe,
    waiter: &impl Waiter,
) -> Result<(), CloseHandlerError> {
    waiter.wait(config.verification_wait);

    match probe.assume_admin_role(role_arn, &config.probe_session_name) {
        RoleAssumptionOutcome::Granted => Err(CloseHandlerError::new(
            CloseFailureKind::AccountStillOpen,
            format!("admin role {role_arn} is still assumable after termination"),
        )),
        RoleAssumptionOutcome::AccessDenied(message) => {
            log_close_info(
                "closure_confirmed",
                json!({
                    "role_arn": role_arn,
                    "probe_response": message,
                }),
            );
            Ok(())
        }
        RoleAssumptionOutcome::Failed(message) => Err(CloseHandlerError::new(
            CloseFailureKind::Verification,
            format!("admin role probe failed: {message}"),
        )),
    }
}

fn log_close_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "close_handler",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_close_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "close_handler",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
