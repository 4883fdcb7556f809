use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_sts::error::ProvideErrorMetadata;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use ovm_closer_lambda::adapters::clock::UtcClock;
use ovm_closer_lambda::adapters::console::HttpConsoleGateway;
use ovm_closer_lambda::adapters::record_store::AccountStore;
use ovm_closer_lambda::adapters::role_probe::AdminRoleProbe;
use ovm_closer_lambda::adapters::secret_store::SecretSource;
use ovm_closer_lambda::adapters::wait::ThreadWaiter;
use ovm_closer_lambda::handlers::close::{
    handle_close_request, CloseHandlerConfig, CloseSuccessResponse,
};
use ovm_closer_lambda::runtime::classify::{
    classify_auth_failure, is_access_denied_code, RoleAssumptionOutcome,
};
use ovm_closer_lambda::runtime::contract::{
    normalize_close_request, AccountRecord, AccountStatus, CloseRequest, DEFAULT_ADMIN_ROLE_NAME,
    DEFAULT_PROPAGATION_WAIT_SECS, DEFAULT_SECRET_ID, DEFAULT_VERIFICATION_WAIT_SECS,
};
use serde_json::{json, Value};

struct DynamoDbAccountStore {
    table_name: String,
    ddb_client: aws_sdk_dynamodb::Client,
}

impl AccountStore for DynamoDbAccountStore {
    fn fetch_record(&self, account_name: &str) -> Result<AccountRecord, String> {
        let table = self.table_name.clone();
        let key = account_name.to_string();
        let client = self.ddb_client.clone();

        let item = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .get_item()
                    .table_name(table)
                    .key("account_name", AttributeValue::S(key))
                    .send()
                    .await
                    .map_err(|error| format!("failed to read account record: {error}"))
            })
        })?
        .item
        .ok_or_else(|| format!("no account record found for '{account_name}'"))?;

        // Only account_id matters for closure; tolerate records with a
        // missing or unfamiliar status.
        let account_status = optional_string_attribute(&item, "account_status")
            .map(|value| AccountStatus::parse(&value));

        Ok(AccountRecord {
            account_name: account_name.to_string(),
            account_id: string_attribute(&item, "account_id")?,
            account_status,
            account_email: optional_string_attribute(&item, "account_email"),
            deletion_date: optional_string_attribute(&item, "deletion_date"),
        })
    }

    fn mark_closed(&self, account_name: &str, deletion_date: &str) -> Result<(), String> {
        let table = self.table_name.clone();
        let key = account_name.to_string();
        let deletion_date = deletion_date.to_string();
        let client = self.ddb_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .update_item()
                    .table_name(table)
                    .key("account_name", AttributeValue::S(key))
                    .update_expression(
                        "SET deletion_date = :deletion_date, account_status = :account_status",
                    )
                    .expression_attribute_values(
                        ":deletion_date",
                        AttributeValue::S(deletion_date),
                    )
                    .expression_attribute_values(
                        ":account_status",
                        AttributeValue::S(AccountStatus::Closed.as_str().to_string()),
                    )
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to update account record: {error}"))
            })
        })
    }
}

fn string_attribute(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<String, String> {
    optional_string_attribute(item, name)
        .ok_or_else(|| format!("account record is missing string attribute '{name}'"))
}

fn optional_string_attribute(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Option<String> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .cloned()
}

struct SecretsManagerSource {
    sm_client: aws_sdk_secretsmanager::Client,
}

impl SecretSource for SecretsManagerSource {
    fn fetch_secret(&self, secret_id: &str) -> Result<String, String> {
        let id = secret_id.to_string();
        let client = self.sm_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let response = client
                    .get_secret_value()
                    .secret_id(id)
                    .send()
                    .await
                    .map_err(|error| format!("failed to fetch secret value: {error}"))?;
                response
                    .secret_string()
                    .map(str::to_string)
                    .ok_or_else(|| "secret value has no string payload".to_string())
            })
        })
    }
}

struct StsAdminRoleProbe {
    sts_client: aws_sdk_sts::Client,
}

impl AdminRoleProbe for StsAdminRoleProbe {
    fn assume_admin_role(&self, role_arn: &str, session_name: &str) -> RoleAssumptionOutcome {
        let arn = role_arn.to_string();
        let name = session_name.to_string();
        let client = self.sts_client.clone();

        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .assume_role()
                    .role_arn(arn)
                    .role_session_name(name)
                    .send()
                    .await
            })
        });

        match result {
            Ok(_) => RoleAssumptionOutcome::Granted,
            Err(error) => {
                let code = error
                    .as_service_error()
                    .and_then(|service| service.code())
                    .map(str::to_string);
                match code {
                    Some(code) if is_access_denied_code(&code) => {
                        RoleAssumptionOutcome::AccessDenied(format!(
                            "assume-role was denied for {role_arn}: {error}"
                        ))
                    }
                    _ => RoleAssumptionOutcome::Failed(format!(
                        "assume-role failed for {role_arn}: {error}"
                    )),
                }
            }
        }
    }
}

#[derive(Clone)]
struct RuntimeDependencies {
    config: CloseHandlerConfig,
    table_name: String,
    console_endpoint: String,
    queue_url: Option<String>,
    ddb_client: aws_sdk_dynamodb::Client,
    sm_client: aws_sdk_secretsmanager::Client,
    sts_client: aws_sdk_sts::Client,
    sqs_client: aws_sdk_sqs::Client,
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        config: handler_config_from_env()?,
        table_name: std::env::var("ACCOUNT_TABLE_NAME").unwrap_or_else(|_| "account".to_string()),
        console_endpoint: std::env::var("CONSOLE_ENDPOINT")
            .map_err(|_| Error::from("CONSOLE_ENDPOINT must be configured"))?,
        queue_url: std::env::var("DELETION_QUEUE_URL").ok(),
        ddb_client: aws_sdk_dynamodb::Client::new(&aws_config),
        sm_client: aws_sdk_secretsmanager::Client::new(&aws_config),
        sts_client: aws_sdk_sts::Client::new(&aws_config),
        sqs_client: aws_sdk_sqs::Client::new(&aws_config),
    };

    if is_sqs_event(&event.payload) {
        let requests = decode_sqs_requests(&event.payload)?;
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(process_request(request, &deps)?);
        }
        return serde_json::to_value(responses)
            .map_err(|error| Error::from(format!("failed to serialize responses: {error}")));
    }

    if let Some(request) = direct_request(&event.payload).or_else(env_request) {
        let response = process_request(request, &deps)?;
        return serde_json::to_value(response)
            .map_err(|error| Error::from(format!("failed to serialize response: {error}")));
    }

    if deps.queue_url.is_some() {
        return match receive_queued_request(&deps)? {
            Some((request, receipt_handle)) => {
                let response = process_request(request, &deps)?;
                delete_queued_message(&deps, &receipt_handle)?;
                serde_json::to_value(response)
                    .map_err(|error| Error::from(format!("failed to serialize response: {error}")))
            }
            None => Ok(json!({ "status": "queue_empty" })),
        };
    }

    Err(Error::from(
        "no close request: provide a payload, ACCOUNT_NAME/ACCOUNT_EMAIL, or DELETION_QUEUE_URL",
    ))
}

fn process_request(
    request: CloseRequest,
    deps: &RuntimeDependencies,
) -> Result<CloseSuccessResponse, Error> {
    let request = normalize_close_request(request)
        .map_err(|error| Error::from(format!("invalid close request: {error}")))?;

    let store = DynamoDbAccountStore {
        table_name: deps.table_name.clone(),
        ddb_client: deps.ddb_client.clone(),
    };
    let secrets = SecretsManagerSource {
        sm_client: deps.sm_client.clone(),
    };
    let probe = StsAdminRoleProbe {
        sts_client: deps.sts_client.clone(),
    };
    let console = HttpConsoleGateway::new(&deps.console_endpoint)
        .map_err(|error| Error::from(error.message))?;

    handle_close_request(
        &request,
        &deps.config,
        &store,
        &secrets,
        &console,
        &probe,
        &ThreadWaiter,
        &UtcClock,
    )
    .map_err(|error| Error::from(error.message))
}

fn handler_config_from_env() -> Result<CloseHandlerConfig, Error> {
    Ok(CloseHandlerConfig {
        secret_id: std::env::var("OVM_SECRET_ID").unwrap_or_else(|_| DEFAULT_SECRET_ID.to_string()),
        region: std::env::var("CONSOLE_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
        admin_role_name: std::env::var("ADMIN_ROLE_NAME")
            .unwrap_or_else(|_| DEFAULT_ADMIN_ROLE_NAME.to_string()),
        probe_session_name: "ovm-closure-verification".to_string(),
        propagation_wait: env_duration_secs(
            "PROPAGATION_WAIT_SECONDS",
            DEFAULT_PROPAGATION_WAIT_SECS,
        )?,
        verification_wait: env_duration_secs(
            "VERIFICATION_WAIT_SECONDS",
            DEFAULT_VERIFICATION_WAIT_SECS,
        )?,
        verify_closure: env_flag("VERIFY_CLOSURE", true)?,
        auth_classifier: classify_auth_failure,
    })
}

fn env_duration_secs(name: &str, default_secs: u64) -> Result<Duration, Error> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| Error::from(format!("{name} must be a non-negative integer"))),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool, Error> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Error::from(format!("{name} must be a boolean"))),
        },
        Err(_) => Ok(default),
    }
}

fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

fn decode_sqs_requests(event: &Value) -> Result<Vec<CloseRequest>, Error> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::from("SQS event must include Records array"))?;

    let mut requests = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::from("SQS record body must be a string"))?;
        let request: CloseRequest = serde_json::from_str(body)
            .map_err(|error| Error::from(format!("invalid close request payload: {error}")))?;
        requests.push(request);
    }

    Ok(requests)
}

fn direct_request(event: &Value) -> Option<CloseRequest> {
    serde_json::from_value(event.clone()).ok()
}

fn env_request() -> Option<CloseRequest> {
    let account_name = std::env::var("ACCOUNT_NAME").ok()?;
    let account_email = std::env::var("ACCOUNT_EMAIL").ok()?;
    Some(CloseRequest {
        account_name,
        account_email,
    })
}

fn receive_queued_request(
    deps: &RuntimeDependencies,
) -> Result<Option<(CloseRequest, String)>, Error> {
    let queue_url = deps
        .queue_url
        .clone()
        .ok_or_else(|| Error::from("DELETION_QUEUE_URL must be configured"))?;
    let client = deps.sqs_client.clone();

    let response = tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(async move {
            client
                .receive_message()
                .queue_url(queue_url)
                .max_number_of_messages(1)
                .visibility_timeout(300)
                .send()
                .await
                .map_err(|error| Error::from(format!("failed to receive queue message: {error}")))
        })
    })?;

    let Some(message) = response.messages().first() else {
        return Ok(None);
    };

    let body = message
        .body()
        .ok_or_else(|| Error::from("queue message has no body"))?;
    let request: CloseRequest = serde_json::from_str(body)
        .map_err(|error| Error::from(format!("invalid close request payload: {error}")))?;
    let receipt_handle = message
        .receipt_handle()
        .ok_or_else(|| Error::from("queue message has no receipt handle"))?
        .to_string();

    Ok(Some((request, receipt_handle)))
}

fn delete_queued_message(deps: &RuntimeDependencies, receipt_handle: &str) -> Result<(), Error> {
    let queue_url = deps
        .queue_url
        .clone()
        .ok_or_else(|| Error::from("DELETION_QUEUE_URL must be configured"))?;
    let receipt = receipt_handle.to_string();
    let client = deps.sqs_client.clone();

    tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(async move {
            client
                .delete_message()
                .queue_url(queue_url)
                .receipt_handle(receipt)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| Error::from(format!("failed to delete queue message: {error}")))
        })
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovm_closer_lambda::runtime::contract::admin_role_arn;

    #[test]
    fn detects_sqs_event_shape() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "body": "{}"}
            ]
        });
        assert!(is_sqs_event(&event));
    }

    #[test]
    fn rejects_non_sqs_records() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:s3", "body": "{}"}
            ]
        });
        assert!(!is_sqs_event(&event));
    }

    #[test]
    fn decodes_close_requests_from_sqs_bodies() {
        let event = json!({
            "Records": [
                {
                    "eventSource": "aws:sqs",
                    "body": "{\"account_name\":\"acct-42\",\"account_email\":\"root+acct-42@example.org\"}"
                }
            ]
        });

        let requests = decode_sqs_requests(&event).expect("bodies should decode");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].account_name, "acct-42");
    }

    #[test]
    fn rejects_record_without_body_string() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "body": 42}
            ]
        });

        let error = decode_sqs_requests(&event).expect_err("non-string body should fail");
        assert!(error
            .to_string()
            .contains("SQS record body must be a string"));
    }

    #[test]
    fn rejects_invalid_close_request_json() {
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "body": "{\"account_name\":\"acct-42\"}"}
            ]
        });

        let error = decode_sqs_requests(&event).expect_err("invalid request should fail");
        assert!(error.to_string().contains("invalid close request payload"));
    }

    #[test]
    fn direct_request_parses_invocation_payload() {
        let payload = json!({
            "account_name": "acct-42",
            "account_email": "root+acct-42@example.org"
        });

        let request = direct_request(&payload).expect("payload should parse");
        assert_eq!(request.account_email, "root+acct-42@example.org");
    }

    #[test]
    fn direct_request_rejects_unrelated_payload() {
        assert!(direct_request(&json!({"detail-type": "Scheduled Event"})).is_none());
    }

    #[test]
    fn duration_env_override_is_parsed() {
        std::env::set_var("TEST_CLOSER_WAIT_OVERRIDE", "45");
        let duration =
            env_duration_secs("TEST_CLOSER_WAIT_OVERRIDE", 10).expect("override should parse");
        std::env::remove_var("TEST_CLOSER_WAIT_OVERRIDE");

        assert_eq!(duration, Duration::from_secs(45));
    }

    #[test]
    fn duration_env_falls_back_to_default() {
        let duration =
            env_duration_secs("TEST_CLOSER_WAIT_UNSET", 120).expect("default should apply");
        assert_eq!(duration, Duration::from_secs(120));
    }

    #[test]
    fn duration_env_rejects_malformed_value() {
        std::env::set_var("TEST_CLOSER_WAIT_MALFORMED", "soon");
        let error = env_duration_secs("TEST_CLOSER_WAIT_MALFORMED", 10)
            .expect_err("malformed value should fail");
        std::env::remove_var("TEST_CLOSER_WAIT_MALFORMED");

        assert!(error
            .to_string()
            .contains("must be a non-negative integer"));
    }

    #[test]
    fn flag_env_parses_common_spellings() {
        std::env::set_var("TEST_CLOSER_FLAG_ON", "YES");
        std::env::set_var("TEST_CLOSER_FLAG_OFF", "0");
        let enabled = env_flag("TEST_CLOSER_FLAG_ON", false).expect("flag should parse");
        let disabled = env_flag("TEST_CLOSER_FLAG_OFF", true).expect("flag should parse");
        std::env::remove_var("TEST_CLOSER_FLAG_ON");
        std::env::remove_var("TEST_CLOSER_FLAG_OFF");

        assert!(enabled);
        assert!(!disabled);
    }

    #[test]
    fn flag_env_falls_back_to_default() {
        assert!(env_flag("TEST_CLOSER_FLAG_UNSET", true).expect("default should apply"));
        assert!(!env_flag("TEST_CLOSER_FLAG_UNSET", false).expect("default should apply"));
    }

    #[test]
    fn flag_env_rejects_malformed_value() {
        std::env::set_var("TEST_CLOSER_FLAG_MALFORMED", "maybe");
        let error =
            env_flag("TEST_CLOSER_FLAG_MALFORMED", true).expect_err("malformed flag should fail");
        std::env::remove_var("TEST_CLOSER_FLAG_MALFORMED");

        assert!(error.to_string().contains("must be a boolean"));
    }

    #[test]
    fn probe_arn_uses_admin_role_convention() {
        let arn = admin_role_arn("111122223333", DEFAULT_ADMIN_ROLE_NAME);
        assert_eq!(arn, "arn:aws:iam::111122223333:role/OVMCrossAccountRole");
    }
}
