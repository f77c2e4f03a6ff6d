//! Etherscan v2 client: verified-source metadata and deployed account code.
//! Transient failures are retried with capped exponential backoff; API and
//! not-found conditions are terminal.

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::NetworkError;

const DEFAULT_BASE_URL: &str = "https://api.etherscan.io/v2/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_ATTEMPTS: usize = 3;
const FETCH_BACKOFF_MS: u64 = 500;

/// Verified-source metadata as reported by the explorer, prior to any
/// shape detection or settings assembly.
#[derive(Debug, Clone)]
pub struct VerifiedSource {
  pub contract_name: String,
  pub compiler_version: String,
  pub optimization_used: bool,
  pub optimization_runs: u32,
  pub evm_version: Option<String>,
  pub source_code: String,
  pub constructor_arguments: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
  #[serde(rename = "SourceCode", default)]
  source_code: String,
  #[serde(rename = "ContractName", default)]
  contract_name: String,
  #[serde(rename = "CompilerVersion", default)]
  compiler_version: String,
  #[serde(rename = "OptimizationUsed", default)]
  optimization_used: String,
  #[serde(rename = "Runs", default)]
  runs: String,
  #[serde(rename = "EVMVersion", default)]
  evm_version: String,
  #[serde(rename = "ConstructorArguments", default)]
  constructor_arguments: String,
}

pub struct ExplorerClient {
  http: Client,
  base_url: String,
  chain_id: u64,
  api_key: Option<String>,
}

impl ExplorerClient {
  pub fn new(chain_id: u64, api_key: Option<String>) -> Result<Self, NetworkError> {
    Self::with_base_url(DEFAULT_BASE_URL.to_string(), chain_id, api_key)
  }

  pub fn with_base_url(
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
  ) -> Result<Self, NetworkError> {
    let http = Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|err| NetworkError::Api(format!("failed to build HTTP client: {err}")))?;
    Ok(Self {
      http,
      base_url,
      chain_id,
      api_key,
    })
  }

  /// Fetch verified-source metadata for an address.
  pub fn verified_source(&self, address: &str) -> Result<VerifiedSource, NetworkError> {
    let response = self.query(&[
      ("module", "contract"),
      ("action", "getsourcecode"),
      ("address", address),
    ])?;
    let status = response.get("status").and_then(Value::as_str).unwrap_or("");
    if status != "1" {
      return Err(api_failure(&response));
    }
    let raw: RawSource = response
      .get("result")
      .and_then(|result| result.as_array())
      .and_then(|results| results.first())
      .cloned()
      .map(serde_json::from_value)
      .transpose()
      .map_err(|err| NetworkError::MalformedResponse(err.to_string()))?
      .ok_or_else(|| NetworkError::MalformedResponse("empty result array".to_string()))?;
    source_from_raw(raw, address)
  }

  /// Fetch the raw runtime bytecode stored for an account, at a specific
  /// block when given, at the chain head otherwise. An empty result means
  /// no contract is deployed there; this is distinct from a mismatch.
  pub fn deployed_bytecode(
    &self,
    address: &str,
    block: Option<u64>,
  ) -> Result<Vec<u8>, NetworkError> {
    let tag = match block {
      Some(number) => format!("0x{number:x}"),
      None => "latest".to_string(),
    };
    let response = self.query(&[
      ("module", "proxy"),
      ("action", "eth_getCode"),
      ("address", address),
      ("tag", tag.as_str()),
    ])?;
    // The proxy module answers in JSON-RPC shape, not the status envelope.
    let code = response
      .get("result")
      .and_then(Value::as_str)
      .ok_or_else(|| {
        NetworkError::MalformedResponse(format!("eth_getCode returned no result: {response}"))
      })?;
    decode_code_result(code, address)
  }

  fn query(&self, params: &[(&str, &str)]) -> Result<Value, NetworkError> {
    let mut attempt = 1;
    loop {
      match self.try_query(params) {
        Err(NetworkError::Transient(reason)) if attempt < FETCH_ATTEMPTS => {
          warn!("explorer request attempt {attempt}/{FETCH_ATTEMPTS} failed: {reason}");
          thread::sleep(Duration::from_millis(FETCH_BACKOFF_MS << (attempt - 1)));
          attempt += 1;
        }
        other => return other,
      }
    }
  }

  fn try_query(&self, params: &[(&str, &str)]) -> Result<Value, NetworkError> {
    let chain_id = self.chain_id.to_string();
    let mut query: Vec<(&str, &str)> = vec![("chainid", chain_id.as_str())];
    query.extend_from_slice(params);
    if let Some(api_key) = &self.api_key {
      query.push(("apikey", api_key));
    }

    let response = self
      .http
      .get(&self.base_url)
      .query(&query)
      .send()
      .map_err(|err| {
        if err.is_timeout() || err.is_connect() {
          NetworkError::Transient(err.to_string())
        } else {
          NetworkError::Api(err.to_string())
        }
      })?;

    let status = response.status();
    if status.as_u16() == 429 || status.is_server_error() {
      return Err(NetworkError::Transient(format!("HTTP {status}")));
    }
    if !status.is_success() {
      return Err(NetworkError::Api(format!("HTTP {status}")));
    }

    let body: Value = response
      .json()
      .map_err(|err| NetworkError::MalformedResponse(err.to_string()))?;

    // Rate limiting surfaces as a status-0 envelope, not an HTTP code.
    if body.get("status").and_then(Value::as_str) == Some("0") && is_rate_limited(&body) {
      return Err(NetworkError::Transient(api_message(&body)));
    }
    Ok(body)
  }
}

/// Resolve the API token: explicit argument, then environment, then the OS
/// credential store, then the unauthenticated rate-limited tier.
pub fn resolve_api_key(explicit: Option<String>) -> Option<String> {
  explicit
    .filter(|key| !key.is_empty())
    .or_else(|| {
      std::env::var("ETHERSCAN_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
    })
    .or_else(keyring_token)
}

fn keyring_token() -> Option<String> {
  let entry = keyring::Entry::new("reverify", "etherscan-api-token").ok()?;
  match entry.get_password() {
    Ok(token) if !token.is_empty() => Some(token),
    Ok(_) => None,
    Err(err) => {
      debug!("no API token in credential store: {err}");
      None
    }
  }
}

fn source_from_raw(raw: RawSource, address: &str) -> Result<VerifiedSource, NetworkError> {
  if raw.source_code.is_empty() {
    return Err(NetworkError::NotVerified(address.to_string()));
  }
  let constructor_arguments = if raw.constructor_arguments.is_empty() {
    Vec::new()
  } else {
    hex::decode(raw.constructor_arguments.trim_start_matches("0x")).map_err(|err| {
      NetworkError::MalformedResponse(format!("constructor arguments are not valid hex: {err}"))
    })?
  };
  Ok(VerifiedSource {
    contract_name: raw.contract_name,
    compiler_version: raw.compiler_version,
    optimization_used: raw.optimization_used == "1",
    optimization_runs: raw.runs.parse().unwrap_or(0),
    evm_version: Some(raw.evm_version).filter(|reported| !reported.is_empty()),
    source_code: raw.source_code,
    constructor_arguments,
  })
}

fn decode_code_result(code: &str, address: &str) -> Result<Vec<u8>, NetworkError> {
  let stripped = code.trim_start_matches("0x");
  if stripped.is_empty() {
    return Err(NetworkError::NoContract(address.to_string()));
  }
  hex::decode(stripped)
    .map_err(|err| NetworkError::MalformedResponse(format!("account code is not valid hex: {err}")))
}

fn api_message(body: &Value) -> String {
  let message = body.get("message").and_then(Value::as_str).unwrap_or("");
  let result = body.get("result").and_then(Value::as_str).unwrap_or("");
  match (message.is_empty(), result.is_empty()) {
    (false, false) => format!("{message}: {result}"),
    (false, true) => message.to_string(),
    (true, false) => result.to_string(),
    (true, true) => "unknown explorer error".to_string(),
  }
}

fn is_rate_limited(body: &Value) -> bool {
  api_message(body).to_ascii_lowercase().contains("rate limit")
}

fn api_failure(body: &Value) -> NetworkError {
  if is_rate_limited(body) {
    NetworkError::Transient(api_message(body))
  } else {
    NetworkError::Api(api_message(body))
  }
}
