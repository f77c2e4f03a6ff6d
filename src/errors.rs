use semver::Version;
use thiserror::Error;

/// Failures while shaping an explorer payload into a compiler input.
#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error("source payload does not match any recognized format")]
  UnrecognizedFormat,
  #[error("import \"{0}\" does not resolve to any supplied source file")]
  UnresolvedImport(String),
  #[error("unsupported compiler toolchain \"{0}\"")]
  UnsupportedToolchain(String),
  #[error("failed to parse compiler version \"{version}\": {source}")]
  InvalidVersion {
    version: String,
    #[source]
    source: semver::Error,
  },
  #[error("malformed source payload: {0}")]
  MalformedPayload(#[from] serde_json::Error),
}

/// Failures while resolving or running the compiler toolchain.
#[derive(Debug, Error)]
pub enum InvokerError {
  #[error("solc {0} is not available and could not be installed")]
  VersionUnavailable(Version),
  #[error("compiler reported errors:\n{}", .0.join("\n"))]
  CompileDiagnostics(Vec<String>),
  #[error("contract \"{0}\" not found in compiler output")]
  ContractNotFound(String),
  #[error("solc invocation failed: {0}")]
  Solc(String),
}

/// Failures talking to the explorer. Only `Transient` is ever retried.
#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("transient network failure: {0}")]
  Transient(String),
  #[error("explorer API error: {0}")]
  Api(String),
  #[error("no contract deployed at {0}")]
  NoContract(String),
  #[error("no verified source published for {0}")]
  NotVerified(String),
  #[error("malformed explorer response: {0}")]
  MalformedResponse(String),
}

/// Any pipeline-stage failure. A failed comparison is not an error; it is
/// the computed answer "no" and travels as a `ComparisonResult`.
#[derive(Debug, Error)]
pub enum VerifyError {
  #[error(transparent)]
  Assembly(#[from] AssemblyError),
  #[error(transparent)]
  Invoker(#[from] InvokerError),
  #[error(transparent)]
  Network(#[from] NetworkError),
}
