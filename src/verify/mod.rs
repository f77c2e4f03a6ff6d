//! The verification pipeline: assemble, compile, normalize both sides,
//! compare. Strictly sequential; each run owns its own buffers.

use log::{debug, info};
use semver::Version;

use crate::assemble;
use crate::compare::{self, ComparisonResult};
use crate::errors::{NetworkError, VerifyError};
use crate::explorer::ExplorerClient;
use crate::invoker;
use crate::normalize::{self, NormalizedBytecode};

/// Everything a reporting collaborator needs to render one run's outcome.
#[derive(Debug, Clone)]
pub struct Verification {
  pub address: String,
  pub contract_name: String,
  pub compiler_version: Version,
  pub compiled: NormalizedBytecode,
  pub deployed: NormalizedBytecode,
  pub result: ComparisonResult,
}

/// Run one full verification for an address. A mismatch is an `Ok` outcome
/// carrying `result.matched == false`; only pipeline failures are `Err`.
pub fn verify_address(
  client: &ExplorerClient,
  address: &str,
  block: Option<u64>,
) -> Result<Verification, VerifyError> {
  info!("verifying contract at {address}");
  let meta = client.verified_source(address)?;
  info!(
    "explorer reports contract {} built with {}",
    meta.contract_name, meta.compiler_version
  );

  let deployed_raw = client.deployed_bytecode(address, block)?;
  reject_empty(address, &deployed_raw)?;
  debug!("fetched {} deployed byte(s)", deployed_raw.len());

  let input = assemble::assemble(&meta)?;
  let artifact = invoker::compile(&input, &meta.contract_name)?;
  debug!(
    "compiled runtime bytecode: {} byte(s), {} immutable slot(s)",
    artifact.runtime_bytecode.len(),
    artifact.immutable_references.len()
  );

  let ranges = artifact.mask_ranges();
  let (compiled, deployed) = normalize::normalize_pair(
    &artifact.runtime_bytecode,
    &deployed_raw,
    &ranges,
    &meta.constructor_arguments,
  );
  let result = compare::compare(&compiled, &deployed);

  Ok(Verification {
    address: address.to_string(),
    contract_name: meta.contract_name,
    compiler_version: input.version,
    compiled,
    deployed,
    result,
  })
}

fn reject_empty(address: &str, deployed: &[u8]) -> Result<(), NetworkError> {
  if deployed.is_empty() {
    return Err(NetworkError::NoContract(address.to_string()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_deployed_bytecode_is_no_contract_not_a_mismatch() {
    let err = reject_empty("0xabc", &[]).unwrap_err();
    assert!(matches!(err, NetworkError::NoContract(address) if address == "0xabc"));
    reject_empty("0xabc", &[0x60]).expect("non-empty code passes");
  }
}
