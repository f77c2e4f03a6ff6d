mod solc;

use std::collections::BTreeMap;

use foundry_compilers::artifacts::{
  Bytecode, BytecodeObject, CompilerOutput, Contract, Offsets,
};
use log::info;
use serde_json::{json, Map, Value};

use crate::assemble::CompilerInput;
use crate::errors::InvokerError;
use crate::normalize::ByteRange;

pub use solc::ensure_installed;

/// Compiler output restricted to the one verification target, immutable
/// after creation.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
  pub runtime_bytecode: Vec<u8>,
  pub deployment_bytecode: Vec<u8>,
  pub immutable_references: BTreeMap<String, Vec<Offsets>>,
  pub link_references: Vec<ByteRange>,
}

impl CompiledArtifact {
  /// All byte ranges in the runtime bytecode that legitimately differ
  /// per deployment: immutable slots plus unresolved library placeholders.
  pub fn mask_ranges(&self) -> Vec<ByteRange> {
    let mut ranges: Vec<ByteRange> = self
      .immutable_references
      .values()
      .flatten()
      .map(|offsets| ByteRange {
        offset: offsets.start as usize,
        length: offsets.length as usize,
      })
      .chain(self.link_references.iter().copied())
      .collect();
    ranges.sort_by_key(|range| (range.offset, range.length));
    ranges.dedup();
    ranges
  }
}

/// Compile the canonical input once and extract the artifact for the
/// reported contract name.
pub fn compile(
  input: &CompilerInput,
  contract_name: &str,
) -> Result<CompiledArtifact, InvokerError> {
  let solc = solc::ensure_installed(&input.version)?;
  let request = standard_json(input);
  info!(
    "compiling {} source file(s) with solc {}",
    input.sources.len(),
    input.version
  );
  let output: CompilerOutput = solc
    .compile_as(&request)
    .map_err(|err| InvokerError::Solc(err.to_string()))?;

  let diagnostics: Vec<String> = output
    .errors
    .iter()
    .filter(|error| error.severity.is_error())
    .map(|error| {
      error
        .formatted_message
        .clone()
        .unwrap_or_else(|| error.message.clone())
    })
    .collect();
  if !diagnostics.is_empty() {
    return Err(InvokerError::CompileDiagnostics(diagnostics));
  }

  let contract = select_contract(&output, contract_name)?;
  extract_artifact(contract, contract_name)
}

/// Serialize the input in reported source order. Built by hand rather than
/// through foundry's sorted source map so ordering survives the round trip.
fn standard_json(input: &CompilerInput) -> Value {
  let mut sources = Map::new();
  for (path, content) in &input.sources {
    sources.insert(path.clone(), json!({ "content": content }));
  }
  json!({
    "language": input.language,
    "sources": sources,
    "settings": input.settings,
  })
}

fn select_contract<'a>(
  output: &'a CompilerOutput,
  contract_name: &str,
) -> Result<&'a Contract, InvokerError> {
  output
    .contracts
    .values()
    .find_map(|contracts| contracts.get(contract_name))
    .ok_or_else(|| InvokerError::ContractNotFound(contract_name.to_string()))
}

fn extract_artifact(
  contract: &Contract,
  contract_name: &str,
) -> Result<CompiledArtifact, InvokerError> {
  let evm = contract
    .evm
    .as_ref()
    .ok_or_else(|| missing_output(contract_name, "evm"))?;
  let deployed = evm
    .deployed_bytecode
    .as_ref()
    .ok_or_else(|| missing_output(contract_name, "evm.deployedBytecode"))?;
  let runtime = deployed
    .bytecode
    .as_ref()
    .ok_or_else(|| missing_output(contract_name, "evm.deployedBytecode.object"))?;
  let deployment = evm
    .bytecode
    .as_ref()
    .ok_or_else(|| missing_output(contract_name, "evm.bytecode.object"))?;

  Ok(CompiledArtifact {
    runtime_bytecode: decode_object(&runtime.object)?,
    deployment_bytecode: decode_object(&deployment.object)?,
    immutable_references: deployed.immutable_references.clone(),
    link_references: link_ranges(runtime),
  })
}

fn missing_output(contract_name: &str, field: &str) -> InvokerError {
  InvokerError::Solc(format!(
    "compiler output for \"{contract_name}\" is missing {field}"
  ))
}

fn link_ranges(bytecode: &Bytecode) -> Vec<ByteRange> {
  bytecode
    .link_references
    .values()
    .flat_map(|contracts| contracts.values())
    .flatten()
    .map(|offsets| ByteRange {
      offset: offsets.start as usize,
      length: offsets.length as usize,
    })
    .collect()
}

/// Decode a bytecode object to raw bytes. Unlinked objects carry 40-char
/// library placeholders in place of addresses; those are zero-filled so the
/// hex decodes, and the same offsets are masked on the deployed side via
/// `link_references`.
fn decode_object(object: &BytecodeObject) -> Result<Vec<u8>, InvokerError> {
  match object {
    BytecodeObject::Bytecode(bytes) => Ok(bytes.to_vec()),
    BytecodeObject::Unlinked(unlinked) => {
      let zeroed = zero_placeholders(unlinked);
      hex::decode(zeroed.trim_start_matches("0x"))
        .map_err(|err| InvokerError::Solc(format!("unlinked bytecode is not valid hex: {err}")))
    }
  }
}

fn zero_placeholders(unlinked: &str) -> String {
  const PLACEHOLDER_CHARS: usize = 40;
  let bytes = unlinked.as_bytes();
  let mut out = String::with_capacity(unlinked.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'_' && i + PLACEHOLDER_CHARS <= bytes.len() {
      out.push_str(&"0".repeat(PLACEHOLDER_CHARS));
      i += PLACEHOLDER_CHARS;
    } else {
      out.push(bytes[i] as char);
      i += 1;
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use semver::Version;

  #[test]
  fn standard_json_preserves_reported_source_order() {
    let input = CompilerInput {
      language: "Solidity".to_string(),
      version: Version::new(0, 8, 20),
      sources: vec![
        ("z/Last.sol".to_string(), "contract Z {}".to_string()),
        ("a/First.sol".to_string(), "contract A {}".to_string()),
      ],
      settings: json!({}),
    };
    let request = standard_json(&input);
    let keys: Vec<&String> = request["sources"].as_object().unwrap().keys().collect();
    assert_eq!(keys, ["z/Last.sol", "a/First.sol"]);
  }

  #[test]
  fn selects_contract_across_files() {
    let output: CompilerOutput = serde_json::from_value(json!({
      "contracts": {
        "A.sol": { "Other": {} },
        "B.sol": { "Token": {} }
      }
    }))
    .expect("parse output");
    assert!(select_contract(&output, "Token").is_ok());
    let err = select_contract(&output, "Missing").unwrap_err();
    assert!(matches!(err, InvokerError::ContractNotFound(name) if name == "Missing"));
  }

  #[test]
  fn extracts_runtime_bytecode_and_immutable_references() {
    let output: CompilerOutput = serde_json::from_value(json!({
      "contracts": {
        "Token.sol": {
          "Token": {
            "evm": {
              "bytecode": { "object": "600160005260206000f3" },
              "deployedBytecode": {
                "object": "6001600101",
                "immutableReferences": {
                  "7": [{ "start": 2, "length": 32 }]
                }
              }
            }
          }
        }
      }
    }))
    .expect("parse output");
    let contract = select_contract(&output, "Token").expect("select");
    let artifact = extract_artifact(contract, "Token").expect("extract");
    assert_eq!(artifact.runtime_bytecode, hex::decode("6001600101").unwrap());
    assert_eq!(
      artifact.deployment_bytecode,
      hex::decode("600160005260206000f3").unwrap()
    );
    let ranges = artifact.mask_ranges();
    assert_eq!(ranges, vec![ByteRange { offset: 2, length: 32 }]);
  }

  #[test]
  fn zeroes_unlinked_library_placeholders() {
    let unlinked = format!("6001{}6002", "__$4e9c22efas7f6ec2f77b7ca2827ed7b852$__");
    let decoded = decode_object(&BytecodeObject::Unlinked(unlinked)).expect("decode");
    let expected = [
      hex::decode("6001").unwrap(),
      vec![0u8; 20],
      hex::decode("6002").unwrap(),
    ]
    .concat();
    assert_eq!(decoded, expected);
  }

  #[test]
  fn zeroes_legacy_underscore_placeholders() {
    let unlinked = format!("60ff{}", "__lib/Math.sol:Math_____________________");
    let decoded = decode_object(&BytecodeObject::Unlinked(unlinked)).expect("decode");
    assert_eq!(decoded, [hex::decode("60ff").unwrap(), vec![0u8; 20]].concat());
  }
}
