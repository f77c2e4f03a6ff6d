mod imports;

use semver::Version;
use serde_json::{json, Map, Value};

use crate::errors::AssemblyError;
use crate::explorer::VerifiedSource;

pub use imports::check_imports;

/// Output selection forced onto every compile: everything the verification
/// pipeline consumes downstream, nothing more.
const OUTPUT_SELECTION: [&str; 4] = [
  "evm.bytecode.object",
  "evm.deployedBytecode.object",
  "evm.deployedBytecode.immutableReferences",
  "metadata",
];

/// The three shapes an explorer reports verified sources in, resolved once
/// at ingestion.
#[derive(Debug, Clone)]
pub enum SourcePayload {
  /// A single flat source blob with no file-path structure.
  SingleFile { name: String, content: String },
  /// An ordered mapping of virtual file path to source text.
  MultiFile(Vec<(String, String)>),
  /// A pre-formed standard-JSON compiler input document.
  StandardJson(Map<String, Value>),
}

/// Canonical compiler-ready project. Source ordering is preserved exactly as
/// the explorer reported it.
#[derive(Debug, Clone)]
pub struct CompilerInput {
  pub language: String,
  pub version: Version,
  pub sources: Vec<(String, String)>,
  pub settings: Value,
}

/// Normalize an explorer payload plus reported settings into one canonical
/// compiler input, failing fast on unresolved imports.
pub fn assemble(meta: &VerifiedSource) -> Result<CompilerInput, AssemblyError> {
  let version = parse_compiler_version(&meta.compiler_version)?;
  let payload = detect_payload(&meta.source_code, &meta.contract_name)?;

  let (sources, doc_settings, language) = match payload {
    SourcePayload::SingleFile { name, content } => {
      (vec![(name, content)], None, "Solidity".to_string())
    }
    SourcePayload::MultiFile(files) => (files, None, "Solidity".to_string()),
    SourcePayload::StandardJson(doc) => {
      let language = doc
        .get("language")
        .and_then(Value::as_str)
        .unwrap_or("Solidity")
        .to_string();
      let sources = doc
        .get("sources")
        .map(sources_from_value)
        .transpose()?
        .ok_or(AssemblyError::UnrecognizedFormat)?;
      (sources, doc.get("settings").cloned(), language)
    }
  };

  if !language.eq_ignore_ascii_case("solidity") {
    return Err(AssemblyError::UnsupportedToolchain(language));
  }

  let settings = build_settings(doc_settings, meta);
  let remappings = remappings_from_settings(&settings);
  imports::check_imports(&sources, &remappings)?;

  Ok(CompilerInput {
    language,
    version,
    sources,
    settings,
  })
}

/// Detect which of the three payload shapes was supplied.
pub fn detect_payload(raw: &str, contract_name: &str) -> Result<SourcePayload, AssemblyError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(AssemblyError::UnrecognizedFormat);
  }

  // Etherscan wraps full input documents in a second pair of braces.
  if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
    let inner = &trimmed[1..trimmed.len() - 1];
    let doc: Map<String, Value> = serde_json::from_str(inner)?;
    return Ok(SourcePayload::StandardJson(doc));
  }

  if trimmed.starts_with('{') {
    let value: Value = serde_json::from_str(trimmed)?;
    let object = match value {
      Value::Object(object) => object,
      _ => return Err(AssemblyError::UnrecognizedFormat),
    };
    if object.contains_key("sources")
      || (object.contains_key("language") && object.contains_key("settings"))
    {
      return Ok(SourcePayload::StandardJson(object));
    }
    let files = sources_from_value(&Value::Object(object))?;
    return Ok(SourcePayload::MultiFile(files));
  }

  Ok(SourcePayload::SingleFile {
    name: format!("{contract_name}.sol"),
    content: raw.to_string(),
  })
}

/// Parse an explorer-reported compiler version string such as
/// "v0.8.20+commit.a1b79de6" into a plain semver version.
pub fn parse_compiler_version(reported: &str) -> Result<Version, AssemblyError> {
  let lowered = reported.to_ascii_lowercase();
  if lowered.contains("vyper") {
    return Err(AssemblyError::UnsupportedToolchain(reported.to_string()));
  }

  let trimmed = reported.trim().trim_start_matches('v');
  let core = trimmed.split('+').next().unwrap_or(trimmed);
  let version = Version::parse(core).map_err(|source| AssemblyError::InvalidVersion {
    version: reported.to_string(),
    source,
  })?;
  // Nightly and other pre-release builds are a documented gap, not
  // something to silently approximate with the nearest release.
  if !version.pre.is_empty() {
    return Err(AssemblyError::UnsupportedToolchain(reported.to_string()));
  }
  Ok(version)
}

fn sources_from_value(value: &Value) -> Result<Vec<(String, String)>, AssemblyError> {
  let object = value
    .as_object()
    .ok_or(AssemblyError::UnrecognizedFormat)?;
  let mut files = Vec::with_capacity(object.len());
  for (path, entry) in object {
    let content = match entry {
      Value::Object(fields) => fields
        .get("content")
        .and_then(Value::as_str)
        .ok_or(AssemblyError::UnrecognizedFormat)?,
      Value::String(content) => content.as_str(),
      _ => return Err(AssemblyError::UnrecognizedFormat),
    };
    files.push((path.clone(), content.to_string()));
  }
  if files.is_empty() {
    return Err(AssemblyError::UnrecognizedFormat);
  }
  Ok(files)
}

/// Overlay reported optimizer/EVM settings onto whatever the payload carried
/// and force the output selection the pipeline needs.
fn build_settings(doc_settings: Option<Value>, meta: &VerifiedSource) -> Value {
  let mut settings = match doc_settings {
    Some(Value::Object(map)) => Value::Object(map),
    _ => json!({}),
  };

  if settings.get("optimizer").map_or(false, Value::is_object) {
    if let Some(optimizer) = settings
      .get_mut("optimizer")
      .and_then(Value::as_object_mut)
    {
      // Older solc builds reject optimizer detail keys they predate.
      optimizer.remove("details");
    }
  } else {
    settings["optimizer"] = json!({
      "enabled": meta.optimization_used,
      "runs": meta.optimization_runs,
    });
  }

  if settings.get("evmVersion").is_none() {
    if let Some(evm_version) = meta
      .evm_version
      .as_deref()
      .filter(|reported| !reported.eq_ignore_ascii_case("default"))
    {
      settings["evmVersion"] = json!(evm_version.to_ascii_lowercase());
    }
  }

  settings["outputSelection"] = json!({ "*": { "*": OUTPUT_SELECTION } });
  settings
}

fn remappings_from_settings(settings: &Value) -> Vec<String> {
  settings
    .get("remappings")
    .and_then(Value::as_array)
    .map(|entries| {
      entries
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
    })
    .unwrap_or_default()
}
