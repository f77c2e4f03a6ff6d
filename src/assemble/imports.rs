use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::AssemblyError;

fn import_re() -> &'static Regex {
  static IMPORT_RE: OnceLock<Regex> = OnceLock::new();
  IMPORT_RE.get_or_init(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:(?:\*\s*as\s*\w+|\{[^}]*\})\s+from\s+)?["']([^"']+)["']"#)
      .expect("import pattern is valid")
  })
}

/// Statically resolve every import directive against the supplied file set,
/// failing before the compiler runs rather than delegating an opaque
/// compiler error.
pub fn check_imports(
  sources: &[(String, String)],
  remappings: &[String],
) -> Result<(), AssemblyError> {
  let paths: BTreeSet<&str> = sources.iter().map(|(path, _)| path.as_str()).collect();

  for (importer, content) in sources {
    for captures in import_re().captures_iter(content) {
      let spec = &captures[1];
      if !resolves(spec, importer, &paths, remappings) {
        return Err(AssemblyError::UnresolvedImport(spec.to_string()));
      }
    }
  }
  Ok(())
}

fn resolves(
  spec: &str,
  importer: &str,
  paths: &BTreeSet<&str>,
  remappings: &[String],
) -> bool {
  let candidate = if spec.starts_with("./") || spec.starts_with("../") {
    join_virtual(parent_dir(importer), spec)
  } else {
    apply_remappings(spec, remappings)
  };

  if paths.contains(candidate.as_str()) {
    return true;
  }
  // Tolerate explorer payloads keyed by longer virtual prefixes, as long
  // as the suffix match lands on a path-segment boundary.
  paths.iter().any(|path| {
    path.ends_with(candidate.as_str())
      && path[..path.len() - candidate.len()].ends_with('/')
  })
}

fn apply_remappings(spec: &str, remappings: &[String]) -> String {
  for remapping in remappings {
    // Context-scoped remappings look like "context:prefix=target".
    let mapping = remapping
      .split_once(':')
      .map(|(_, mapping)| mapping)
      .unwrap_or(remapping);
    if let Some((prefix, target)) = mapping.split_once('=') {
      if spec.starts_with(prefix) {
        return format!("{target}{}", &spec[prefix.len()..]);
      }
    }
  }
  spec.to_string()
}

fn parent_dir(path: &str) -> &str {
  path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join_virtual(base: &str, relative: &str) -> String {
  let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
  for segment in relative.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop();
      }
      other => segments.push(other),
    }
  }
  segments.join("/")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sources(entries: &[(&str, &str)]) -> Vec<(String, String)> {
    entries
      .iter()
      .map(|(path, content)| (path.to_string(), content.to_string()))
      .collect()
  }

  #[test]
  fn resolves_relative_import_against_importer_dir() {
    let files = sources(&[
      ("contracts/Token.sol", "import \"./lib/Math.sol\";"),
      ("contracts/lib/Math.sol", "library Math {}"),
    ]);
    check_imports(&files, &[]).expect("imports resolve");
  }

  #[test]
  fn resolves_parent_relative_import() {
    let files = sources(&[
      ("contracts/lib/Math.sol", "import \"../Token.sol\";"),
      ("contracts/Token.sol", "contract Token {}"),
    ]);
    check_imports(&files, &[]).expect("imports resolve");
  }

  #[test]
  fn resolves_bare_specifier_through_remapping() {
    let files = sources(&[
      ("Token.sol", "import \"@oz/token/ERC20.sol\";"),
      ("lib/oz/token/ERC20.sol", "contract ERC20 {}"),
    ]);
    check_imports(&files, &["@oz/=lib/oz/".to_string()]).expect("imports resolve");
  }

  #[test]
  fn resolves_named_import_form() {
    let files = sources(&[
      ("A.sol", "import {Thing} from \"./B.sol\";"),
      ("B.sol", "contract Thing {}"),
    ]);
    check_imports(&files, &[]).expect("imports resolve");
  }

  #[test]
  fn reports_missing_import_by_path() {
    let files = sources(&[("Token.sol", "import \"./Gone.sol\";")]);
    let err = check_imports(&files, &[]).unwrap_err();
    match err {
      AssemblyError::UnresolvedImport(path) => assert_eq!(path, "./Gone.sol"),
      other => panic!("expected unresolved import, got {other:?}"),
    }
  }

  #[test]
  fn suffix_match_requires_segment_boundary() {
    let files = sources(&[("Token.sol", "import \"Math.sol\";"), ("NotMath.sol", "")]);
    assert!(check_imports(&files, &[]).is_err());
  }
}
