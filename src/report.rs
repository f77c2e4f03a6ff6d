//! Human-readable rendering of a verification outcome.

use std::fmt::Write;

use crate::disasm;
use crate::normalize::ByteRange;
use crate::verify::Verification;

const PREVIEW_BYTES: usize = 64;
const MAX_RENDERED_SEGMENTS: usize = 8;

/// Render the report for one run. With `disassemble` set, divergent
/// regions are decoded to opcodes for both sequences.
pub fn render(verification: &Verification, disassemble: bool) -> String {
  let mut out = String::new();
  let result = &verification.result;

  if result.matched {
    let _ = writeln!(
      out,
      "VERIFICATION SUCCESSFUL: {} at {} matches its published source ({} bytes, solc {})",
      verification.contract_name,
      verification.address,
      result.compiled_length,
      verification.compiler_version,
    );
    return out;
  }

  let _ = writeln!(
    out,
    "VERIFICATION FAILED: {} at {} does not match its published source",
    verification.contract_name, verification.address,
  );
  let _ = writeln!(out, "  compiled length: {} bytes", result.compiled_length);
  let _ = writeln!(out, "  deployed length: {} bytes", result.deployed_length);
  if let Some(offset) = result.first_divergence_offset {
    let _ = writeln!(out, "  first divergence at byte 0x{offset:04x}");
  }
  let _ = writeln!(
    out,
    "  compiled preview: {}",
    hex_preview(verification.compiled.as_bytes())
  );
  let _ = writeln!(
    out,
    "  deployed preview: {}",
    hex_preview(verification.deployed.as_bytes())
  );

  let _ = writeln!(
    out,
    "  {} divergent segment(s):",
    result.divergent_segments.len()
  );
  for segment in result.divergent_segments.iter().take(MAX_RENDERED_SEGMENTS) {
    let _ = writeln!(
      out,
      "    offset 0x{:04x}, {} byte(s)",
      segment.offset, segment.length
    );
    if disassemble {
      render_segment(&mut out, "compiled", verification.compiled.as_bytes(), segment);
      render_segment(&mut out, "deployed", verification.deployed.as_bytes(), segment);
    }
  }
  if result.divergent_segments.len() > MAX_RENDERED_SEGMENTS {
    let _ = writeln!(
      out,
      "    ... {} more segment(s) elided",
      result.divergent_segments.len() - MAX_RENDERED_SEGMENTS
    );
  }
  out
}

fn render_segment(out: &mut String, label: &str, code: &[u8], segment: &ByteRange) {
  if segment.offset >= code.len() {
    let _ = writeln!(out, "      {label}: past end of sequence");
    return;
  }
  let end = code.len().min(segment.offset + segment.length.max(1));
  let _ = writeln!(out, "      {label}:");
  // Decode from the start of the sequence so push immediates stay aligned,
  // then keep only the instructions overlapping this segment.
  let overlapping = disasm::disassemble(code)
    .skip_while(|instruction| {
      instruction.offset + 1 + instruction.operand.len() <= segment.offset
    })
    .take_while(|instruction| instruction.offset < end);
  for instruction in overlapping {
    let _ = writeln!(out, "        {instruction}");
  }
}

fn hex_preview(bytes: &[u8]) -> String {
  if bytes.len() <= PREVIEW_BYTES {
    format!("0x{}", hex::encode(bytes))
  } else {
    format!("0x{}...", hex::encode(&bytes[..PREVIEW_BYTES]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compare::compare;
  use crate::normalize::normalize;
  use crate::verify::Verification;
  use semver::Version;

  fn verification(compiled_raw: &[u8], deployed_raw: &[u8]) -> Verification {
    let compiled = normalize(compiled_raw, &[]);
    let deployed = normalize(deployed_raw, &[]);
    let result = compare(&compiled, &deployed);
    Verification {
      address: "0xdeadbeef".to_string(),
      contract_name: "Token".to_string(),
      compiler_version: Version::new(0, 8, 20),
      compiled,
      deployed,
      result,
    }
  }

  #[test]
  fn match_renders_single_success_line() {
    let report = render(&verification(&[0x60, 0x01], &[0x60, 0x01]), false);
    assert!(report.starts_with("VERIFICATION SUCCESSFUL"));
    assert_eq!(report.lines().count(), 1);
  }

  #[test]
  fn mismatch_renders_lengths_and_segments() {
    let report = render(&verification(&[0x60, 0x01, 0x00], &[0x60, 0x02, 0x00]), false);
    assert!(report.starts_with("VERIFICATION FAILED"));
    assert!(report.contains("compiled length: 3 bytes"));
    assert!(report.contains("first divergence at byte 0x0001"));
    assert!(report.contains("offset 0x0001, 1 byte(s)"));
  }

  #[test]
  fn disassembly_is_rendered_on_request_only() {
    let quiet = render(&verification(&[0x60, 0x01], &[0x60, 0x02]), false);
    assert!(!quiet.contains("PUSH1"));
    let verbose = render(&verification(&[0x60, 0x01], &[0x60, 0x02]), true);
    assert!(verbose.contains("PUSH1"));
  }
}
