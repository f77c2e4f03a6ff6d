use crate::normalize::{ByteRange, NormalizedBytecode};

/// The terminal verdict of a verification run. `matched == false` is not an
/// error; it is the successfully computed answer "no".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
  pub matched: bool,
  pub compiled_length: usize,
  pub deployed_length: usize,
  /// Offset of the first differing byte, or the common-prefix length when
  /// the shorter sequence is a strict prefix of the longer.
  pub first_divergence_offset: Option<usize>,
  /// Maximal runs of differing positions, in ascending offset order.
  pub divergent_segments: Vec<ByteRange>,
}

/// Byte-exact comparison of two normalized bytecode sequences. Zero
/// tolerance here; all semantic leniency lives in the normalizer.
pub fn compare(compiled: &NormalizedBytecode, deployed: &NormalizedBytecode) -> ComparisonResult {
  let a = compiled.as_bytes();
  let b = deployed.as_bytes();

  if a == b {
    return ComparisonResult {
      matched: true,
      compiled_length: a.len(),
      deployed_length: b.len(),
      first_divergence_offset: None,
      divergent_segments: Vec::new(),
    };
  }

  let common = a.len().min(b.len());
  let mut segments: Vec<ByteRange> = Vec::new();
  let mut first_divergence = None;
  let mut run_start: Option<usize> = None;

  for offset in 0..common {
    if a[offset] != b[offset] {
      if first_divergence.is_none() {
        first_divergence = Some(offset);
      }
      if run_start.is_none() {
        run_start = Some(offset);
      }
    } else if let Some(start) = run_start.take() {
      segments.push(ByteRange {
        offset: start,
        length: offset - start,
      });
    }
  }
  if let Some(start) = run_start.take() {
    segments.push(ByteRange {
      offset: start,
      length: common - start,
    });
  }

  if a.len() != b.len() {
    if first_divergence.is_none() {
      first_divergence = Some(common);
    }
    let tail = a.len().max(b.len()) - common;
    match segments.last_mut() {
      Some(last) if last.offset + last.length == common => last.length += tail,
      _ => segments.push(ByteRange {
        offset: common,
        length: tail,
      }),
    }
  }

  ComparisonResult {
    matched: false,
    compiled_length: a.len(),
    deployed_length: b.len(),
    first_divergence_offset: first_divergence,
    divergent_segments: segments,
  }
}
