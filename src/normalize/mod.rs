//! Reduces compiled and deployed bytecode to a comparable canonical form by
//! zero-filling instance-specific byte ranges and truncating the trailing
//! compiler metadata segment.

use log::debug;

/// A half-open byte range, (offset, length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
  pub offset: usize,
  pub length: usize,
}

/// Bytecode with all per-deployment noise removed. Construction is
/// deterministic: the same bytes and ranges always produce the same value.
/// The metadata trailer is truncated exactly once, at construction;
/// re-applying normalization goes through [`NormalizedBytecode::renormalize`],
/// which never re-runs trailer detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBytecode(Vec<u8>);

impl NormalizedBytecode {
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Re-apply normalization. The trailer was already truncated, so only the
  /// range masking runs; with the same ranges this is the identity, even
  /// when the stripped body happens to end in bytes that parse as another
  /// length word.
  pub fn renormalize(&self, ranges: &[ByteRange]) -> NormalizedBytecode {
    let mut bytes = self.0.clone();
    mask_ranges(&mut bytes, ranges);
    NormalizedBytecode(bytes)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Outcome of trailing-metadata detection for one byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTrailer {
  /// A well-formed trailer of `length` bytes (CBOR segment plus the
  /// two-byte length word) was found and truncated.
  Stripped { length: usize },
  /// The length word points at something that is not a CBOR map; the
  /// sequence is left untouched and metadata bytes participate in the
  /// comparison.
  Malformed,
  Absent,
}

/// Zero-fill each range in `code`. Ranges past the end are clipped to the
/// overlapping prefix; a length mismatch is the comparator's to report.
pub fn mask_ranges(code: &mut [u8], ranges: &[ByteRange]) {
  for range in ranges {
    if range.offset >= code.len() {
      continue;
    }
    let end = code.len().min(range.offset + range.length);
    code[range.offset..end].fill(0);
  }
}

/// Detect the solc self-describing metadata trailer: the last two bytes are
/// a big-endian length `L`, and the `L` bytes before them are a CBOR map
/// (major type 5, 0xa1/0xa2 in practice).
pub fn metadata_trailer(code: &[u8]) -> MetadataTrailer {
  if code.len() < 2 {
    return MetadataTrailer::Absent;
  }
  let declared = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
  if declared == 0 || declared + 2 > code.len() {
    return MetadataTrailer::Malformed;
  }
  let start = code.len() - 2 - declared;
  if code[start] >> 5 != 5 {
    return MetadataTrailer::Malformed;
  }
  MetadataTrailer::Stripped {
    length: declared + 2,
  }
}

/// Truncate a well-formed metadata trailer; on a malformed or absent marker
/// the sequence is returned unchanged.
pub fn strip_metadata(code: &[u8]) -> (&[u8], MetadataTrailer) {
  match metadata_trailer(code) {
    trailer @ MetadataTrailer::Stripped { length } => (&code[..code.len() - length], trailer),
    trailer => {
      if trailer == MetadataTrailer::Malformed {
        debug!("metadata length word does not describe a CBOR trailer; comparing metadata bytes");
      }
      (code, trailer)
    }
  }
}

/// Strip metadata, then zero the instance-specific ranges.
pub fn normalize(code: &[u8], ranges: &[ByteRange]) -> NormalizedBytecode {
  let (stripped, _) = strip_metadata(code);
  let mut bytes = stripped.to_vec();
  mask_ranges(&mut bytes, ranges);
  NormalizedBytecode(bytes)
}

/// Normalize both sides of a comparison with the same mask ranges, then
/// strip a deployed-side surplus that is byte-equal to the reported
/// constructor arguments. Any other surplus stays and surfaces as a length
/// mismatch.
pub fn normalize_pair(
  compiled: &[u8],
  deployed: &[u8],
  ranges: &[ByteRange],
  constructor_args: &[u8],
) -> (NormalizedBytecode, NormalizedBytecode) {
  let compiled = normalize(compiled, ranges);
  let mut deployed = normalize(deployed, ranges);
  strip_constructor_suffix(&mut deployed, compiled.len(), constructor_args);
  (compiled, deployed)
}

fn strip_constructor_suffix(
  deployed: &mut NormalizedBytecode,
  compiled_len: usize,
  constructor_args: &[u8],
) {
  if constructor_args.is_empty() || deployed.len() <= compiled_len {
    return;
  }
  if &deployed.0[compiled_len..] == constructor_args {
    debug!(
      "stripping {} constructor argument byte(s) from deployed bytecode",
      constructor_args.len()
    );
    deployed.0.truncate(compiled_len);
  }
}
