//! End-to-end properties of the normalize-then-compare pipeline, exercised
//! on synthetic bytecode without a compiler in the loop.

use reverify::compare::compare;
use reverify::normalize::{normalize, normalize_pair, ByteRange};

/// 300 bytes of JUMPDEST padding whose tail never looks like a metadata
/// trailer (length word 0x0000 is rejected as malformed, so nothing is
/// truncated).
fn runtime_bytecode() -> Vec<u8> {
  let mut code = vec![0x5b; 300];
  code[298] = 0x00;
  code[299] = 0x00;
  code
}

#[test]
fn identical_bytecode_with_no_references_matches() {
  let code = runtime_bytecode();
  let (compiled, deployed) = normalize_pair(&code, &code, &[], &[]);
  let result = compare(&compiled, &deployed);
  assert!(result.matched);
  assert_eq!(result.compiled_length, 300);
  assert_eq!(result.deployed_length, 300);
}

#[test]
fn baked_in_immutable_value_matches_after_masking() {
  // One constructor-set immutable word: slot at offset 150, length 32.
  let compiled_raw = runtime_bytecode();
  let mut deployed_raw = compiled_raw.clone();
  deployed_raw[150..182].copy_from_slice(&{
    let mut word = [0u8; 32];
    word[31] = 42;
    word
  });

  let slot = [ByteRange {
    offset: 150,
    length: 32,
  }];
  let (compiled, deployed) = normalize_pair(&compiled_raw, &deployed_raw, &slot, &[]);
  let result = compare(&compiled, &deployed);
  assert!(result.matched);
}

#[test]
fn extra_trailing_byte_is_a_length_mismatch() {
  let compiled_raw = runtime_bytecode();
  let mut deployed_raw = compiled_raw.clone();
  deployed_raw[150..182].copy_from_slice(&{
    let mut word = [0u8; 32];
    word[31] = 42;
    word
  });
  deployed_raw.push(0xfe);

  let slot = [ByteRange {
    offset: 150,
    length: 32,
  }];
  let (compiled, deployed) = normalize_pair(&compiled_raw, &deployed_raw, &slot, &[]);
  let result = compare(&compiled, &deployed);
  assert!(!result.matched);
  assert_eq!(result.compiled_length, 300);
  assert_eq!(result.deployed_length, 301);
  assert_eq!(result.first_divergence_offset, Some(300));
}

#[test]
fn single_byte_difference_outside_masked_ranges_is_reported() {
  let compiled_raw = runtime_bytecode();
  let mut deployed_raw = compiled_raw.clone();
  deployed_raw[120] = 0x00;

  let slot = [ByteRange {
    offset: 150,
    length: 32,
  }];
  let (compiled, deployed) = normalize_pair(&compiled_raw, &deployed_raw, &slot, &[]);
  let result = compare(&compiled, &deployed);
  assert!(!result.matched);
  assert_eq!(result.first_divergence_offset, Some(120));
  assert_eq!(
    result.divergent_segments,
    vec![ByteRange {
      offset: 120,
      length: 1,
    }]
  );
}

#[test]
fn masking_is_symmetric_across_both_sides() {
  let mut a = runtime_bytecode();
  let mut b = runtime_bytecode();
  a[10] = 0x11;
  b[10] = 0x22;
  b[200] = 0x33;

  let ranges = [ByteRange {
    offset: 10,
    length: 4,
  }];
  let forward = compare(&normalize(&a, &ranges), &normalize(&b, &ranges));
  let backward = compare(&normalize(&b, &ranges), &normalize(&a, &ranges));
  assert_eq!(forward.matched, backward.matched);
  assert_eq!(forward.divergent_segments, backward.divergent_segments);
  assert_eq!(
    forward.first_divergence_offset,
    backward.first_divergence_offset
  );
}

#[test]
fn normalization_is_idempotent_over_the_full_pipeline() {
  // Body with a real metadata trailer appended, where the stripped body
  // itself ends in a length word pointing at a CBOR map byte. Only the
  // real trailer may ever come off.
  let mut code = vec![0x5b; 297];
  code[294] = 0xa1;
  code[295] = 0x00;
  code[296] = 0x01;
  code.extend_from_slice(&[0xa2, 0x64, 0x69, 0x70, 0x00, 0x04]);

  let ranges = [ByteRange {
    offset: 150,
    length: 32,
  }];
  let once = normalize(&code, &ranges);
  assert_eq!(once.len(), 297);
  let twice = once.renormalize(&ranges);
  assert_eq!(once, twice);
}
