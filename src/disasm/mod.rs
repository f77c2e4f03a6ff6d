//! Opcode-level decoding of raw bytecode, used only to render diagnostics
//! for divergent regions. Never participates in the pass/fail decision.

mod opcodes;

use std::fmt;

pub use opcodes::{immediate_size, mnemonic};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
  pub offset: usize,
  pub opcode: u8,
  /// Mnemonic from the fixed opcode table; `None` for undefined bytes.
  pub mnemonic: Option<&'static str>,
  /// Immediate operand bytes for push-style instructions.
  pub operand: Vec<u8>,
  /// A push whose immediate runs past the end of the sequence.
  pub truncated: bool,
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "0x{:04x}: {}",
      self.offset,
      self.mnemonic.unwrap_or("UNDEFINED")
    )?;
    if self.mnemonic.is_none() {
      write!(f, "(0x{:02x})", self.opcode)?;
    }
    if !self.operand.is_empty() {
      write!(f, " 0x{}", hex::encode(&self.operand))?;
    }
    if self.truncated {
      write!(f, " <truncated>")?;
    }
    Ok(())
  }
}

/// Lazy, finite, restartable instruction decoder over a byte slice.
#[derive(Debug, Clone)]
pub struct Disassembly<'a> {
  code: &'a [u8],
  offset: usize,
}

pub fn disassemble(code: &[u8]) -> Disassembly<'_> {
  Disassembly { code, offset: 0 }
}

impl<'a> Iterator for Disassembly<'a> {
  type Item = Instruction;

  fn next(&mut self) -> Option<Instruction> {
    if self.offset >= self.code.len() {
      return None;
    }
    let at = self.offset;
    let opcode = self.code[at];
    let wanted = immediate_size(opcode);
    let available = wanted.min(self.code.len() - at - 1);
    let operand = self.code[at + 1..at + 1 + available].to_vec();
    self.offset = at + 1 + available;
    Some(Instruction {
      offset: at,
      opcode,
      mnemonic: mnemonic(opcode),
      operand,
      truncated: available < wanted,
    })
  }
}
