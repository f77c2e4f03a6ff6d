use std::error::Error;
use std::process::ExitCode;

use clap::Parser;

use reverify::explorer::{resolve_api_key, ExplorerClient};
use reverify::{report, verify_address};

/// Verify that the bytecode deployed at an address matches its published
/// source code.
#[derive(Debug, Parser)]
#[command(name = "reverify", version)]
struct Cli {
  /// Contract address to verify.
  address: String,
  /// Explorer API token. Falls back to ETHERSCAN_API_KEY, then the OS
  /// credential store, then the unauthenticated rate-limited tier.
  #[arg(long)]
  api_key: Option<String>,
  /// Chain id passed to the explorer API.
  #[arg(long, default_value_t = 1)]
  chain_id: u64,
  /// Fetch deployed bytecode as of this block instead of the chain head.
  #[arg(long)]
  block: Option<u64>,
  /// Render opcode-level disassembly of divergent regions on mismatch.
  #[arg(long)]
  disassemble: bool,
}

fn main() -> ExitCode {
  env_logger::init();
  let cli = Cli::parse();

  let api_key = resolve_api_key(cli.api_key.clone());
  let client = match ExplorerClient::new(cli.chain_id, api_key) {
    Ok(client) => client,
    Err(err) => return fail(&err),
  };

  match verify_address(&client, &cli.address, cli.block) {
    Ok(verification) => {
      print!("{}", report::render(&verification, cli.disassemble));
      if verification.result.matched {
        ExitCode::SUCCESS
      } else {
        ExitCode::from(1)
      }
    }
    Err(err) => fail(&err),
  }
}

fn fail(err: &dyn Error) -> ExitCode {
  eprintln!("error: {err}");
  let mut cause = err.source();
  while let Some(inner) = cause {
    eprintln!("  caused by: {inner}");
    cause = inner.source();
  }
  ExitCode::from(2)
}
