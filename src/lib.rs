//! Independent bytecode verification for EVM contracts: compile the
//! explorer-published source under the reported settings, normalize away
//! per-deployment noise (immutable values, library placeholders, metadata
//! hashes), and compare byte-for-byte against the code actually stored
//! on chain.

pub mod assemble;
pub mod compare;
pub mod disasm;
pub mod errors;
pub mod explorer;
pub mod invoker;
pub mod normalize;
pub mod report;
pub mod verify;

pub use assemble::{CompilerInput, SourcePayload};
pub use compare::ComparisonResult;
pub use errors::{AssemblyError, InvokerError, NetworkError, VerifyError};
pub use explorer::{resolve_api_key, ExplorerClient, VerifiedSource};
pub use invoker::CompiledArtifact;
pub use normalize::{ByteRange, MetadataTrailer, NormalizedBytecode};
pub use verify::{verify_address, Verification};
