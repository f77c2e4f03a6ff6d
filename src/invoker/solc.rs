use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use foundry_compilers::solc::Solc;
use log::{info, warn};
use semver::Version;

use crate::errors::InvokerError;

const INSTALL_ATTEMPTS: usize = 3;
const INSTALL_BACKOFF_MS: u64 = 500;

fn install_mutex() -> &'static Mutex<()> {
  static INSTALL_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
  INSTALL_MUTEX.get_or_init(|| Mutex::new(()))
}

pub(crate) fn find_installed_version(version: &Version) -> Result<Option<Solc>, InvokerError> {
  Solc::find_svm_installed_version(version).map_err(|err| InvokerError::Solc(err.to_string()))
}

/// Resolve the exact solc version to a runnable binary, installing it into
/// the svm cache if absent. Installs are serialized process-wide and retried
/// a bounded number of times; a cached version makes this a no-op.
pub fn ensure_installed(version: &Version) -> Result<Solc, InvokerError> {
  if let Some(solc) = find_installed_version(version)? {
    return Ok(solc);
  }

  let _guard = install_mutex()
    .lock()
    .map_err(|err| InvokerError::Solc(format!("solc install mutex poisoned: {err}")))?;

  // Another run may have finished the install while we waited on the lock.
  if let Some(solc) = find_installed_version(version)? {
    return Ok(solc);
  }

  for attempt in 1..=INSTALL_ATTEMPTS {
    match Solc::blocking_install(version) {
      Ok(solc) => {
        info!("installed solc {version}");
        return Ok(solc);
      }
      Err(err) => {
        warn!("solc {version} install attempt {attempt}/{INSTALL_ATTEMPTS} failed: {err}");
        if attempt < INSTALL_ATTEMPTS {
          thread::sleep(Duration::from_millis(INSTALL_BACKOFF_MS << (attempt - 1)));
        }
      }
    }
  }

  Err(InvokerError::VersionUnavailable(version.clone()))
}
