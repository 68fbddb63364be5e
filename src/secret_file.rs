//! Lifecycle of the generated values file.
//!
//! The values file carries the Grafana Cloud token, so it exists only for the
//! duration of the install:
//!
//! 1. **Restricted permissions**: written to a 0600 temp file in the target
//!    directory and renamed into place
//! 2. **Scoped**: `SecretFile` removes the file on drop (return, error, unwind)
//! 3. **Signal-safe**: every live path is listed in a global registry that the
//!    signal handler wipes before exiting
//! 4. **Secure deletion**: `shred -u -z` when available, otherwise overwrite
//!    with zeros and unlink
//!
//! The only way to keep the file is `SecretFile::retain`.

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

static SECRET_REGISTRY: OnceLock<Mutex<SecretRegistry>> = OnceLock::new();

/// Paths of secret files that must not outlive the process.
#[derive(Debug, Default)]
pub struct SecretRegistry {
    paths: Vec<PathBuf>,
}

impl SecretRegistry {
    /// Get or create the global registry
    pub fn global() -> &'static Mutex<SecretRegistry> {
        SECRET_REGISTRY.get_or_init(|| Mutex::new(SecretRegistry::default()))
    }

    pub fn register(&mut self, path: &Path) {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
        debug!("Registered secret file {:?}", path);
    }

    pub fn unregister(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Destroy every registered file. Used on the signal path.
    pub fn wipe_all(&mut self) {
        for path in self.paths.drain(..) {
            destroy(&path);
        }
    }
}

fn with_registry(f: impl FnOnce(&mut SecretRegistry)) {
    // A poisoned lock still holds valid paths
    let mut guard = match SecretRegistry::global().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

/// Scoped owner of an on-disk file containing credentials.
#[derive(Debug)]
pub struct SecretFile {
    path: PathBuf,
    retained: bool,
}

impl SecretFile {
    /// Atomically write `contents` to `path` with mode 0600.
    ///
    /// An existing file at `path` is replaced.
    pub fn create(path: impl Into<PathBuf>, contents: &str) -> io::Result<Self> {
        let path = path.into();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".k8smon-values-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        with_registry(|r| r.register(tmp.path()));

        let written = (|| -> io::Result<()> {
            tmp.as_file()
                .set_permissions(Permissions::from_mode(0o600))?;
            tmp.write_all(contents.as_bytes())?;
            tmp.as_file().sync_all()
        })();
        let tmp_path = tmp.path().to_path_buf();
        if let Err(e) = written {
            with_registry(|r| r.unregister(&tmp_path));
            return Err(e);
        }

        // Register the final name before it exists so a signal between
        // rename and return still removes it
        with_registry(|r| r.register(&path));
        let persisted = tmp.persist(&path);
        with_registry(|r| r.unregister(&tmp_path));
        if let Err(e) = persisted {
            with_registry(|r| r.unregister(&path));
            return Err(e.error);
        }

        info!("Values file written: {:?} ({} bytes, mode 0600)", path, contents.len());
        Ok(Self {
            path,
            retained: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file on disk and give up ownership of it.
    pub fn retain(mut self) -> PathBuf {
        self.retained = true;
        with_registry(|r| r.unregister(&self.path));
        warn!("Values file retained at {:?}; it contains credentials", self.path);
        self.path.clone()
    }
}

impl Drop for SecretFile {
    fn drop(&mut self) {
        if self.retained {
            return;
        }
        destroy(&self.path);
        with_registry(|r| r.unregister(&self.path));
    }
}

/// Securely remove `path`. Missing files are not an error.
pub fn destroy(path: &Path) {
    if !path.exists() {
        return;
    }

    if let Ok(shred) = which::which("shred") {
        let status = Command::new(shred)
            .args(["-u", "-z"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() && !path.exists() => {
                debug!("Shredded {:?}", path);
                return;
            }
            Ok(s) => warn!("shred exited with {:?} for {:?}, falling back", s.code(), path),
            Err(e) => warn!("Failed to run shred for {:?}: {}, falling back", path, e),
        }
    }

    zero_and_remove(path);
}

fn zero_and_remove(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        if let Ok(mut file) = OpenOptions::new().write(true).open(path) {
            let zeros = vec![0u8; meta.len() as usize];
            let _ = file.write_all(&zeros);
            let _ = file.sync_all();
        }
    }

    match fs::remove_file(path) {
        Ok(()) => debug!("Wiped {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}
