use std::io::Write as _;
use std::path::PathBuf;

use log::info;

/// Swaps the running executable for a new image.
pub trait BinaryReplacer: Send + Sync {
    /// Atomically install `binary` in place of the current executable.
    ///
    /// # Errors
    /// Returns the OS error when the staging file cannot be written or the
    /// swap is refused (permissions, read-only filesystem, full disk).
    fn replace(&self, binary: &[u8]) -> std::io::Result<()>;
}

/// Replaces the current executable using the `self-replace` crate.
///
/// The new image is first written to a temporary file, so a failed write
/// never touches the installed binary.
#[derive(Debug, Clone, Default)]
pub struct SelfReplacer {
    staging_dir: Option<PathBuf>,
}

impl SelfReplacer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage downloads in `dir` instead of the system temp directory.
    #[must_use]
    pub fn staging_in(dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: Some(dir.into()),
        }
    }

    fn stage(&self, binary: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".relup-").suffix(".new");
        let mut staged = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        staged.write_all(binary)?;
        staged.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(staged)
    }
}

impl BinaryReplacer for SelfReplacer {
    fn replace(&self, binary: &[u8]) -> std::io::Result<()> {
        let staged = self.stage(binary)?;
        info!(
            "Replacing current executable with {} byte image",
            binary.len()
        );
        self_replace::self_replace(staged.path())
    }
}
