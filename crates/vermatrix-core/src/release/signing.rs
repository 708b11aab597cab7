//! Signing port for the Sign stage.
//!
//! Credentials are injected through [`CredentialProvider`]; their absence is
//! a value (`None`), and the pipeline decides whether that skips or fails
//! the stage. Key material never appears in `Debug` output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::error::{ReleaseError, ReleaseResult};

/// Environment variable holding the signing key id or armored key.
pub const SIGNING_KEY_ENV: &str = "VERMATRIX_SIGNING_KEY";
/// Environment variable holding the key passphrase.
pub const SIGNING_PASSPHRASE_ENV: &str = "VERMATRIX_SIGNING_KEY_PASSPHRASE";

#[derive(Clone)]
pub struct SigningCredentials {
    key: String,
    passphrase: Option<String>,
}

impl SigningCredentials {
    pub fn new(key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            key: key.into(),
            passphrase,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("key", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Option<SigningCredentials>;
}

/// Reads [`SIGNING_KEY_ENV`] and [`SIGNING_PASSPHRASE_ENV`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Option<SigningCredentials> {
        let key = std::env::var(SIGNING_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let passphrase = std::env::var(SIGNING_PASSPHRASE_ENV)
            .ok()
            .filter(|p| !p.is_empty());
        Some(SigningCredentials::new(key, passphrase))
    }
}

/// Fixed credentials, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider(Option<SigningCredentials>);

impl StaticCredentialProvider {
    pub fn new(credentials: SigningCredentials) -> Self {
        Self(Some(credentials))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credentials(&self) -> Option<SigningCredentials> {
        self.0.clone()
    }
}

/// Produces a detached signature for one artifact.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `artifact`, writing the signature under `out_dir`; returns its path.
    async fn sign(
        &self,
        artifact: &Path,
        out_dir: &Path,
        credentials: &SigningCredentials,
    ) -> ReleaseResult<PathBuf>;
}

/// Detached armored signatures via `gpg`.
///
/// The key is passed as `--local-user`; the passphrase, when present, is
/// written to gpg's stdin with loopback pinentry.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    program: String,
}

impl Default for GpgSigner {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
        }
    }
}

impl GpgSigner {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn signature_path(artifact: &Path, out_dir: &Path) -> ReleaseResult<PathBuf> {
    let name = artifact
        .file_name()
        .ok_or_else(|| ReleaseError::Signing(format!("{} has no file name", artifact.display())))?;
    Ok(out_dir.join(format!("{}.asc", name.to_string_lossy())))
}

#[async_trait]
impl Signer for GpgSigner {
    async fn sign(
        &self,
        artifact: &Path,
        out_dir: &Path,
        credentials: &SigningCredentials,
    ) -> ReleaseResult<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        let output_path = signature_path(artifact, out_dir)?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(["--batch", "--yes", "--armor", "--detach-sign"])
            .arg("--local-user")
            .arg(credentials.key())
            .arg("--output")
            .arg(&output_path);
        if credentials.passphrase().is_some() {
            cmd.args(["--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
        }
        cmd.arg(artifact)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ReleaseError::Signing(format!("failed to run {}: {}", self.program, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Some(passphrase) = credentials.passphrase() {
                stdin.write_all(passphrase.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
            }
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ReleaseError::Signing(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(artifact = %artifact.display(), signature = %output_path.display(), "artifact signed");
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key_material() {
        let creds = SigningCredentials::new("SECRETKEY", Some("hunter2".to_string()));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("SECRETKEY"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_static_provider() {
        assert!(StaticCredentialProvider::empty().credentials().is_none());
        let p = StaticCredentialProvider::new(SigningCredentials::new("k", None));
        assert_eq!(p.credentials().unwrap().key(), "k");
    }

    #[test]
    fn test_signature_path() {
        let path = signature_path(Path::new("/build/lib-1.0.jar"), Path::new("/out")).unwrap();
        assert_eq!(path, PathBuf::from("/out/lib-1.0.jar.asc"));
    }

    #[tokio::test]
    async fn test_gpg_signer_reports_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("a.jar");
        std::fs::write(&artifact, b"x").unwrap();
        let signer = GpgSigner::with_program("vermatrix-no-such-gpg");
        let err = signer
            .sign(&artifact, &dir.path().join("sig"), &SigningCredentials::new("k", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Signing(_)));
    }
}
