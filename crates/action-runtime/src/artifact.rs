use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};

use crate::errors::ActionError;

// ---------------------------------------------------------------------------
// Artifact Store — the single executable slot
//
// One fixed path. Installing a new artifact replaces the old one atomically:
// bytes go to a sibling temp file, get 0o755, then rename over the slot.
// A run started before the rename keeps executing the old inode.
// ---------------------------------------------------------------------------

const EXEC_MODE: u32 = 0o755;

/// What `/init` asked us to install, resolved once at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// Script text, written verbatim.
    Source(String),
    /// Base64-encoded executable.
    Binary(String),
    /// No payload: use whatever is already at the fixed path.
    PreExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Binary,
}

/// Record of an artifact sitting in the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size: u64,
}

/// Environment handed to every child process of the current initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentBindings(BTreeMap<String, String>);

impl EnvironmentBindings {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self(vars)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentBindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write script text to the slot and make it executable.
    pub async fn install_source(&self, text: &str) -> Result<ActionArtifact, ActionError> {
        self.write_executable(text.as_bytes()).await?;
        Ok(self.record(ArtifactKind::Source, text.len()))
    }

    /// Decode a base64 payload and install the result.
    pub async fn install_binary(&self, encoded: &str) -> Result<ActionArtifact, ActionError> {
        let bytes = decode_binary(encoded)?;
        self.write_executable(&bytes).await?;
        Ok(self.record(ArtifactKind::Binary, bytes.len()))
    }

    /// True when a regular file with an owner-execute bit sits in the slot.
    pub async fn already_installed(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o100 != 0,
            Err(_) => false,
        }
    }

    fn record(&self, kind: ArtifactKind, size: usize) -> ActionArtifact {
        ActionArtifact {
            kind,
            path: self.path.clone(),
            size: size as u64,
        }
    }

    async fn write_executable(&self, bytes: &[u8]) -> Result<(), ActionError> {
        use tokio::io::AsyncWriteExt;

        let fail = |e| ActionError::persistence(&self.path, e);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(fail)?;
        }

        let tmp = self.temp_path();
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(EXEC_MODE)
            .open(&tmp)
            .await
            .map_err(fail)?;
        file.write_all(bytes).await.map_err(fail)?;
        file.sync_all().await.map_err(fail)?;
        // Close before exec, or spawning can hit ETXTBSY.
        drop(file);

        // mode() above is filtered by umask
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(EXEC_MODE))
            .await
            .map_err(fail)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(fail)?;

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "artifact.installed");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Standard base64; whitespace (line wrapping) is ignored.
pub fn decode_binary(encoded: &str) -> Result<Vec<u8>, ActionError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(general_purpose::STANDARD.decode(compact)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_install_is_executable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("action/exec"));
        assert!(!store.already_installed().await);

        let art = store.install_source("#!/bin/sh\necho hi\n").await.unwrap();
        assert_eq!(art.kind, ArtifactKind::Source);
        assert_eq!(art.size, 18);

        let meta = std::fs::metadata(store.path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o755);
        assert!(store.already_installed().await);
        assert!(!dir.path().join("action/exec.tmp").exists());
    }

    #[tokio::test]
    async fn binary_install_decodes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("exec"));
        let encoded = general_purpose::STANDARD.encode(b"#!/bin/sh\nexit 0\n");
        // wrapped the way `base64` CLI output usually is
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);

        let art = store.install_binary(&wrapped).await.unwrap();
        assert_eq!(art.kind, ArtifactKind::Binary);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"#!/bin/sh\nexit 0\n");
    }

    #[tokio::test]
    async fn bad_base64_is_decode_error_and_leaves_slot_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("exec"));
        store.install_source("#!/bin/sh\n").await.unwrap();

        let err = store.install_binary("!!not base64!!").await.unwrap_err();
        assert!(matches!(err, ActionError::Decode(_)));
        assert_eq!(std::fs::read(store.path()).unwrap(), b"#!/bin/sh\n");
    }

    #[tokio::test]
    async fn reinstall_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("exec"));
        store.install_source("first").await.unwrap();
        store.install_source("second").await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "second");
    }

    #[tokio::test]
    async fn unwritable_location_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        // parent "directory" is a regular file
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let store = ArtifactStore::new(blocker.join("exec"));

        let err = store.install_source("#!/bin/sh\n").await.unwrap_err();
        assert!(matches!(err, ActionError::Persistence { .. }));
    }

    #[tokio::test]
    async fn non_executable_file_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exec");
        std::fs::write(&path, b"data").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!ArtifactStore::new(path).already_installed().await);
    }

    #[test]
    fn env_bindings_collect() {
        let env: EnvironmentBindings = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("B"), Some("2"));
    }
}
