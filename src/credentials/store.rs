use std::io;
use std::path::{Path, PathBuf};

use super::{Credential, InstitutionId};
use crate::atomic_file;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No credential stored for institution {0}")]
    NotFound(InstitutionId),

    #[error("Credential store at {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Credential record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid institution id {0:?}")]
    InvalidInstitutionId(String),
}

/// Stores one JSON record per linked institution under the secrets directory.
///
/// Records are stored in plain text. Writes replace the whole record atomically.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, institution_id: &InstitutionId) -> PathBuf {
        self.root
            .join(format!("{}.{RECORD_EXTENSION}", institution_id.as_str()))
    }

    /// Store a credential under its institution id, replacing any previous record
    pub async fn put(&self, credential: &Credential) -> Result<(), StoreError> {
        let path = self.record_path(&credential.institution_id);
        log::info!("Saving credential for {}...", credential.institution_id);

        self.ensure_root().await?;
        let content = serde_json::to_vec_pretty(credential).map_err(|source| {
            StoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        atomic_file::write_atomic(&path, &content)
            .await
            .map_err(|source| StoreError::Unavailable {
                path: path.clone(),
                source,
            })?;

        log::info!("Saving credential for {}...done", credential.institution_id);
        Ok(())
    }

    pub async fn get(&self, institution_id: &InstitutionId) -> Result<Credential, StoreError> {
        let path = self.record_path(institution_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(institution_id.clone()));
            }
            Err(source) => return Err(StoreError::Unavailable { path, source }),
        };
        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Ids of all stored credentials, sorted
    pub async fn list(&self) -> Result<Vec<InstitutionId>, StoreError> {
        let unavailable = |source| StoreError::Unavailable {
            path: self.root.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(unavailable(err)),
        };

        let mut result = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match InstitutionId::new(stem) {
                Ok(id) => result.push(id),
                Err(_) => log::warn!("Ignoring unexpected file {}", path.display()),
            }
        }
        result.sort();
        Ok(result)
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        let unavailable = |source| StoreError::Unavailable {
            path: self.root.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(unavailable)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            tokio::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }
}
