use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::credentials::credential::Credential;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics::get_metrics;

static SUCCESS_MSG: &str = "success";
static ERROR_MSG: &str = "error";

/// Single-value, crash-safe persistence of the refresh token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, empty or unreadable file all mean "not yet authorized".
    pub async fn load(&self) -> Option<Credential> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let refresh_token = content.trim();
                if refresh_token.is_empty() {
                    info!("token file '{}' is empty", self.path.display());
                    return None;
                }
                Some(Credential::from_refresh_token(refresh_token.to_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("token file '{}' not found, not yet authorized", self.path.display());
                None
            }
            Err(e) => {
                warn!("token file '{}' is unreadable: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Write to a sibling temp file, fsync, then rename over the target.
    pub async fn save(&self, refresh_token: &str) -> GatewayResult<()> {
        let metrics = get_metrics().await;
        let result = self.write_atomic(refresh_token).await;
        let outcome = if result.is_ok() { SUCCESS_MSG } else { ERROR_MSG };
        metrics.token_store_writes.with_label_values(&[outcome]).inc();
        result
            .inspect(|_| info!("refresh token persisted to '{}'", self.path.display()))
            .map_err(|e| GatewayError::Io(format!("{}: {}", self.path.display(), e)))
    }

    async fn write_atomic(&self, refresh_token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;

        // a leftover temp file keeps its old mode, tighten it before any token byte lands
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
        }
        file.write_all(refresh_token.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Remove the persisted token; a missing file is already cleared.
    pub async fn clear(&self) -> GatewayResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(_) => {
                info!("deleted token file '{}'", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::Io(format!("{}: {}", self.path.display(), e))),
        }
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "refresh_token".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
