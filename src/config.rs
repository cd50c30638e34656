use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub lifecycle: LifecycleConfig,
    /// Public origin used to build share links (`{base}/share/{token}`).
    pub share_base_url: Option<String>,
    /// Mounts the `/_internal` trash purge and blob sweep routes. Only enable where the
    /// ingress keeps `/_internal` off the public network.
    pub maintenance_routes: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for the local object store
    pub local_storage_path: String,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Days a trashed file is kept before it becomes eligible for purge
    pub trash_retention_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_storage_path: "./files".to_string(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 10 * 1024 * 1024, // 10MiB
            trash_retention_days: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let server = ServerConfig::default();
        let storage = StorageConfig::default();
        let defaults = LifecycleConfig::default();

        let bind_address = std::env::var("BIND_ADDRESS").unwrap_or(server.bind_address);

        let data_dir = std::env::var("DATA_DIR").unwrap_or(server.data_dir);

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or(storage.local_storage_path);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_upload_size);

        let trash_retention_days = std::env::var("TRASH_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.trash_retention_days);

        let share_base_url = std::env::var("SHARE_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let maintenance_routes = std::env::var("ENABLE_MAINTENANCE_ROUTES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            server: ServerConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig { local_storage_path },
            lifecycle: LifecycleConfig {
                max_upload_size,
                trash_retention_days,
            },
            share_base_url,
            maintenance_routes,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.trash_retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "TRASH_RETENTION_DAYS must be greater than 0".to_string(),
            ));
        }

        if let Some(ref base) = self.share_base_url {
            if !base.starts_with("http://") && !base.starts_with("https://") {
                tracing::warn!(
                    share_base_url = %base,
                    "SHARE_BASE_URL has no http(s) scheme; share links may not be clickable"
                );
            }
        }

        Ok(())
    }

    /// Build the public link for a share token, if a base URL is configured.
    pub fn share_url(&self, token: &str) -> Option<String> {
        self.share_base_url
            .as_ref()
            .map(|base| format!("{base}/share/{token}"))
    }
}
