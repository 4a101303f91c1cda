//! Configuration module
//!
//! Attachment limits, object-store settings and optional database settings, read
//! from the environment (a `.env` file is loaded first when present).

use std::env;

use crate::constants::{
    BYTES_PER_MB, DEFAULT_IMAGE_QUALITY, DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_MAX_PARENT_TOTAL_MB,
    DEFAULT_MAX_PDF_PAGES, DEFAULT_MAX_PIXELS, DEFAULT_PRESIGNED_URL_TTL_SECS,
    DEFAULT_STORAGE_TIMEOUT_SECS, MAX_PRESIGNED_URL_TTL_SECS,
};
use crate::models::{DetectedFormat, QuotaLimits};
use crate::storage_types::{ServerSideEncryption, StorageBackend};

const DB_MAX_CONNECTIONS: u32 = 10;

/// Size, format and decoder ceilings applied to every upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size_bytes: u64,
    pub max_parent_total_bytes: u64,
    pub max_tenant_total_bytes: Option<u64>,
    pub allowed_formats: Vec<DetectedFormat>,
    pub max_pixels: u64,
    pub max_pdf_pages: u32,
    pub image_quality: u8,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MB,
            max_parent_total_bytes: DEFAULT_MAX_PARENT_TOTAL_MB * BYTES_PER_MB,
            max_tenant_total_bytes: None,
            allowed_formats: DetectedFormat::SUPPORTED.to_vec(),
            max_pixels: DEFAULT_MAX_PIXELS,
            max_pdf_pages: DEFAULT_MAX_PDF_PAGES,
            image_quality: DEFAULT_IMAGE_QUALITY,
        }
    }
}

impl UploadLimits {
    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            max_file_bytes: self.max_file_size_bytes,
            max_parent_total_bytes: self.max_parent_total_bytes,
            max_tenant_total_bytes: self.max_tenant_total_bytes,
        }
    }

    pub fn is_allowed(&self, format: DetectedFormat) -> bool {
        format.is_recognized() && self.allowed_formats.contains(&format)
    }
}

/// Object store configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub encryption: ServerSideEncryption,
    pub timeout_secs: u64,
    pub presigned_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            encryption: ServerSideEncryption::Aes256,
            timeout_secs: DEFAULT_STORAGE_TIMEOUT_SECS,
            presigned_url_ttl_secs: DEFAULT_PRESIGNED_URL_TTL_SECS,
        }
    }
}

impl StorageConfig {
    /// S3_REGION wins over AWS_REGION
    pub fn region(&self) -> Option<&str> {
        self.s3_region.as_deref().or(self.aws_region.as_deref())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("STORAGE_TIMEOUT_SECS must be greater than 0"));
        }

        if self.presigned_url_ttl_secs == 0
            || self.presigned_url_ttl_secs > MAX_PRESIGNED_URL_TTL_SECS
        {
            return Err(anyhow::anyhow!(
                "PRESIGNED_URL_TTL_SECS must be between 1 and {}",
                MAX_PRESIGNED_URL_TTL_SECS
            ));
        }

        match self.backend {
            StorageBackend::S3 => {
                if self.s3_bucket.as_deref().map_or(true, str::is_empty) {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        Ok(())
    }
}

/// Top-level configuration for the ingestion pipeline and its tooling
#[derive(Clone, Debug)]
pub struct AttachmentConfig {
    pub environment: String,
    pub limits: UploadLimits,
    pub storage: StorageConfig,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl AttachmentConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_source<F>(get: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let max_file_size_mb = get("ATTACHMENT_MAX_FILE_SIZE_MB")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);
        let max_parent_total_mb = get("ATTACHMENT_MAX_PARENT_TOTAL_MB")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PARENT_TOTAL_MB);
        let max_tenant_total_mb: Option<u64> =
            get("ATTACHMENT_MAX_TENANT_TOTAL_MB").and_then(|v| v.parse().ok());

        let allowed_formats = match get("ATTACHMENT_ALLOWED_FORMATS") {
            Some(list) => parse_formats(&list)?,
            None => DetectedFormat::SUPPORTED.to_vec(),
        };

        let limits = UploadLimits {
            max_file_size_bytes: max_file_size_mb.saturating_mul(BYTES_PER_MB),
            max_parent_total_bytes: max_parent_total_mb.saturating_mul(BYTES_PER_MB),
            max_tenant_total_bytes: max_tenant_total_mb.map(|mb| mb.saturating_mul(BYTES_PER_MB)),
            allowed_formats,
            max_pixels: get("ATTACHMENT_MAX_PIXELS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_PIXELS),
            max_pdf_pages: get("ATTACHMENT_MAX_PDF_PAGES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_PDF_PAGES),
            image_quality: get("ATTACHMENT_IMAGE_QUALITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_IMAGE_QUALITY),
        };

        let backend = match get("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let encryption = ServerSideEncryption::from_parts(
            &get("S3_SSE_ALGORITHM").unwrap_or_else(|| "AES256".to_string()),
            get("S3_SSE_KMS_KEY_ID"),
        )?;

        let storage = StorageConfig {
            backend,
            s3_bucket: get("S3_BUCKET"),
            s3_region: get("S3_REGION"),
            s3_endpoint: get("S3_ENDPOINT").filter(|v| !v.is_empty()),
            aws_region: get("AWS_REGION"),
            encryption,
            timeout_secs: get("STORAGE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS),
            presigned_url_ttl_secs: get("PRESIGNED_URL_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PRESIGNED_URL_TTL_SECS),
        };

        Ok(Self {
            environment,
            limits,
            storage,
            database_url: get("DATABASE_URL").filter(|v| !v.is_empty()),
            db_max_connections: get("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DB_MAX_CONNECTIONS),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let limits = &self.limits;

        if limits.max_file_size_bytes == 0 || limits.max_parent_total_bytes == 0 {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_MAX_FILE_SIZE_MB and ATTACHMENT_MAX_PARENT_TOTAL_MB \
                 must be greater than 0"
            ));
        }

        if limits.max_file_size_bytes > limits.max_parent_total_bytes {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_MAX_FILE_SIZE_MB must not exceed ATTACHMENT_MAX_PARENT_TOTAL_MB"
            ));
        }

        if limits.max_tenant_total_bytes == Some(0) {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_MAX_TENANT_TOTAL_MB must be greater than 0 when set"
            ));
        }

        if limits.allowed_formats.is_empty() {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_ALLOWED_FORMATS must name at least one format"
            ));
        }

        if limits.max_pixels == 0 || limits.max_pdf_pages == 0 {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_MAX_PIXELS and ATTACHMENT_MAX_PDF_PAGES must be greater than 0"
            ));
        }

        if !(1..=100).contains(&limits.image_quality) {
            return Err(anyhow::anyhow!(
                "ATTACHMENT_IMAGE_QUALITY must be between 1 and 100"
            ));
        }

        self.storage.validate()?;

        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

/// Parse a comma-separated format list such as `jpeg,png,pdf`
pub fn parse_formats(list: &str) -> Result<Vec<DetectedFormat>, anyhow::Error> {
    let mut formats = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format: DetectedFormat = item.parse()?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    Ok(formats)
}
