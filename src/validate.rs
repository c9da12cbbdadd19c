use crate::error::ValidationError;

/// Default upload ceiling in bytes (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Rules applied to an upload before it is decoded.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Lowercase extensions accepted, without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["png", "jpg", "jpeg", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ValidationConfig {
    /// Returns the allow-list as shown to clients, e.g. `PNG, JPG, JPEG, GIF`.
    pub fn allowed_display(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|ext| ext.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Declared size of the upload in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Checks an upload against `config`, stopping at the first failed rule.
///
/// Rules run in order: non-empty filename, allowed extension, size ceiling.
/// Only the filename is inspected for the type check; the bytes are not sniffed.
pub fn validate_upload(
    upload: &UploadRequest,
    config: &ValidationConfig,
) -> Result<(), ValidationError> {
    validate_filename(&upload.filename, config)?;
    validate_size(upload.size(), config)
}

/// The filename rules of [`validate_upload`], usable before the content has
/// been read.
pub fn validate_filename(filename: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    if filename.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if !config.is_allowed(filename) {
        return Err(ValidationError::InvalidFileType {
            allowed: config.allowed_display(),
        });
    }

    Ok(())
}

/// The size rule of [`validate_upload`].
pub fn validate_size(size: usize, config: &ValidationConfig) -> Result<(), ValidationError> {
    if size > config.max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            limit_mb: config.max_upload_bytes / (1024 * 1024),
        });
    }

    Ok(())
}
