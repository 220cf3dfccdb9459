//! S3-compatible object storage for images, documents and checklist PDFs.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use axum::extract::Multipart;
use bytes::Bytes;
use log::{error, info};
use uuid::Uuid;

use crate::core::config::DriveConfig;
use crate::core::shared::utils::sanitize_file_name;
use crate::core::shared::{AppError, AppResult};

pub mod documents;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_DOCUMENT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct DriveClient {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("bucket", &self.bucket)
            .field("public_base", &self.public_base)
            .finish()
    }
}

pub async fn create_s3_operator(config: &DriveConfig) -> S3Client {
    let endpoint = if !config.server.ends_with('/') {
        format!("{}/", config.server)
    } else {
        config.server.clone()
    };
    let base_config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region("auto")
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}

pub fn public_base(config: &DriveConfig) -> String {
    match &config.public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("{}/{}", config.server.trim_end_matches('/'), config.bucket),
    }
}

/// `{company}/{folder}/{uuid}-{name}`
pub fn object_key(company_id: Uuid, folder: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}-{}",
        company_id,
        folder.trim_matches('/'),
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

impl DriveClient {
    pub async fn connect(config: &DriveConfig) -> Self {
        let client = create_s3_operator(config).await;
        Self {
            client,
            bucket: config.bucket.clone(),
            public_base: public_base(config),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload {}: {:?}", key, e);
                AppError::Storage(e.to_string())
            })?;
        info!("Uploaded {}/{} ({} bytes)", self.bucket, key, size);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> AppResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to read {}: {:?}", key, e);
                AppError::Storage(e.to_string())
            })?;

        let data = result.body.collect().await.map_err(|e| {
            error!("Failed to read body of {}: {:?}", key, e);
            AppError::Storage(e.to_string())
        })?;
        Ok(data.into_bytes())
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to delete {}: {:?}", key, e);
                AppError::Storage(e.to_string())
            })?;
        info!("Deleted {}/{}", self.bucket, key);
        Ok(())
    }

    /// Reverses `public_url`, for objects referenced by URL columns.
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.public_base)
            .map(|rest| rest.trim_start_matches('/'))
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
    /// Plain text fields that arrived alongside the file.
    pub fields: Vec<(String, String)>,
}

impl UploadedFile {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads the first file part of a multipart body, plus any text parts.
pub async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> AppResult<UploadedFile> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut fields = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) if file.is_none() => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                if data.len() > max_bytes {
                    return Err(AppError::field(
                        "file",
                        format!("must be at most {} MB", max_bytes / (1024 * 1024)),
                    ));
                }
                file = Some((file_name, content_type, data));
            }
            Some(_) => {}
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid form field: {e}")))?;
                fields.push((name, value));
            }
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::field("file", "is required"))?;
    if data.is_empty() {
        return Err(AppError::field("file", "must not be empty"));
    }

    Ok(UploadedFile {
        file_name,
        content_type,
        data,
        fields,
    })
}

/// Stores an image upload and returns its public URL.
pub async fn store_image(
    drive: &DriveClient,
    company_id: Uuid,
    folder: &str,
    multipart: Multipart,
) -> AppResult<String> {
    let upload = read_upload(multipart, MAX_IMAGE_BYTES).await?;
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::field("file", "must be an image"));
    }
    let key = object_key(company_id, folder, &upload.file_name);
    drive.put(&key, upload.data, &upload.content_type).await?;
    Ok(drive.public_url(&key))
}
