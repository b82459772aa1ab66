//! S3 bucket client for the descriptor store.

use std::env;
use std::path::Path;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{Delete, ObjectIdentifier, ServerSideEncryption};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use pomwatch_shared::{PomwatchError, Result, StoreConfig};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Env vars that override file-configured store settings.
const REGION_ENV: &str = "AWS_S3_REGION";
const ACCESS_KEY_ENV: &str = "AWS_S3_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "AWS_S3_SECRET_ACCESS_KEY";

/// Default endpoint for local development stores (minio and friends).
const LOCAL_ENDPOINT: &str = "http://127.0.0.1:9000";

/// Resolved connection settings, env vars taking precedence over config.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Only honored in local-dev mode; otherwise the SDK picks the endpoint.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Server-side encryption algorithm; `None` disables it.
    pub encryption: Option<String>,
    pub versioned: bool,
    pub local_dev: bool,
}

impl S3Options {
    /// Merge env overrides over the `[store]` config section.
    pub fn resolve(config: &StoreConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            region: env_nonempty(REGION_ENV).unwrap_or_else(|| config.region.clone()),
            endpoint: config.endpoint.clone(),
            access_key_id: env_nonempty(ACCESS_KEY_ENV),
            secret_access_key: env_nonempty(SECRET_KEY_ENV),
            encryption: Some(config.encryption.clone()).filter(|e| !e.is_empty()),
            versioned: config.versioned,
            local_dev: config.local_dev,
        }
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Client for the descriptor bucket.
///
/// Missing credentials are logged at construction but are not fatal; every
/// later request fails with a storage error until they are provided.
#[derive(Debug)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    encryption: Option<ServerSideEncryption>,
    synthesize_version: bool,
}

impl S3Store {
    /// Connect using the `[store]` config section plus env overrides.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        Self::with_options(S3Options::resolve(config))
    }

    /// Connect with fully resolved options.
    pub fn with_options(options: S3Options) -> Result<Self> {
        let has_key = options.access_key_id.is_some();
        let has_secret = options.secret_access_key.is_some();
        if has_key ^ has_secret {
            return Err(PomwatchError::config(
                "both access key id and secret access key are required when either is set",
            ));
        }

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()));

        if let (Some(key_id), Some(secret)) = (options.access_key_id, options.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "pomwatch-config",
            ));
        } else {
            warn!(
                "store credentials not provided; set {ACCESS_KEY_ENV} and {SECRET_KEY_ENV} \
                 before running store operations"
            );
        }

        if options.local_dev {
            let endpoint =
                normalize_endpoint(options.endpoint.as_deref().unwrap_or(LOCAL_ENDPOINT));
            // Local endpoints speak plain HTTP; the default client insists on TLS.
            if endpoint.starts_with("http://") {
                builder = builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
            builder = builder.endpoint_url(&endpoint).force_path_style(true);
            info!(%endpoint, "using local development store endpoint");
        }

        // Local stores reject the encryption header outright.
        let encryption = if options.local_dev {
            None
        } else {
            options
                .encryption
                .as_deref()
                .map(ServerSideEncryption::from)
        };

        // Local stores never mint version ids; synthesize them when the
        // bucket is supposed to be versioned.
        let synthesize_version = options.local_dev && options.versioned;

        debug!(
            bucket = %options.bucket,
            region = %options.region,
            local_dev = options.local_dev,
            "store client ready"
        );
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: options.bucket,
            encryption,
            synthesize_version,
        })
    }

    /// Whether an object exists under `key`. Does only a HEAD request.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let SdkError::ServiceError(service_err) = &err {
                    if service_err.raw().status().as_u16() == 404 {
                        return Ok(false);
                    }
                }
                Err(storage_error("head", key, err))
            }
        }
    }

    /// Store raw bytes under `key`. Returns the object version id when the
    /// bucket reports one.
    pub async fn store_blob(&self, blob: Bytes, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_server_side_encryption(self.encryption.clone())
            .body(blob.into())
            .send()
            .await
            .map_err(|e| storage_error("put", key, e))?;

        let version = self.version_or_fake(response.version_id());
        debug!(key, version = version.as_deref().unwrap_or("none"), "stored object");
        Ok(version)
    }

    /// Store a file from disk under `key`.
    pub async fn store_file(&self, path: &Path, key: &str) -> Result<Option<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PomwatchError::io(path, e))?;
        self.store_blob(Bytes::from(bytes), key).await
    }

    /// Fetch an object's bytes. A missing key is `NotFound`.
    pub async fn retrieve_blob(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| not_found_or_storage(key, e))?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PomwatchError::Storage(format!("read object {key}: {e}")))?;
        Ok(data.into_bytes())
    }

    /// Fetch an object into a local file, creating parent directories.
    pub async fn retrieve_file(&self, key: &str, path: &Path) -> Result<()> {
        let bytes = self.retrieve_blob(key).await?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PomwatchError::io(parent, e))?;
            }
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| PomwatchError::io(path, e))?;
        info!(key, path = %path.display(), bytes = bytes.len(), "retrieved object to file");
        Ok(())
    }

    /// List every key in the bucket, following continuation pages.
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| storage_error("list", &self.bucket, e))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        debug!(count = keys.len(), "listed bucket keys");
        Ok(keys)
    }

    /// Delete one object. Returns the removed version id when reported.
    pub async fn delete_object(&self, key: &str) -> Result<Option<String>> {
        let keys = [key.to_string()];
        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(build_delete(&keys)?)
            .send()
            .await
            .map_err(|e| storage_error("delete", key, e))?;

        let version = self.version_or_fake(
            response
                .deleted()
                .first()
                .and_then(|deleted| deleted.version_id()),
        );
        info!(key, version = version.as_deref().unwrap_or("none"), "deleted object");
        Ok(version)
    }

    /// Delete a batch of objects in one request.
    pub async fn delete_objects(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(build_delete(keys)?)
            .send()
            .await
            .map_err(|e| storage_error("delete batch", &self.bucket, e))?;
        info!(count = keys.len(), "deleted objects");
        Ok(())
    }

    /// Remove every object in the bucket. Returns how many were removed.
    pub async fn clean_bucket(&self) -> Result<usize> {
        let keys = self.list_keys().await?;
        if keys.is_empty() {
            debug!(bucket = %self.bucket, "bucket already empty");
            return Ok(0);
        }
        self.delete_objects(&keys).await?;
        info!(bucket = %self.bucket, count = keys.len(), "cleaned bucket");
        Ok(keys.len())
    }

    fn version_or_fake(&self, reported: Option<&str>) -> Option<String> {
        match reported {
            Some(version) => Some(version.to_string()),
            None if self.synthesize_version => Some(fake_version_id()),
            None => None,
        }
    }
}

fn build_delete(keys: &[String]) -> Result<Delete> {
    let mut identifiers = Vec::with_capacity(keys.len());
    for key in keys {
        identifiers.push(
            ObjectIdentifier::builder()
                .key(key)
                .build()
                .map_err(|e| PomwatchError::Storage(format!("delete {key}: {e}")))?,
        );
    }
    Delete::builder()
        .set_objects(Some(identifiers))
        .build()
        .map_err(|e| PomwatchError::Storage(format!("batch delete: {e}")))
}

/// `<uuid4-hex>-unknown`; stands in for version ids local stores never mint.
fn fake_version_id() -> String {
    format!("{}-unknown", Uuid::new_v4().simple())
}

/// Prepend a scheme when the endpoint is a bare `host:port`.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn storage_error<E>(operation: &str, subject: &str, err: SdkError<E>) -> PomwatchError
where
    E: std::error::Error + 'static,
{
    PomwatchError::Storage(format!(
        "{operation} {subject}: {}",
        aws_sdk_s3::error::DisplayErrorContext(&err)
    ))
}

fn not_found_or_storage<E>(key: &str, err: SdkError<E>) -> PomwatchError
where
    E: std::error::Error + 'static,
{
    if let SdkError::ServiceError(service_err) = &err {
        if service_err.raw().status().as_u16() == 404 {
            return PomwatchError::NotFound(format!("object {key}"));
        }
    }
    storage_error("get", key, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> S3Options {
        S3Options {
            bucket: "test-bucket".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key_id: Some("access".into()),
            secret_access_key: Some("secret".into()),
            encryption: Some("aws:kms".into()),
            versioned: true,
            local_dev: false,
        }
    }

    #[test]
    fn with_options_requires_complete_credentials() {
        let mut half = options();
        half.secret_access_key = None;
        let err = S3Store::with_options(half).expect_err("should fail");
        assert!(matches!(err, PomwatchError::Config { .. }));

        let mut other_half = options();
        other_half.access_key_id = None;
        let err = S3Store::with_options(other_half).expect_err("should fail");
        assert!(matches!(err, PomwatchError::Config { .. }));
    }

    #[test]
    fn with_options_tolerates_missing_credentials() {
        let mut anonymous = options();
        anonymous.access_key_id = None;
        anonymous.secret_access_key = None;
        // Logged, not fatal; later requests fail instead.
        S3Store::with_options(anonymous).expect("construct");
    }

    #[test]
    fn local_dev_disables_encryption_and_synthesizes_versions() {
        let mut local = options();
        local.local_dev = true;
        local.endpoint = Some("127.0.0.1:9000".into());
        let store = S3Store::with_options(local).expect("construct");
        assert!(store.encryption.is_none());
        assert!(store.synthesize_version);
    }

    #[test]
    fn remote_store_keeps_configured_encryption() {
        let store = S3Store::with_options(options()).expect("construct");
        assert_eq!(store.encryption, Some(ServerSideEncryption::AwsKms));
        assert!(!store.synthesize_version);
    }

    #[test]
    fn unversioned_local_store_reports_no_version() {
        let mut local = options();
        local.local_dev = true;
        local.versioned = false;
        let store = S3Store::with_options(local).expect("construct");
        assert_eq!(store.version_or_fake(None), None);
        assert_eq!(
            store.version_or_fake(Some("v123")),
            Some("v123".to_string())
        );
    }

    #[test]
    fn endpoint_normalization_adds_scheme() {
        assert_eq!(normalize_endpoint("127.0.0.1:9000"), "http://127.0.0.1:9000");
        assert_eq!(
            normalize_endpoint("http://127.0.0.1:9000"),
            "http://127.0.0.1:9000"
        );
        assert_eq!(
            normalize_endpoint("https://buckets.example.test"),
            "https://buckets.example.test"
        );
    }

    #[test]
    fn fake_version_ids_are_marked_unknown() {
        let id = fake_version_id();
        assert!(id.ends_with("-unknown"));
        let hex = id.trim_end_matches("-unknown");
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
