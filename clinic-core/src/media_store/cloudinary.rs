use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use super::{DestroyOutcome, MediaStore, MediaStoreError, StoredObject, is_destroyable};

const SIGNATURE_ALGORITHM: &str = "sha256";

/// Credentials and namespace for a Cloudinary-compatible host.
#[derive(Clone)]
pub struct CloudinarySettings {
    pub api_base: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CloudinarySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinarySettings")
            .field("api_base", &self.api_base)
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("folder", &self.folder)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryMediaStore {
    http: reqwest::Client,
    upload_url: Url,
    destroy_url: Url,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryMediaStore {
    pub fn new(settings: CloudinarySettings) -> Result<Self, MediaStoreError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(MediaStoreError::Network)?;

        let base = settings.api_base.trim_end_matches('/');
        let endpoint = |action: &str| {
            Url::parse(&format!("{base}/{}/image/{action}", settings.cloud_name)).map_err(|e| {
                MediaStoreError::InvalidResponse(format!("invalid media API base `{base}`: {e}"))
            })
        };

        Ok(Self {
            upload_url: endpoint("upload")?,
            destroy_url: endpoint("destroy")?,
            http,
            api_key: settings.api_key,
            api_secret: settings.api_secret,
            folder: settings.folder,
        })
    }

    /// Signed parameters, in the order they were given, plus `api_key`,
    /// `signature` and `signature_algorithm`.
    fn signed_params(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let signature = sign(&params, &self.api_secret);
        params.push(("api_key", self.api_key.clone()));
        params.push(("signature", signature));
        params.push(("signature_algorithm", SIGNATURE_ALGORITHM.to_string()));
        params
    }

    async fn rejection(response: reqwest::Response) -> MediaStoreError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorEnvelope>()
            .await
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| format!("request failed with status {status}"));
        MediaStoreError::Rejected { status, message }
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, secret appended, hex digest. `file`, `api_key`,
/// `resource_type` and `cloud_name` never take part.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params
        .iter()
        .filter(|(key, value)| {
            !value.is_empty() && !matches!(*key, "file" | "api_key" | "resource_type" | "cloud_name")
        })
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStore for CloudinaryMediaStore {
    async fn upload(&self, bytes: Bytes) -> Result<StoredObject, MediaStoreError> {
        let size = bytes.len();
        let params = self.signed_params(vec![
            ("folder", self.folder.clone()),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("unique_filename", "true".to_string()),
            ("use_filename", "false".to_string()),
        ]);

        let mut form = Form::new();
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form.part("file", Part::stream_with_length(bytes, size as u64).file_name("upload"));

        let response = self
            .http
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(MediaStoreError::from_transport)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| MediaStoreError::InvalidResponse(e.to_string()))?;

        debug!(object_id = %body.public_id, bytes = size, "uploaded media object");

        Ok(StoredObject {
            url: body.secure_url,
            object_id: body.public_id,
        })
    }

    async fn destroy(&self, object_id: &str) -> Result<DestroyOutcome, MediaStoreError> {
        if !is_destroyable(object_id) {
            return Ok(DestroyOutcome::Skipped);
        }

        let params = self.signed_params(vec![
            ("public_id", object_id.to_string()),
            ("timestamp", Utc::now().timestamp().to_string()),
        ]);

        let response = self
            .http
            .post(self.destroy_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(MediaStoreError::from_transport)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| MediaStoreError::InvalidResponse(e.to_string()))?;

        match body.result.as_str() {
            "ok" => Ok(DestroyOutcome::Destroyed),
            "not found" => {
                warn!(object_id, "media host had no object to destroy");
                Ok(DestroyOutcome::NotFound)
            }
            other => Err(MediaStoreError::Rejected {
                status: 200,
                message: format!("destroy returned `{other}`"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CloudinarySettings {
        CloudinarySettings {
            api_base: "https://api.cloudinary.com/v1_1/".into(),
            cloud_name: "demo".into(),
            api_key: "1234".into(),
            api_secret: "secret".into(),
            folder: "clinic_images".into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn signature_sorts_and_skips_unsigned_params() {
        let params = vec![
            ("timestamp", "1700000000".to_string()),
            ("public_id", "clinic_images/x".to_string()),
            ("api_key", "ignored".to_string()),
            ("file", "ignored".to_string()),
        ];
        let reordered = vec![
            ("public_id", "clinic_images/x".to_string()),
            ("timestamp", "1700000000".to_string()),
        ];
        assert_eq!(sign(&params, "secret"), sign(&reordered, "secret"));

        let mut hasher = Sha256::new();
        hasher.update(b"public_id=clinic_images/x&timestamp=1700000000secret");
        assert_eq!(sign(&params, "secret"), hex::encode(hasher.finalize()));
    }

    #[test]
    fn endpoints_are_built_per_cloud() {
        let store = CloudinaryMediaStore::new(settings()).unwrap();
        assert_eq!(
            store.upload_url.as_str(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
        assert_eq!(
            store.destroy_url.as_str(),
            "https://api.cloudinary.com/v1_1/demo/image/destroy"
        );
    }

    #[test]
    fn signed_params_carry_key_and_signature() {
        let store = CloudinaryMediaStore::new(settings()).unwrap();
        let params = store.signed_params(vec![("public_id", "a".into())]);
        let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["public_id", "api_key", "signature", "signature_algorithm"]);
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn blank_object_id_is_skipped_without_network() {
        let mut cfg = settings();
        cfg.api_base = "http://127.0.0.1:9".into();
        let store = CloudinaryMediaStore::new(cfg).unwrap();
        assert_eq!(store.destroy("  ").await.unwrap(), DestroyOutcome::Skipped);
        assert_eq!(store.destroy("").await.unwrap(), DestroyOutcome::Skipped);
    }
}
