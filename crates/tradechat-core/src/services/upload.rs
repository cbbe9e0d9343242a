//! Attachment upload collaborator.

use futures_util::future::join_all;

/// Uploads a local file and returns its public URL, or `None` on failure.
#[allow(async_fn_in_trait)]
pub trait AttachmentUploader {
    async fn upload_attachment(&self, local_uri: &str) -> Option<String>;
}

/// Upload every attachment concurrently, keeping the URLs that succeeded in
/// their original order.
pub async fn upload_all<U: AttachmentUploader>(uploader: &U, local_uris: &[String]) -> Vec<String> {
    let results = join_all(
        local_uris
            .iter()
            .map(|uri| uploader.upload_attachment(uri)),
    )
    .await;

    let uploaded: Vec<String> = results.into_iter().flatten().collect();
    if uploaded.len() < local_uris.len() {
        tracing::warn!(
            requested = local_uris.len(),
            uploaded = uploaded.len(),
            "Some attachments failed to upload"
        );
    }
    uploaded
}

/// Uploader that "publishes" local URIs under a fixed base URL.
///
/// URIs containing `fail` are treated as failed uploads.
#[derive(Debug, Clone)]
pub struct StaticUploader {
    base_url: String,
}

impl StaticUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl AttachmentUploader for StaticUploader {
    async fn upload_attachment(&self, local_uri: &str) -> Option<String> {
        if local_uri.contains("fail") {
            return None;
        }
        let file_name = local_uri.rsplit('/').next().unwrap_or(local_uri);
        Some(format!("{}/{file_name}", self.base_url))
    }
}
