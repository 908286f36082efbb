//! Source loading: turns a file on disk into plain text.

use std::path::Path;

use crate::types::CoreError;

use super::ContentKind;

/// Reads and extracts the textual content of `path` according to `kind`.
///
/// PDF extraction runs on the blocking pool since `pdf-extract` is a
/// synchronous parser. Word documents are recognised but have no extractor
/// wired up yet, so they surface as [`CoreError::UnsupportedContentKind`].
pub async fn load_text(path: &Path, kind: ContentKind) -> Result<String, CoreError> {
    match kind {
        ContentKind::Text => tokio::fs::read_to_string(path).await.map_err(|err| {
            CoreError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        }),
        ContentKind::Pdf => {
            let owned = path.to_path_buf();
            let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
                .await
                .map_err(|err| CoreError::Ingestion(format!("pdf extraction task failed: {err}")))?;
            extracted.map_err(|err| CoreError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
        ContentKind::Word | ContentKind::Other => Err(CoreError::UnsupportedContentKind(kind)),
    }
}
