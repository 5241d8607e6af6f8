use std::path::Path;

use url::Url;

use crate::api::{ContentBlock, GenerationRequest, Input, Message, Parameters};
use crate::config::Config;
use crate::error::AnnotError;

/// Videos above this size draw a warning; the service enforces its own limit.
const SIZE_WARN_MB: f64 = 1000.0;

/// Assemble the generation request for a local video file.
///
/// Fails with [`AnnotError::NotFound`] if the video does not exist. The file
/// size is reported for diagnostics only; codec and format validation is left
/// to the remote service.
pub fn build(
    video_path: &Path,
    prompt_text: &str,
    config: &Config,
) -> Result<GenerationRequest, AnnotError> {
    if !video_path.exists() {
        return Err(AnnotError::NotFound {
            path: video_path.to_path_buf(),
        });
    }

    let absolute = video_path
        .canonicalize()
        .map_err(|_| AnnotError::NotFound {
            path: video_path.to_path_buf(),
        })?;

    let size_mb = std::fs::metadata(&absolute)
        .map(|meta| meta.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    tracing::info!(video = %absolute.display(), size_mb = %format_args!("{size_mb:.2}"), "building request");
    if size_mb > SIZE_WARN_MB {
        tracing::warn!(
            size_mb = %format_args!("{size_mb:.2}"),
            "video exceeds {SIZE_WARN_MB} MB, the service may reject it"
        );
    }

    // unreachable after canonicalize, kept for the () error type
    let video_url = Url::from_file_path(&absolute).map_err(|()| AnnotError::NotFound {
        path: video_path.to_path_buf(),
    })?;

    Ok(GenerationRequest {
        model: config.model.clone(),
        input: Input {
            messages: vec![Message {
                role: "user".to_owned(),
                content: vec![
                    ContentBlock::Video {
                        video: video_url.to_string(),
                        fps: config.fps,
                    },
                    ContentBlock::Text {
                        text: prompt_text.to_owned(),
                    },
                ],
            }],
        },
        parameters: Parameters {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
        },
    })
}
