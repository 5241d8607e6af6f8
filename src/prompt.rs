use std::path::Path;

/// Instruction used when no prompt file is available.
pub const FALLBACK_PROMPT: &str =
    "Analyze this video and describe the actions taking place in it.";

const DEFAULT_PROMPT_FILE: &str = "pov_annotation_prompt.txt";

/// Load the instruction text for the annotation request.
///
/// Without an override the prompt is read from
/// `<prompts_dir>/pov_annotation_prompt.txt`; an override path is used
/// verbatim. A missing file falls back to [`FALLBACK_PROMPT`] rather than
/// failing, so a fresh checkout works out of the box.
pub fn load(prompts_dir: &Path, override_path: Option<&Path>) -> anyhow::Result<String> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => prompts_dir.join(DEFAULT_PROMPT_FILE),
    };

    tracing::info!(path = %path.display(), "loading prompt");

    if !path.exists() {
        tracing::warn!(path = %path.display(), "prompt file not found, using fallback");
        return Ok(FALLBACK_PROMPT.to_owned());
    }

    let content = std::fs::read_to_string(&path)?;
    tracing::info!(chars = content.chars().count(), "prompt loaded");
    Ok(content)
}
