use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::api::Annotation;
use crate::error::AnnotError;

/// Durable record of one annotation run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub video: String,
    pub model: String,
    pub fps: f64,
    pub processing_time: f64,
    pub timestamp: String,
    pub annotation: String,
}

/// Paths actually written by a save; a missing entry means that format failed.
#[derive(Debug, Default)]
pub struct SavedPaths {
    pub json: Option<PathBuf>,
    pub txt: Option<PathBuf>,
}

/// Persists annotation results into the outputs directory.
///
/// Each run writes a JSON record and a plain-text record sharing a
/// timestamped filename stem. The two writes are independent: a failure in
/// one format is logged and the other is still attempted.
pub struct ResultWriter {
    outputs_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
        }
    }

    pub fn save(&self, video_name: &str, annotation: &Annotation) -> SavedPaths {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.save_with_timestamp(video_name, annotation, &timestamp)
    }

    pub(crate) fn save_with_timestamp(
        &self,
        video_name: &str,
        annotation: &Annotation,
        timestamp: &str,
    ) -> SavedPaths {
        let stem = Path::new(video_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| video_name.to_owned());
        let base_name = format!("{stem}_{timestamp}");

        let record = RunRecord {
            video: video_name.to_owned(),
            model: annotation.model.clone(),
            fps: annotation.fps,
            processing_time: annotation.elapsed.as_secs_f64(),
            timestamp: timestamp.to_owned(),
            annotation: annotation.text.clone(),
        };

        let mut saved = SavedPaths::default();

        let json_path = self.outputs_dir.join(format!("{base_name}.json"));
        match write_json(&json_path, &record) {
            Ok(()) => {
                tracing::info!(path = %json_path.display(), "JSON saved");
                saved.json = Some(json_path);
            }
            Err(e) => tracing::error!(error = %e, "failed to save JSON"),
        }

        let txt_path = self.outputs_dir.join(format!("{base_name}.txt"));
        match write_txt(&txt_path, &record) {
            Ok(()) => {
                tracing::info!(path = %txt_path.display(), "TXT saved");
                saved.txt = Some(txt_path);
            }
            Err(e) => tracing::error!(error = %e, "failed to save TXT"),
        }

        saved
    }
}

fn write_json(path: &Path, record: &RunRecord) -> Result<(), AnnotError> {
    let body = serde_json::to_string_pretty(record).map_err(|e| AnnotError::Persistence {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, body).map_err(|e| AnnotError::Persistence {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_txt(path: &Path, record: &RunRecord) -> Result<(), AnnotError> {
    let mut body = String::new();
    body.push_str(&format!("=== Video annotation: {} ===\n", record.video));
    body.push_str(&format!("Model: {}\n", record.model));
    body.push_str(&format!("FPS: {}\n", record.fps));
    body.push_str(&format!(
        "Processing time: {:.1} sec\n",
        record.processing_time
    ));
    body.push_str(&format!("Date: {}\n", record.timestamp));
    body.push_str("\n--- Annotation ---\n");
    body.push_str(&record.annotation);
    std::fs::write(path, body).map_err(|e| AnnotError::Persistence {
        path: path.to_path_buf(),
        source: e,
    })
}
