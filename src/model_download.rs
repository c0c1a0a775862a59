use std::{
    fs,
    io::{self, Read},
    path::Path,
    time::Duration,
};

use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    SignClassifier,
    PalmDetector,
    HandLandmarks,
    PoseLandmarks,
}

impl ModelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::SignClassifier => "sign classifier",
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandLandmarks => "hand landmark",
            ModelKind::PoseLandmarks => "pose landmark",
        }
    }
}

pub const HAND_LANDMARK_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
pub const HAND_LANDMARK_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx";
pub const PALM_DETECTOR_MODEL_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";
pub const PALM_DETECTOR_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx";

/// Makes sure `model_path` exists, downloading it from `url` when missing.
pub fn ensure_model_ready(model: ModelKind, model_path: &Path, url: Option<&str>) -> anyhow::Result<()> {
    if model_path.exists() {
        log::debug!("{} model found at {}", model.label(), model_path.display());
        return Ok(());
    }

    let url = url.ok_or_else(|| {
        anyhow!(
            "{} model not found at {} and no download url is configured",
            model.label(),
            model_path.display()
        )
    })?;

    if let Some(dir) = model_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create model directory {}", dir.display()))?;
    }

    fetch(model, url, model_path).with_context(|| {
        format!("{} model download to {} failed", model.label(), model_path.display())
    })
}

/// Streams `url` into a sibling `.download` file, then renames it over `dest`
/// so a half-written model is never picked up.
fn fetch(model: ModelKind, url: &str, dest: &Path) -> anyhow::Result<()> {
    log::info!("fetching {} model {url} -> {}", model.label(), dest.display());

    let response = Client::builder()
        .timeout(None::<Duration>)
        .build()
        .context("cannot build http client")?
        .get(url)
        .send()
        .context("model request failed")?
        .error_for_status()
        .context("model server rejected the request")?;

    let total = response.content_length();
    let bar = progress_bar(model, total);

    let partial = dest.with_extension("download");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("cannot create {}", partial.display()))?;

    let mut reader = CountingReader {
        inner: response,
        read: 0,
        on_read: |read: u64| bar.set_position(read),
    };
    let written = io::copy(&mut reader, &mut file).context("model transfer interrupted")?;
    file.sync_all().context("cannot flush model file")?;
    drop(file);

    if let Some(expected) = total.filter(|len| *len != written) {
        let _ = fs::remove_file(&partial);
        return Err(anyhow!("model transfer truncated: got {written} of {expected} bytes"));
    }

    fs::rename(&partial, dest).with_context(|| {
        format!("cannot move {} to {}", partial.display(), dest.display())
    })?;

    bar.finish_with_message(format!("{} model ready", model.label()));
    log::info!("{} model saved to {} ({written} bytes)", model.label(), dest.display());
    Ok(())
}

struct CountingReader<R, F> {
    inner: R,
    read: u64,
    on_read: F,
}

impl<R: Read, F: FnMut(u64)> Read for CountingReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.read += n as u64;
            (self.on_read)(self.read);
        }
        Ok(n)
    }
}

fn progress_bar(model: ModelKind, total: Option<u64>) -> ProgressBar {
    let bar = match total.filter(|len| *len > 0) {
        Some(len) => {
            let bar = ProgressBar::new(len);
            if let Ok(style) =
                ProgressStyle::with_template("{msg} {bar:40.cyan/blue} {bytes}/{total_bytes} {eta}")
            {
                bar.set_style(style.progress_chars("##-"));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {bytes}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        }
    };
    bar.set_message(format!("{} model", model.label()));
    bar
}
