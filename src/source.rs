//! Frame sources for video requests.
//!
//! Decoding containers is left to whoever produced the frames; a source here
//! is a directory of still frames (`png`/`jpg`/`jpeg`) read in file-name
//! order. Anything that cannot be opened behaves like an exhausted stream.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::types::Frame;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Clone, Debug)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
}

impl ImageSequence {
    /// Lists the frames under `dir`. An unreadable directory yields an empty
    /// sequence.
    pub fn open(dir: &Path) -> Self {
        match list_frames(dir) {
            Ok(paths) => Self { paths },
            Err(err) => {
                log::warn!("could not open frame source {}: {err:?}", dir.display());
                Self { paths: Vec::new() }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Decodes frames lazily, ending at the first frame that fails to load.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.paths.iter().map_while(|path| match load_frame(path) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!("stopping frame source at {}: {err:?}", path.display());
                None
            }
        })
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if FRAME_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)) {
                paths.push(path);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open frame {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();

    Ok(Frame {
        rgba: image.into_raw(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbaImage::from_pixel(4, 3, Rgba([shade, shade, shade, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn frames_come_back_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "002.png", 20);
        write_png(dir.path(), "001.png", 10);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = ImageSequence::open(dir.path());
        assert_eq!(source.len(), 2);
        let frames: Vec<Frame> = source.frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].rgba[0], 10);
        assert_eq!((frames[1].width, frames[1].height), (4, 3));
    }

    #[test]
    fn missing_directory_is_empty() {
        let source = ImageSequence::open(Path::new("/definitely/not/here"));
        assert!(source.is_empty());
        assert_eq!(source.frames().count(), 0);
    }

    #[test]
    fn corrupt_frame_ends_the_stream() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "001.png", 10);
        fs::write(dir.path().join("002.png"), b"not a png").unwrap();
        write_png(dir.path(), "003.png", 30);

        let source = ImageSequence::open(dir.path());
        assert_eq!(source.frames().count(), 1);
    }
}
