use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sign language recognition over landmark sequences.
#[derive(Parser, Debug)]
#[command(name = "sign-recognizer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./sign-recognizer.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a `{"keypoints": [...]}` body
    Predict {
        /// Target to classify with, e.g. "alphabet"
        #[arg(short, long)]
        target: String,

        /// JSON body file; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Extract landmarks from a frame directory and classify them
    PredictVideo {
        #[arg(short, long)]
        target: String,

        /// Directory of png/jpg frames, read in file-name order
        source: PathBuf,

        /// "hands" or "pose_hands"
        #[arg(short, long, default_value = "hands")]
        mode: String,
    },

    /// Report which targets are loaded
    Health,

    /// Print an ONNX model's inputs and outputs
    ModelInfo {
        model: PathBuf,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predict_video() {
        let cli = Cli::try_parse_from([
            "sign-recognizer",
            "-v",
            "predict-video",
            "--target",
            "words_v2",
            "--mode",
            "pose_hands",
            "/tmp/frames",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::PredictVideo {
                target,
                source,
                mode,
            } => {
                assert_eq!(target, "words_v2");
                assert_eq!(source, PathBuf::from("/tmp/frames"));
                assert_eq!(mode, "pose_hands");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn predict_requires_a_target() {
        assert!(Cli::try_parse_from(["sign-recognizer", "predict"]).is_err());
    }
}
