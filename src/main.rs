use std::{fs, io::Read, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use sign_recognizer::{
    SignService,
    api::{self, ApiResponse},
    classifier::describe_model,
    cli::{Cli, Command},
    config::ServiceConfig,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:?}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = ServiceConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::ModelInfo { model } => {
            println!("{}", describe_model(&model)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let service = SignService::from_config(&config)?;
            Ok(emit(api::health_json(&service)))
        }
        Command::Predict { target, input } => {
            let body = match input {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut body = String::new();
                    std::io::stdin()
                        .read_to_string(&mut body)
                        .context("failed to read request body from stdin")?;
                    body
                }
            };
            let service = SignService::from_config(&config)?;
            Ok(emit(api::predict_keypoints_json(&service, &target, &body)))
        }
        Command::PredictVideo {
            target,
            source,
            mode,
        } => {
            let service = SignService::from_config(&config)?;
            let body = serde_json::json!({
                "url_video": source.to_string_lossy(),
                "type_extract": mode,
            })
            .to_string();
            Ok(emit(api::predict_video_json(&service, &target, &body)))
        }
    }
}

fn emit(response: ApiResponse) -> ExitCode {
    match serde_json::to_string_pretty(&response.body) {
        Ok(text) => println!("{text}"),
        Err(err) => log::error!("failed to render response: {err}"),
    }
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        log::debug!("request finished with status {}", response.status);
        ExitCode::FAILURE
    }
}
