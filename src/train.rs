//! Argument handling for the `tokenizer-train` wrapper
//!
//! Thin shim over SentencePiece's `spm_train`: validate the positional
//! arguments, assemble a fixed flag set, and mirror the tool's exit
//! status. All validation happens before the tool is even located.

use std::path::PathBuf;

use clap::Parser;
use log::info;
use thiserror::Error;

use crate::runner::{CommandRunner, CommandSpec};

const TRAINER_TOOL: &str = "spm_train";

#[derive(Parser, Debug)]
#[command(
    name = "tokenizer-train",
    version,
    about = "Train a SentencePiece tokenizer model"
)]
pub struct TrainArgs {
    /// Corpus file, one sentence per line
    pub input: PathBuf,
    /// Output model prefix (produces <name>.model and <name>.vocab)
    pub model_name: String,
    /// Vocabulary size, e.g. 32000
    pub vocab_size: String,
    /// Optional cap on sentences sampled from the corpus
    pub max_sentences: Option<String>,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("input file not found: {}", .0.display())]
    InputMissing(PathBuf),
    #[error("{field} must be a positive integer, got {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("required tool not found on PATH: {0}")]
    MissingTool(&'static str),
    #[error("failed to execute {TRAINER_TOOL}")]
    Exec(#[source] anyhow::Error),
}

/// Validate the arguments and assemble the `spm_train` invocation.
pub fn build_command(args: &TrainArgs) -> Result<CommandSpec, TrainError> {
    if !args.input.is_file() {
        return Err(TrainError::InputMissing(args.input.clone()));
    }
    let vocab_size = parse_count("vocab_size", &args.vocab_size)?;
    let max_sentences = args
        .max_sentences
        .as_deref()
        .map(|value| parse_count("max_sentences", value))
        .transpose()?;

    let mut spec = CommandSpec::new(TRAINER_TOOL)
        .arg(format!("--input={}", args.input.display()))
        .arg(format!("--model_prefix={}", args.model_name))
        .arg(format!("--vocab_size={vocab_size}"))
        .arg("--character_coverage=1.0")
        .arg("--model_type=unigram");
    if let Some(max) = max_sentences {
        spec = spec
            .arg(format!("--input_sentence_size={max}"))
            .arg("--shuffle_input_sentence=true");
    }
    Ok(spec)
}

/// Run the trainer. Returns the tool's exit code untouched.
pub fn run(args: &TrainArgs, runner: &dyn CommandRunner) -> Result<i32, TrainError> {
    let spec = build_command(args)?;
    let tool = runner
        .find_tool(TRAINER_TOOL)
        .ok_or(TrainError::MissingTool(TRAINER_TOOL))?;
    let spec = CommandSpec {
        program: tool.display().to_string(),
        args: spec.args,
    };
    info!("running: {spec}");
    runner.run(&spec).map_err(TrainError::Exec)
}

fn parse_count(field: &'static str, value: &str) -> Result<u64, TrainError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TrainError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}
