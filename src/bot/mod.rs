//! Chat front end: turns chat messages into pipeline calls and the
//! results back into replies. Transport is left to the caller.

use crate::model::TrainConfig;
use crate::parsing::tabular::load_dataset;
use crate::parsing::Dataset;
use crate::pipeline::{self, PipelineRequest};
use crate::preprocess::MissingPolicy;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub mod command;

pub use command::{Command, CommandError, TrainArgs, COMMANDS};

/// Incoming chat update. Unknown fields are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    pub chat: Option<Chat>,
    pub text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Outgoing reply, optionally with an image to attach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<PathBuf>,
}

impl Reply {
    fn text(chat_id: i64, text: impl Into<String>) -> Reply {
        Reply {
            chat_id,
            text: text.into(),
            photo: None,
        }
    }
}

/// Settings used when a `/train` command leaves an option out
#[derive(Debug, Clone)]
pub struct Defaults {
    pub split_ratio: f64,
    pub seed: u64,
    pub policy: MissingPolicy,
    pub train: TrainConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            split_ratio: 0.8,
            seed: 42,
            policy: MissingPolicy::Drop,
            train: TrainConfig::default(),
        }
    }
}

pub struct Dispatcher {
    /// Datasets are looked up inside this directory only
    pub data_dir: PathBuf,
    /// Plots are written here, one file per chat
    pub output_dir: PathBuf,
    pub defaults: Defaults,
}

impl Dispatcher {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Dispatcher {
        Dispatcher {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            defaults: Defaults::default(),
        }
    }

    /// Reply to an update, or None when it carries no chat to answer
    pub fn handle_update(&self, update: &Update) -> Option<Reply> {
        let message = update.message.as_ref().or(update.edited_message.as_ref())?;
        let chat_id = message.chat.as_ref()?.id;
        let text = message
            .text
            .as_deref()
            .or(message.caption.as_deref())
            .unwrap_or("");

        Some(self.handle_text(chat_id, text))
    }

    pub fn handle_text(&self, chat_id: i64, text: &str) -> Reply {
        debug!("chat {} sent {:?}", chat_id, text);

        match text.parse::<Command>() {
            Ok(command) => self.dispatch(chat_id, command),
            Err(CommandError::NotACommand) => Reply::text(
                chat_id,
                "⚠️ No command detected. Send /help for the list of commands.",
            ),
            Err(e) => Reply::text(chat_id, format!("⚠️ {}\n\n{}", e, help_text())),
        }
    }

    pub fn dispatch(&self, chat_id: i64, command: Command) -> Reply {
        match command {
            Command::Start => Reply::text(
                chat_id,
                format!(
                    "Send a dataset name to train a linear model on it.\n\n{}",
                    help_text()
                ),
            ),
            Command::Help => Reply::text(chat_id, help_text()),
            Command::Describe { source } => self.describe(chat_id, &source),
            Command::Train(args) => self.train(chat_id, args),
        }
    }

    fn describe(&self, chat_id: i64, source: &str) -> Reply {
        let path = match self.resolve(source) {
            Ok(path) => path,
            Err(text) => return Reply::text(chat_id, text),
        };

        match load_dataset(&path) {
            Ok(dataset) => Reply::text(chat_id, describe_dataset(source, &dataset)),
            Err(e) => Reply::text(chat_id, format!("❌ load failed: {}", e)),
        }
    }

    fn train(&self, chat_id: i64, args: TrainArgs) -> Reply {
        let source = match self.resolve(&args.source) {
            Ok(path) => path,
            Err(text) => return Reply::text(chat_id, text),
        };

        let request = PipelineRequest {
            source,
            target: args.target,
            split_ratio: args.ratio.unwrap_or(self.defaults.split_ratio),
            seed: args.seed.unwrap_or(self.defaults.seed),
            output_path: self.plot_path(chat_id),
            policy: args.policy.unwrap_or(self.defaults.policy),
            train: self.defaults.train.clone(),
            export_path: None,
        };

        info!("chat {} requested training on {}", chat_id, args.source);

        match pipeline::run(&request) {
            Ok(run) => Reply {
                chat_id,
                text: format!(
                    "✅ Trained on {} rows, evaluated on {} rows\n{}",
                    run.train_rows,
                    run.eval_rows,
                    run.report.summary()
                ),
                photo: Some(run.artifact.path),
            },
            Err(e) => Reply::text(chat_id, format!("❌ {} failed: {}", e.stage(), e)),
        }
    }

    /// Per-chat plot file, so concurrent chats never write the same image
    pub fn plot_path(&self, chat_id: i64) -> PathBuf {
        self.output_dir.join(format!("plot_{}.png", chat_id))
    }

    /// Only plain relative names below the data directory are allowed.
    /// An existing file must also resolve, symlinks followed, inside it
    fn resolve(&self, source: &str) -> Result<PathBuf, String> {
        let relative = Path::new(source);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let refused = || format!("⚠️ '{}' is not a dataset name", source);

        if !plain {
            return Err(refused());
        }

        let path = self.data_dir.join(relative);
        if let Ok(real) = path.canonicalize() {
            let inside = self
                .data_dir
                .canonicalize()
                .map_or(false, |dir| real.starts_with(dir));
            if !inside {
                return Err(refused());
            }
        }

        Ok(path)
    }
}

fn help_text() -> String {
    let lines: Vec<String> = COMMANDS
        .iter()
        .map(|(usage, about)| format!("{} - {}", usage, about))
        .collect();

    format!("Commands:\n{}", lines.join("\n"))
}

fn describe_dataset(source: &str, dataset: &Dataset) -> String {
    let mut text = format!("{}: {} rows\n", source, dataset.num_records());

    for (idx, (name, kind)) in dataset.columns().iter().zip(dataset.kinds()).enumerate() {
        let missing = dataset
            .records()
            .iter()
            .filter(|r| r[idx].is_missing())
            .count();
        text.push_str(&format!("- {} ({}, {} missing)\n", name, kind, missing));
    }

    text.trim_end().to_string()
}
