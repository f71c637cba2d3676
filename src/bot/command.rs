use crate::preprocess::MissingPolicy;
use clap::ValueEnum;
use std::str::FromStr;
use thiserror::Error;

/// Names and one-line descriptions of the chat commands, in help order
pub const COMMANDS: [(&str, &str); 4] = [
    ("/start", "introduce the bot"),
    ("/help", "list the commands"),
    ("/describe <file>", "show the columns of a dataset"),
    (
        "/train <file> [target=<column>] [ratio=<0..1>] [seed=<n>] [policy=drop|impute]",
        "train, evaluate and plot",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Describe { source: String },
    Train(TrainArgs),
}

/// Arguments of `/train`. Unset options fall back to the dispatcher defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainArgs {
    pub source: String,
    pub target: Option<String>,
    pub ratio: Option<f64>,
    pub seed: Option<u64>,
    pub policy: Option<MissingPolicy>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("no command detected")]
    NotACommand,
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("{command} needs a {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("invalid value '{value}' for {option}")]
    InvalidValue { option: String, value: String },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Command, CommandError> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next().ok_or(CommandError::NotACommand)?;
        if !head.starts_with('/') {
            return Err(CommandError::NotACommand);
        }
        // Group chats address commands as /train@botname
        let name = head.split('@').next().unwrap_or(head);
        let args: Vec<&str> = tokens.collect();

        match name {
            "/start" => no_args(&args).map(|_| Command::Start),
            "/help" => no_args(&args).map(|_| Command::Help),
            "/describe" => match args.as_slice() {
                [source] => Ok(Command::Describe {
                    source: source.to_string(),
                }),
                [] => Err(CommandError::MissingArgument {
                    command: "/describe",
                    argument: "file name",
                }),
                [_, extra, ..] => Err(CommandError::UnexpectedArgument(extra.to_string())),
            },
            "/train" => parse_train(&args).map(Command::Train),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn no_args(args: &[&str]) -> Result<(), CommandError> {
    match args.first() {
        Some(extra) => Err(CommandError::UnexpectedArgument(extra.to_string())),
        None => Ok(()),
    }
}

fn parse_train(args: &[&str]) -> Result<TrainArgs, CommandError> {
    let (source, options) = match args.split_first() {
        Some((source, options)) if !source.contains('=') => (source, options),
        _ => {
            return Err(CommandError::MissingArgument {
                command: "/train",
                argument: "file name",
            })
        }
    };

    let mut parsed = TrainArgs {
        source: source.to_string(),
        ..TrainArgs::default()
    };

    for option in options {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| CommandError::UnexpectedArgument(option.to_string()))?;
        let invalid = || CommandError::InvalidValue {
            option: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "target" if !value.is_empty() => parsed.target = Some(value.to_string()),
            "target" => return Err(invalid()),
            "ratio" => parsed.ratio = Some(value.parse().map_err(|_| invalid())?),
            "seed" => parsed.seed = Some(value.parse().map_err(|_| invalid())?),
            "policy" => {
                parsed.policy = Some(
                    <MissingPolicy as ValueEnum>::from_str(value, true).map_err(|_| invalid())?,
                )
            }
            _ => return Err(CommandError::UnknownOption(key.to_string())),
        }
    }

    Ok(parsed)
}
