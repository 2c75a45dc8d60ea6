//! Console command parsing.

use crate::models::{MessageAction, TaskId};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Chat(String),
    Upload(PathBuf),
    Cancel(TaskId),
    Retry(TaskId),
    Delete(TaskId),
    Status(TaskId),
    Action { action: MessageAction, seq: u64 },
    Export(u64),
    Files,
    Reindex,
    Clear,
    Quit,
}

impl std::str::FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err("empty input".to_string());
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(ConsoleCommand::Chat(line.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        match name {
            "upload" => Ok(ConsoleCommand::Upload(PathBuf::from(required(name, argument, "a path")?))),
            "cancel" => Ok(ConsoleCommand::Cancel(required(name, argument, "a task id")?.into())),
            "retry" => Ok(ConsoleCommand::Retry(required(name, argument, "a task id")?.into())),
            "delete" => Ok(ConsoleCommand::Delete(required(name, argument, "a task id")?.into())),
            "status" => Ok(ConsoleCommand::Status(required(name, argument, "a task id")?.into())),
            "summarize" | "humanize" => Ok(ConsoleCommand::Action {
                action: name.parse()?,
                seq: message_number(name, argument)?,
            }),
            "export" => Ok(ConsoleCommand::Export(message_number(name, argument)?)),
            "files" => Ok(ConsoleCommand::Files),
            "reindex" => Ok(ConsoleCommand::Reindex),
            "clear" => Ok(ConsoleCommand::Clear),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(format!("Unknown command: /{}", other)),
        }
    }
}

fn required<'a>(name: &str, argument: &'a str, what: &str) -> Result<&'a str, String> {
    if argument.is_empty() {
        Err(format!("/{} requires {}", name, what))
    } else {
        Ok(argument)
    }
}

fn message_number(name: &str, argument: &str) -> Result<u64, String> {
    required(name, argument, "a message number")?
        .parse::<u64>()
        .map_err(|_| format!("/{} expects a message number", name))
}
