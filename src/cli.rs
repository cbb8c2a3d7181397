use std::path::PathBuf;

use clap::Parser;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::MessageId;

#[derive(Parser, Debug)]
#[command(name = "feedwire")]
#[command(version)]
#[command(about = "Headless client for server-rendered chat feeds over a task-tagged WebSocket protocol")]
pub struct Args {
    /// WebSocket endpoint, e.g. ws://127.0.0.1:8080/ws (overrides the config file)
    #[arg(long)]
    pub server: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Feed filter sent with the initial `messages` request
    #[arg(long)]
    pub filter: Option<String>,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Answer yes to every delete confirmation
    #[arg(long, short = 'y')]
    pub assume_yes: bool,
}

impl Args {
    /// Config file (or defaults) with the command-line overrides applied.
    pub fn resolve_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(filter) = &self.filter {
            config.initial_filter = Some(filter.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// One line typed on stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    ScrollTop,
    ScrollBottom,
    ScrollTo(f64),
    /// Replace the open draft's content.
    Type(String),
    New,
    Edit(MessageId),
    Send,
    Save,
    Reply(MessageId),
    SendReply { to_sender_only: bool },
    Stash(MessageId),
    Pin(MessageId),
    Unpin(MessageId),
    Delete { message_id: MessageId, confirmed: bool },
    DeleteDraft { confirmed: bool },
    Upload { partition_id: u64, paths: Vec<PathBuf> },
    Filter(Option<String>),
    Show,
    Quit,
}

pub const COMMAND_HELP: &str = "commands: scroll top|bottom|<px>, type <text>, new, edit <id>, send, save, \
reply <id>, send-reply [--sender-only], stash <id>, pin <id>, unpin <id>, delete <id> [-y], \
delete-draft [-y], upload <partition> <path>..., filter [name], show, quit";

fn message_id(arg: Option<&str>) -> std::result::Result<MessageId, String> {
    let raw = arg.ok_or("missing message id")?;
    raw.parse()
        .map(MessageId)
        .map_err(|_| format!("invalid message id: {raw}"))
}

fn confirmed(rest: &[&str]) -> bool {
    rest.iter().any(|a| matches!(*a, "-y" | "--yes"))
}

impl UserCommand {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        if let Some(text) = line.strip_prefix("type ") {
            return Ok(UserCommand::Type(text.to_owned()));
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, rest)) = words.split_first() else {
            return Err("empty command".into());
        };
        let first = rest.first().copied();
        match verb {
            "scroll" => match first {
                Some("top") => Ok(UserCommand::ScrollTop),
                Some("bottom") => Ok(UserCommand::ScrollBottom),
                Some(px) => px
                    .parse()
                    .map(UserCommand::ScrollTo)
                    .map_err(|_| format!("invalid scroll position: {px}")),
                None => Err("scroll needs top, bottom or a pixel offset".into()),
            },
            "type" => Ok(UserCommand::Type(String::new())),
            "new" => Ok(UserCommand::New),
            "edit" => message_id(first).map(UserCommand::Edit),
            "send" => Ok(UserCommand::Send),
            "save" => Ok(UserCommand::Save),
            "reply" => message_id(first).map(UserCommand::Reply),
            "send-reply" => Ok(UserCommand::SendReply {
                to_sender_only: rest.contains(&"--sender-only"),
            }),
            "stash" => message_id(first).map(UserCommand::Stash),
            "pin" => message_id(first).map(UserCommand::Pin),
            "unpin" => message_id(first).map(UserCommand::Unpin),
            "delete" => Ok(UserCommand::Delete {
                message_id: message_id(first)?,
                confirmed: confirmed(rest),
            }),
            "delete-draft" => Ok(UserCommand::DeleteDraft {
                confirmed: confirmed(rest),
            }),
            "upload" => {
                let partition = first.ok_or("upload needs a partition id")?;
                let partition_id = partition
                    .parse()
                    .map_err(|_| format!("invalid partition id: {partition}"))?;
                let paths: Vec<PathBuf> = rest[1..].iter().map(PathBuf::from).collect();
                if paths.is_empty() {
                    return Err("upload needs at least one file".into());
                }
                Ok(UserCommand::Upload {
                    partition_id,
                    paths,
                })
            }
            "filter" => Ok(UserCommand::Filter(first.map(str::to_owned))),
            "show" => Ok(UserCommand::Show),
            "quit" | "exit" => Ok(UserCommand::Quit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("scroll top", UserCommand::ScrollTop)]
    #[case("scroll bottom", UserCommand::ScrollBottom)]
    #[case("scroll 120", UserCommand::ScrollTo(120.0))]
    #[case("send", UserCommand::Send)]
    #[case("save", UserCommand::Save)]
    #[case("  new  ", UserCommand::New)]
    #[case("reply 42", UserCommand::Reply(MessageId(42)))]
    #[case("send-reply", UserCommand::SendReply { to_sender_only: false })]
    #[case("send-reply --sender-only", UserCommand::SendReply { to_sender_only: true })]
    #[case("stash 7", UserCommand::Stash(MessageId(7)))]
    #[case("delete 7", UserCommand::Delete { message_id: MessageId(7), confirmed: false })]
    #[case("delete 7 -y", UserCommand::Delete { message_id: MessageId(7), confirmed: true })]
    #[case("delete-draft --yes", UserCommand::DeleteDraft { confirmed: true })]
    #[case("filter", UserCommand::Filter(None))]
    #[case("filter pinned", UserCommand::Filter(Some("pinned".into())))]
    #[case("quit", UserCommand::Quit)]
    fn test_parse_commands(#[case] line: &str, #[case] expected: UserCommand) {
        assert_eq!(UserCommand::parse(line).unwrap(), expected);
    }

    #[test]
    fn test_type_keeps_spacing() {
        assert_eq!(
            UserCommand::parse("type hello   world ").unwrap(),
            UserCommand::Type("hello   world".into())
        );
    }

    #[test]
    fn test_upload_paths_in_order() {
        assert_eq!(
            UserCommand::parse("upload 3 b.png a.png").unwrap(),
            UserCommand::Upload {
                partition_id: 3,
                paths: vec![PathBuf::from("b.png"), PathBuf::from("a.png")],
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("stash")]
    #[case("pin abc")]
    #[case("upload 3")]
    #[case("upload x a.png")]
    #[case("dance")]
    fn test_parse_rejects(#[case] line: &str) {
        assert!(UserCommand::parse(line).is_err());
    }

    #[test]
    fn test_args_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_url = \"ws://file/ws\"\nautosave_interval_ms = 750").unwrap();
        let path = file.path().to_str().unwrap().to_owned();
        let args = Args::try_parse_from([
            "feedwire",
            "--config",
            path.as_str(),
            "--server",
            "ws://flag/ws",
            "--filter",
            "unread",
            "-y",
        ])
        .unwrap();
        let config = args.resolve_config().unwrap();
        assert_eq!(config.server_url, "ws://flag/ws");
        assert_eq!(config.autosave_interval_ms, 750);
        assert_eq!(config.initial_filter.as_deref(), Some("unread"));
        assert!(args.assume_yes);
    }

    #[test]
    fn test_args_invalid_server_rejected() {
        let args = Args::try_parse_from(["feedwire", "--server", "http://nope"]).unwrap();
        assert!(args.resolve_config().is_err());
    }
}
