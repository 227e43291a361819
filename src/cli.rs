use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::LinkFilter;

pub const USAGE: &str = "\
Usage: link-library [COMMAND]

  --run                          Run reminders and the chat listener (default)
  --ingest <text>                Store every URL found in <text>
  --list [all|unread|favorites|scheduled]
  --tags                         List all tags
  --stats                        Library statistics
  --read <url>                   Mark a link as read
  --favorite <url>               Mark a link as favorite
  --tag <url> <a,b,c>            Replace a link's tags
  --schedule <url> <rfc3339|none>
  --delete <url>
  --help";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    Ingest(String),
    List(LinkFilter),
    Tags,
    Stats,
    MarkRead(String),
    Favorite(String),
    SetTags { url: String, tags: Vec<String> },
    Schedule { url: String, at: Option<DateTime<Utc>> },
    Delete(String),
    Help,
}

impl Command {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let flag = args.first().map(String::as_str).unwrap_or("--run");
        let arg = |i: usize, name: &str| -> Result<String> {
            args.get(i)
                .cloned()
                .ok_or_else(|| AppError::InvalidArgument(format!("{} requires <{}>", flag, name)))
        };

        let command = match flag {
            "--run" => Command::Run,
            "--ingest" => Command::Ingest(args[1..].join(" ")),
            "--list" => Command::List(match args.get(1) {
                Some(filter) => filter.parse().map_err(AppError::InvalidArgument)?,
                None => LinkFilter::All,
            }),
            "--tags" => Command::Tags,
            "--stats" => Command::Stats,
            "--read" => Command::MarkRead(arg(1, "url")?),
            "--favorite" => Command::Favorite(arg(1, "url")?),
            "--tag" => Command::SetTags {
                url: arg(1, "url")?,
                tags: arg(2, "tags")?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            "--schedule" => {
                let url = arg(1, "url")?;
                let when = arg(2, "time")?;
                let at = if when == "none" {
                    None
                } else {
                    let parsed = DateTime::parse_from_rfc3339(&when).map_err(|e| {
                        AppError::InvalidArgument(format!("invalid time {:?}: {}", when, e))
                    })?;
                    Some(parsed.with_timezone(&Utc))
                };
                Command::Schedule { url, at }
            }
            "--delete" => Command::Delete(arg(1, "url")?),
            "--help" | "-h" => Command::Help,
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "unknown command {:?}\n\n{}",
                    other, USAGE
                )))
            }
        };

        if matches!(&command, Command::Ingest(text) if text.trim().is_empty()) {
            return Err(AppError::InvalidArgument("--ingest requires <text>".to_string()));
        }
        Ok(command)
    }
}
