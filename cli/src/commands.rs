//! Intake CLI commands
//!
//! Each subcommand maps onto one `IntakeService` operation. `--as` carries
//! the already-authenticated caller identity. Results are printed as JSON.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use intake_core::{Answers, Identity, IntakeService, SessionId, SqliteStore};
use std::io::Read;
use std::path::PathBuf;

/// Survey intake operator tool
#[derive(Debug, Parser)]
#[command(name = "intake", version)]
pub struct Cli {
    /// Config file (overrides INTAKE_CONFIG and ~/.config/intake/intake.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Session lifecycle commands
    #[command(subcommand)]
    Session(SessionCommand),

    /// Save and read response records
    #[command(subcommand)]
    Responses(ResponsesCommand),

    /// Merge several sessions into one identity's record
    Merge(MergeArgs),

    /// Population histograms over identified records
    Analytics(CallerArgs),

    /// Store reachability and row counts
    Health,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start an anonymous session
    Create {
        /// Client-supplied device identifier
        #[arg(long)]
        device: String,
    },

    /// Show one session
    Show {
        #[arg(value_name = "SESSION_ID")]
        session: String,
    },

    /// Bind a session to an identity
    Link {
        #[arg(long)]
        session: String,

        #[arg(long)]
        identity: String,

        #[command(flatten)]
        caller: CallerArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ResponsesCommand {
    /// Save (or partially update) the answers of a session
    Save {
        #[arg(long)]
        session: String,

        /// Answer set as JSON, or `-` to read it from stdin
        #[arg(long, value_name = "JSON")]
        json: String,

        /// Authenticated caller to stamp on the record
        #[arg(long = "as", value_name = "IDENTITY")]
        caller: Option<String>,
    },

    /// Show the record of a session
    Show {
        #[arg(long)]
        session: String,
    },

    /// List an identity's records, newest first
    List {
        #[arg(long)]
        identity: String,

        #[command(flatten)]
        caller: CallerArgs,
    },
}

#[derive(Debug, Args)]
pub struct CallerArgs {
    /// Authenticated caller identity
    #[arg(long = "as", value_name = "IDENTITY")]
    pub caller: String,
}

impl CallerArgs {
    fn identity(&self) -> Identity {
        Identity::new(self.caller.as_str())
    }
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Identity that receives the merged record
    #[arg(long)]
    pub identity: String,

    /// Sessions to merge (repeat the flag)
    #[arg(long = "session", value_name = "SESSION_ID", required = true)]
    pub sessions: Vec<String>,

    #[command(flatten)]
    pub caller: CallerArgs,
}

/// Context attached when the answer payload does not deserialize.
///
/// Wrong JSON types (`"age": "abc"`, an age beyond `i32`) are rejected input,
/// so the entry point reports them as validation errors.
#[derive(Debug)]
pub struct MalformedAnswers;

impl std::fmt::Display for MalformedAnswers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("answers are not a valid JSON answer set")
    }
}

/// Parse an answer set from the `--json` argument
pub fn parse_answers(raw: &str) -> anyhow::Result<Answers> {
    let payload = if raw == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read answers from stdin")?;
        buf
    } else {
        raw.to_string()
    };
    serde_json::from_str(&payload).context(MalformedAnswers)
}

impl Command {
    /// Execute against `svc` and return the JSON to print
    pub async fn run(self, svc: &IntakeService<SqliteStore>) -> anyhow::Result<serde_json::Value> {
        let value = match self {
            Command::Session(SessionCommand::Create { device }) => {
                serde_json::to_value(svc.create_session(device).await?)?
            }
            Command::Session(SessionCommand::Show { session }) => {
                serde_json::to_value(svc.get_session(SessionId::new(session)).await?)?
            }
            Command::Session(SessionCommand::Link {
                session,
                identity,
                caller,
            }) => {
                let session = SessionId::new(session);
                let identity = Identity::new(identity);
                let linked = svc.link_session(&caller.identity(), session, identity).await?;
                serde_json::to_value(linked)?
            }
            Command::Responses(ResponsesCommand::Save {
                session,
                json,
                caller,
            }) => {
                let answers = parse_answers(&json)?;
                let caller = caller.map(Identity::new);
                serde_json::to_value(
                    svc.save_responses(SessionId::new(session), answers, caller.as_ref())
                        .await?,
                )?
            }
            Command::Responses(ResponsesCommand::Show { session }) => serde_json::to_value(
                svc.get_responses_by_session(SessionId::new(session)).await?,
            )?,
            Command::Responses(ResponsesCommand::List { identity, caller }) => {
                serde_json::to_value(
                    svc.get_responses_by_identity(&caller.identity(), Identity::new(identity))
                        .await?,
                )?
            }
            Command::Merge(args) => {
                let sessions = args.sessions.into_iter().map(SessionId::new).collect();
                let identity = Identity::new(args.identity);
                serde_json::to_value(
                    svc.merge_sessions(&args.caller.identity(), identity, sessions).await?,
                )?
            }
            Command::Analytics(caller) => {
                serde_json::to_value(svc.get_analytics(&caller.identity()).await?)?
            }
            Command::Health => serde_json::to_value(svc.health().await?)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge_with_repeated_sessions() {
        let cli = Cli::try_parse_from([
            "intake",
            "merge",
            "--identity",
            "u1",
            "--session",
            "session_a",
            "--session",
            "session_b",
            "--as",
            "u1",
        ])
        .expect("parse");
        match cli.command {
            Command::Merge(args) => {
                assert_eq!(args.identity, "u1");
                assert_eq!(args.sessions, vec!["session_a", "session_b"]);
                assert_eq!(args.caller.caller, "u1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_merge_requires_a_session() {
        let err = Cli::try_parse_from(["intake", "merge", "--identity", "u1", "--as", "u1"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_link_requires_caller() {
        let err = Cli::try_parse_from([
            "intake",
            "session",
            "link",
            "--session",
            "session_a",
            "--identity",
            "u1",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["intake", "health", "--config", "/tmp/intake.toml"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/intake.toml")));
    }

    #[test]
    fn test_parse_answers() {
        let answers = parse_answers(r#"{"name":"Sam","age":25}"#).expect("parse");
        assert_eq!(answers.name.as_deref(), Some("Sam"));
        assert_eq!(answers.age, Some(25));
        assert!(parse_answers("not json").is_err());
    }

    #[test]
    fn test_wrongly_typed_answers_are_marked_malformed() {
        for raw in [r#"{"age":"abc"}"#, r#"{"age":99999999999}"#, r#"{"name":7}"#] {
            let err = parse_answers(raw).expect_err(raw);
            assert!(err.downcast_ref::<MalformedAnswers>().is_some(), "{raw}");
        }
    }
}
