use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aclsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative access control for SQL Server", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest path (defaults to ./aclsync.toml)
    #[arg(short, long, global = true, env = "ACLSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// State file path (defaults to .aclsync/state.toml beside the manifest)
    #[arg(long, global = true, env = "ACLSYNC_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Refresh tracked entities and show what apply would change
    Plan(TargetArgs),

    /// Converge the server to the manifest
    Apply(ApplyArgs),

    /// Re-read tracked entities and record drift without changing anything
    Refresh(TargetArgs),

    /// Drop every tracked entity, in reverse order
    Destroy(DestroyArgs),

    /// Start tracking an existing entity declared in the manifest
    Import {
        /// Address of the declaration (e.g., sql_login.app)
        address: String,
    },

    /// List tracked entities
    State {
        /// Print tracked state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up one object on the server without tracking it
    Show {
        /// Entity kind (e.g., sql_login, database_role, schema)
        kind: String,

        /// Object name
        name: String,

        /// Database holding the object, for database-scoped kinds
        #[arg(short, long)]
        database: Option<String>,

        /// Print the object as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the native SID for a directory object or client id
    Sid {
        /// GUID, with or without hyphens
        guid: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
pub struct TargetArgs {
    /// Only this kind or address (e.g., users, schema, sql_login.app)
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only this kind or address (e.g., users, schema, sql_login.app)
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Stop at the first failed change
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Only this kind or address
    pub target: Option<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["aclsync", "apply", "users", "--dry-run", "-y"]);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.target.as_deref(), Some("users"));
                assert!(args.dry_run);
                assert!(args.yes);
                assert!(!args.fail_fast);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_show_args() {
        let cli = Cli::parse_from(["aclsync", "show", "schema", "sales", "-d", "app"]);
        match cli.command {
            Command::Show {
                kind,
                name,
                database,
                json,
            } => {
                assert_eq!((kind.as_str(), name.as_str()), ("schema", "sales"));
                assert_eq!(database.as_deref(), Some("app"));
                assert!(!json);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["aclsync", "state", "--json", "-vv", "--config", "x.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
