mod cli;
mod commands;
mod config;
mod engine;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Manifest;
use mssqlkit::{SqlCatalog, SqlcmdTransport};
use state::StateFile;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub manifest_path: PathBuf,
    pub state_path: PathBuf,
}

impl Context {
    pub fn manifest(&self) -> Result<Manifest> {
        log::debug!("Loading manifest {}", self.manifest_path.display());
        Manifest::load(&self.manifest_path)
    }

    pub fn load_state(&self) -> Result<StateFile> {
        StateFile::load(&self.state_path)
    }

    pub fn catalog(&self, manifest: &Manifest) -> Result<SqlCatalog<SqlcmdTransport>> {
        let settings = manifest.settings()?;
        log::info!("Connecting to {}:{}", settings.hostname, settings.port);
        Ok(mssqlkit::sqlcmd_catalog(settings))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let manifest_path = config::manifest_path(cli.config.as_deref());
    let state_path = cli
        .state
        .unwrap_or_else(|| state::default_path(&manifest_path));
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest_path,
        state_path,
    };

    let result = match cli.command {
        Command::Plan(args) => commands::declarative::plan(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::declarative::apply(&ctx, &args),
        Command::Refresh(args) => commands::declarative::refresh(&ctx, args.target.as_deref()),
        Command::Destroy(args) => commands::declarative::destroy(&ctx, &args),
        Command::Import { address } => commands::import::run(&ctx, &address),
        Command::State { json } => commands::state::run(&ctx, json),
        Command::Show {
            kind,
            name,
            database,
            json,
        } => commands::show::run(&ctx, &kind, &name, database.as_deref(), json),
        Command::Sid { guid } => commands::sid::run(&guid),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "aclsync", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(err) = &result
        && let Some(cause) = err
            .chain()
            .find_map(|c| c.downcast_ref::<mssqlkit::Error>())
    {
        let category = cause.category();
        ui::error(&format!("{}: {cause}", category.description()));
        ui::dim(category.advice());
    }
    result
}
