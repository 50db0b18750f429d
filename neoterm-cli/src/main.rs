use anyhow::Result;
use clap::Parser;
use neoterm_cli::cli::{Cli, Command};
use neoterm_cli::util::{self, LogTarget};
use neoterm_cli::{commands, repl};
use neoterm_core::config::{self, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref())?;

    let log_file = config::data_dir().map(|d| d.join("neoterm.log"));
    match (&log_file, cli.is_interactive()) {
        (Some(path), true) => util::init_tracing(cli.verbose, LogTarget::File(path))?,
        _ => util::init_tracing(cli.verbose, LogTarget::Stderr)?,
    }
    util::install_panic_hook();

    // `config` works on the file itself, even a broken one for `path`
    if let Some(Command::Config { action }) = &cli.command {
        return commands::config(&config_path, action);
    }

    let config = Config::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration ready");

    match cli.command {
        None => repl::run(config).await,
        Some(Command::Exec { command }) => {
            let code = commands::exec(config, &command.join(" ")).await?;
            std::process::exit(code);
        }
        Some(Command::History {
            search,
            limit,
            export,
        }) => commands::history(&config, search.as_deref(), limit, export),
        Some(Command::Bookmarks) => commands::bookmarks(&config),
        Some(Command::Config { .. }) => Ok(()),
    }
}
