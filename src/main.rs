use clap::Parser;
use color_eyre::Result;
use salonbook::cli::{self, Cli, Commands};
use salonbook::delivery::LogChannel;
use salonbook::{Agenda, Config, Database, Profile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so command output on stdout stays scriptable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "salonbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match &cli.config {
        Some(path) => Config::load_from_path(std::path::Path::new(path))?,
        None => Config::load_with_profile(profile)?,
    };

    let db_path = config.get_database_path();
    let db = Database::with_timeout(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
        config.store_timeout(),
    )?;

    let agenda = Agenda::new(&db, LogChannel, config.agenda_options());
    let command = cli.command.unwrap_or(Commands::Today);
    cli::dispatch(command, &agenda, &config, cli.json)?;

    Ok(())
}
