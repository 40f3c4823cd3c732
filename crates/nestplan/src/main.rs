use clap::Parser;
use nestplan::{Cli, init_logging, run};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let result = run(&cli);
    if let Err(err) = &result {
        tracing::error!("nestplan failed: {err}");
    }
    result
}
