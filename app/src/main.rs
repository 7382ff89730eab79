use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;

use cli::{CacheAction, Cli, Commands};
use commands::Context;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);

    let ctx = Context::load(cli.prefs.as_deref(), cli.cache_root)?;
    match cli.command {
        Commands::Scan { folders } => commands::scan(&ctx, folders),
        Commands::Thumbs(args) => commands::thumbs(&ctx, args),
        Commands::Cache { action } => match action {
            CacheAction::Info => commands::cache_info(&ctx),
            CacheAction::Clear => commands::cache_clear(&ctx),
            CacheAction::Trim { max_mb } => commands::cache_trim(&ctx, max_mb),
            CacheAction::Sweep { folders } => commands::cache_sweep(&ctx, folders),
        },
    }
}
