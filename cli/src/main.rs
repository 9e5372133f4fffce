mod cli;

use crate::cli::DevproxyArguments;
use anyhow::Result;
use devproxy::server;
use log::{LevelFilter, info, trace};

#[tokio::main]
async fn main() -> Result<()> {
    let args = DevproxyArguments::parse_or_exit();
    pretty_env_logger::env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.is_verbose() { LevelFilter::Trace } else { LevelFilter::Info })
        .init();

    info!("Starting devproxy");
    trace!("Arguments: {:#?}", args);

    let config = match args.resolve_config().await {
        Ok(config) => config,
        Err(e) if e.is_configuration() => DevproxyArguments::exit_with_usage(e),
        Err(e) => return Err(e.into()),
    };

    print!("{}", server::banner(&config));

    match server::run(config).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_configuration() => DevproxyArguments::exit_with_usage(e),
        Err(e) => Err(e.into()),
    }
}
