use std::sync::Arc;

use clap::Parser;

use cc_core::{Cli, CoreConfig, CoreState, Dispatcher};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CoreConfig::load(&cli)?;
    cc_core::logging::init(&config.log_level);

    tracing::info!(bind = %config.bind, "starting cybercached");

    let state = Arc::new(CoreState::new(config));
    let mut dispatcher = Dispatcher::new(state);
    dispatcher.start();

    // The wire-protocol listener that would accept connections and decode
    // requests into `cc_core::Command`s is out of scope for this engine;
    // here we just keep the actor threads alive.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
