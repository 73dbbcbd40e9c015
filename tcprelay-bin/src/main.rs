mod common;

use anyhow::Result;
use clap::{arg, ArgMatches};
use tcprelay::config::RelayConfig;

fn main() -> Result<()> {
    let args = get_args();
    common::init_log(&args)?;
    let config = RelayConfig {
        listen: args
            .get_one::<String>("LOCAL")
            .cloned()
            .unwrap_or_default(),
        remote: args
            .get_one::<String>("REMOTE")
            .cloned()
            .unwrap_or_default(),
        session: common::session_options(&args),
    };
    common::run(config)
}

fn get_args() -> ArgMatches {
    common::with_common_args(
        clap::command!()
            .arg(arg!(<LOCAL> "Address to accept connections on, e.g. 0.0.0.0:8080"))
            .arg(arg!(<REMOTE> "Address every accepted connection is relayed to, e.g. example.com:80")),
    )
    .get_matches()
}
