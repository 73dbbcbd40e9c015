mod common;

use anyhow::Result;
use clap::{arg, ArgMatches};
use tcprelay::config::RelayConfig;

const LISTEN_ADDR: &str = "127.0.0.1:8080";

fn main() -> Result<()> {
    let args = get_args();
    common::init_log(&args)?;
    let mut config = RelayConfig::new(
        LISTEN_ADDR,
        args.get_one::<String>("REMOTE")
            .cloned()
            .unwrap_or_default(),
    );
    config.session = common::session_options(&args);
    common::run(config)
}

fn get_args() -> ArgMatches {
    common::with_common_args(
        clap::command!()
            .about("Relay connections accepted on 127.0.0.1:8080 to a remote address")
            .arg(arg!(<REMOTE> "Address every accepted connection is relayed to, e.g. example.com:80")),
    )
    .get_matches()
}
