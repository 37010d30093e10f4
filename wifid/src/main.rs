//! wifid: drives client and soft-AP state machines over nl80211.

#![deny(warnings)]
#![allow(non_local_definitions)]

mod config;
mod station;
mod watcher;

use std::cell::RefCell;
use std::rc::Rc;

use failure::Error;
use log::{error, info};

use wifi_nl80211::rtnl::RtnlHandle;

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build the runtime");
    let local = tokio::task::LocalSet::new();
    if let Err(e) = local.block_on(&runtime, run()) {
        error!("wifid terminated: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    info!("wifid starting");

    let (handle, events, driver) = wifi_nl80211::new_connection().await?;
    tokio::task::spawn_local(driver);

    let rtnl = Rc::new(RefCell::new(RtnlHandle::new()?));

    let filter = watcher::Filter::from_patterns(
        std::env::var("WIFID_ALLOW").ok().as_deref(),
        std::env::var("WIFID_BLOCK").ok().as_deref(),
    );

    watcher::serve(handle, rtnl, events, filter).await
}
