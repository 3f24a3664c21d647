//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod logging;
mod mgmt;
mod privileges;
mod sections;

use std::path::Path;

use clap::{App, Arg};
use nomen_fwd::forwarder::{self, Forwarder};
use nomen_fwd::name_tree::HashtableOptions;
use nomen_utils::face::{FACEID_INTERNAL, FaceScope, LinkType};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ConfigSection;
use crate::mgmt::{AcceptAll, Dispatcher, FaceEventStream};
use crate::privileges::{EXIT_PRIVILEGE_FAILURE, PrivilegeHelper};
use crate::sections::DaemonConfig;

const DFLT_CONFIG_FILE: &str = "/etc/nomen/nomend.conf";

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Nomen forwarding daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("config-test")
                .long("config-test")
                .help("Validate the configuration file and exit."),
        )
        .get_matches();

    // Read and validate the configuration file.
    let config_file =
        matches.value_of("config").unwrap_or(DFLT_CONFIG_FILE).to_owned();
    let config = match load_config(Path::new(&config_file)) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(2);
        }
    };
    if matches.is_present("config-test") {
        println!("{config_file}: OK");
        return;
    }

    // Initialize tracing.
    logging::init(&config.log);

    // Resolve the unprivileged identity before anything else can fail.
    let privileges = match PrivilegeHelper::initialize(
        config.general.user.as_deref(),
        config.general.group.as_deref(),
    ) {
        Ok(privileges) => privileges,
        Err(error) => {
            error!(%error, "privilege helper initialization failed");
            std::process::exit(EXIT_PRIVILEGE_FAILURE);
        }
    };

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    // We're ready to go!
    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            run(config, privileges).await;
        });
}

fn load_config(path: &Path) -> Result<DaemonConfig, config::ConfigError> {
    let root = ConfigSection::parse_file(path)?;
    DaemonConfig::from_section(&root, &path.display().to_string())
}

async fn run(config: DaemonConfig, privileges: PrivilegeHelper) {
    // Channels: the forwarder's own message loop, and one ibus channel
    // toward each loop.
    let (fw_msgp, fw_msgc) = mpsc::unbounded_channel();
    let (main_ibus_tx, main_ibus_rx) = mpsc::unbounded_channel();
    let (rib_ibus_tx, rib_ibus_rx) = mpsc::unbounded_channel();
    let (face_event_tx, mut face_event_rx) = mpsc::unbounded_channel();

    // The forwarding plane, configured from the tables section.
    let mut forwarder =
        Forwarder::new(HashtableOptions::default(), fw_msgp.clone());
    forwarder.set_ibus_tx(rib_ibus_tx);
    forwarder.set_face_event_tx(face_event_tx);
    forwarder
        .content_store_mut()
        .set_limit(config.tables.cs_max_packets);
    forwarder.set_unsolicited_policy(config.tables.cs_unsolicited_policy);
    for (prefix, strategy) in &config.tables.strategy_choice {
        // Unknown strategies fail fast at startup.
        if !forwarder.set_strategy_choice(prefix, strategy) {
            error!(%prefix, %strategy, "unknown strategy in configuration");
            std::process::exit(2);
        }
    }
    for region in &config.tables.network_region {
        info!(%region, "network region configured");
    }

    // The internal management face exists from startup; the face system
    // attaches the remaining transports at runtime.
    let (internal_tx, _internal_rx) = mpsc::unbounded_channel();
    forwarder.faces_mut().add_reserved(
        FACEID_INTERNAL,
        FaceScope::Local,
        LinkType::PointToPoint,
        None,
        Some(internal_tx),
    );
    let dispatcher =
        Dispatcher::new(fw_msgp.clone(), Box::new(AcceptAll));

    // Transports are bound; drop to the configured identity.
    if let Err(error) = privileges.drop_privileges() {
        error!(%error, "failed to drop privileges");
        std::process::exit(EXIT_PRIVILEGE_FAILURE);
    }

    // Spawn the two loops.
    let (_rib_msgp, _rib_task) = nomen_rib::start(main_ibus_tx, rib_ibus_rx);
    let _fw_task = forwarder::start(forwarder, fw_msgc, main_ibus_rx);

    // The faces/events notification stream; the dispatcher serves it to
    // management clients.
    let _mgmt_task = nomen_utils::task::Task::spawn(async move {
        let _dispatcher = dispatcher;
        let mut events = FaceEventStream::new(256);
        while let Some(event) = face_event_rx.recv().await {
            let seq = events.push(event);
            info!(seq, "face event recorded");
        }
    });

    // Run until asked to stop.
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
