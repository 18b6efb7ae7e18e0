//! Ajar dashboard.
//!
//! Copyright (C) 2025  Ajar Developers
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use ajar_telemetry_lib::message::StateEvent;
use ajar_telemetry_lib::mqtt::{ChannelConfig, EventSubscriber};
use docopt::Docopt;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::{channel, error::RecvError, Sender};
use rocket::{Shutdown, State};
use std::fs::File;
use std::process::exit;
use std::sync::{Arc, Mutex};
use std::thread;

mod replica;
use crate::replica::{ReplicaState, Snapshot};

type SharedReplica = Arc<Mutex<ReplicaState>>;

const USAGE: &str = "
Ajar dashboard: subscribes to the telemetry channel, keeps a replica of the current door state, and streams it to live viewers.

Usage:
  ajar-dashboard [--config FILE]
  ajar-dashboard (--version | -v)
  ajar-dashboard (--help | -h)

Options:
    --config FILE       Configuration file [default: ajar.yaml]
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_config: String,
}

#[derive(Debug, Deserialize)]
struct DashboardConfig {
    channel: ChannelConfig,
}

/// Snapshot for a connecting viewer.
#[get("/")]
fn index(replica: &State<SharedReplica>) -> Json<Snapshot> {
    Json(replica.lock().unwrap().snapshot())
}

/// Live updates. Every session owns its last-sent snapshot and only
/// transmits when the replica differs from it; one session's pace never
/// affects another's view.
#[get("/events")]
fn events(
    replica: &State<SharedReplica>,
    updates: &State<Sender<Snapshot>>,
    mut end: Shutdown,
) -> EventStream![] {
    let replica = Arc::clone(replica.inner());
    let mut rx = updates.subscribe();

    EventStream! {
        // The connect-time snapshot went out with the page itself; seed
        // the diff baseline with it instead of re-sending.
        let mut last_sent = replica.lock().unwrap().snapshot();

        loop {
            let snapshot = select! {
                update = rx.recv() => match update {
                    Ok(snapshot) => snapshot,
                    // This session missed broadcasts; resynchronize from
                    // the replica itself.
                    Err(RecvError::Lagged(_)) => replica.lock().unwrap().snapshot(),
                    Err(RecvError::Closed) => break,
                },
                _ = &mut end => break,
            };

            if snapshot == last_sent {
                continue;
            }

            yield Event::json(&snapshot);
            last_sent = snapshot;
        }
    }
}

/// Drains the bounded inbound queue: malformed payloads are dropped with
/// a log line, valid events mutate the replica and wake every session.
fn inbound_worker(subscriber: EventSubscriber, replica: SharedReplica, updates: Sender<Snapshot>) {
    while let Some(payload) = subscriber.recv() {
        let event = match StateEvent::from_payload(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping a malformed message ({e}).");
                continue;
            }
        };

        let snapshot = {
            let mut replica = replica.lock().unwrap();
            replica.apply(&event);
            replica.snapshot()
        };
        info!(
            "Received update: {} at {}",
            event.door_state,
            snapshot.timestamp.as_deref().unwrap_or("-")
        );

        // No receivers just means no viewer is connected right now.
        let _ = updates.send(snapshot);
    }
}

#[launch]
fn rocket() -> _ {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config_file = match File::open(&args.flag_config) {
        Ok(file) => file,

        Err(_error) => {
            println!(
                "Error retrieving the {} file, see example_ajar.yaml for an example configuration.",
                args.flag_config
            );
            exit(1);
        }
    };
    let config: DashboardConfig = match serde_yml::from_reader(config_file) {
        Ok(config) => config,
        Err(e) => {
            println!("Could not parse {}: {e}", args.flag_config);
            exit(1);
        }
    };

    let subscriber = match EventSubscriber::connect(&config.channel) {
        Ok(subscriber) => subscriber,
        Err(e) => {
            println!("Could not reach the telemetry channel ({e}).");
            exit(1);
        }
    };

    let replica: SharedReplica = Arc::new(Mutex::new(ReplicaState::new()));
    let (updates_tx, _) = channel::<Snapshot>(16);

    let worker_replica = Arc::clone(&replica);
    let worker_updates = updates_tx.clone();
    thread::spawn(move || {
        inbound_worker(subscriber, worker_replica, worker_updates);
    });

    rocket::build()
        .manage(replica)
        .manage(updates_tx)
        .mount("/", routes![index, events])
}
