use std::sync::Arc;

use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::crypto::{
    keys::{KdfParams, StaticKeys},
    VoteCryptography,
};
use crate::model::mongodb::ensure_indexes_exist;
use crate::service::Services;
use crate::store::{MongoStore, Stores};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_kdf_mem_cost")]
    kdf_mem_cost: u32,
    #[serde(default = "default_kdf_time_cost")]
    kdf_time_cost: u32,
    #[serde(default = "default_kdf_lanes")]
    kdf_lanes: u32,
    #[serde(default = "default_tally_batch_size")]
    tally_batch_size: u64,
    #[serde(default = "default_tally_parallelism")]
    tally_parallelism: usize,
    #[serde(default = "default_zero_report_window_minutes")]
    zero_report_window_minutes: u32,
    // secrets
    vote_master_key: String,
    signing_key: String,
    justification_key: String,
}

fn default_kdf_mem_cost() -> u32 {
    KdfParams::default().mem_cost
}

fn default_kdf_time_cost() -> u32 {
    KdfParams::default().time_cost
}

fn default_kdf_lanes() -> u32 {
    KdfParams::default().lanes
}

fn default_tally_batch_size() -> u64 {
    1000
}

fn default_tally_parallelism() -> usize {
    4
}

fn default_zero_report_window_minutes() -> u32 {
    10
}

impl Config {
    /// Argon2id cost parameters for per-seal key derivation.
    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            mem_cost: self.kdf_mem_cost,
            time_cost: self.kdf_time_cost,
            lanes: self.kdf_lanes,
        }
    }

    /// Ballots fetched per page when tallying or auditing.
    pub fn tally_batch_size(&self) -> u64 {
        self.tally_batch_size
    }

    /// Blocking workers decrypting one page concurrently.
    pub fn tally_parallelism(&self) -> usize {
        self.tally_parallelism
    }

    /// How long before voting opens a zero report may be generated.
    pub fn zero_report_window(&self) -> Duration {
        Duration::minutes(self.zero_report_window_minutes.into())
    }

    /// Master secret every ballot key is derived from.
    pub fn vote_master_key(&self) -> &[u8] {
        self.vote_master_key.as_bytes()
    }

    /// Secret key used to sign ballots.
    pub fn signing_key(&self) -> &[u8] {
        self.signing_key.as_bytes()
    }

    /// Secret key used to encrypt justifications.
    pub fn justification_key(&self) -> &[u8] {
        self.justification_key.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// creates the indexes the stores rely on, and places both a `Client` and a
/// `Database` into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // One valid ballot per voter per election is enforced by an index,
        // so refuse to start without it.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "ballot_seal".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// A fairing that loads the key material, builds the cryptography engine and
/// every service over the MongoDB stores, and places the services into
/// managed state. Must be attached after [`ConfigFairing`] and
/// [`DatabaseFairing`].
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.state::<Config>() {
            Some(config) => config,
            None => {
                error!("Services need the application config");
                return Err(rocket);
            }
        };
        let db = match rocket.state::<Database>() {
            Some(db) => db,
            None => {
                error!("Services need a database connection");
                return Err(rocket);
            }
        };

        let crypto = VoteCryptography::new(Arc::new(StaticKeys::from(config)), config.kdf());
        let services = Services::new(
            Stores::mongo(MongoStore::new(db)),
            Arc::new(crypto),
            config,
        );
        info!(
            "Services ready: tallying {} ballots per page on {} workers",
            config.tally_batch_size(),
            config.tally_parallelism()
        );

        Ok(services.manage(rocket))
    }
}
