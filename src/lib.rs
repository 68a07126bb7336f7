#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, ServicesFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

/// Assemble the server. Configuration, the database connection and the
/// services are all set up by fairings at ignition, in attachment order.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(ServicesFairing)
        .attach(LoggerFairing)
}
