//! Types exchanged with callers of the core: HTTP bodies and service results.
//!
//! These serialise datetimes as RFC 3339 strings and never carry ciphertext
//! keys or plaintext choices unless explicitly requested.

pub mod actor;
pub mod audit;
pub mod cast;
pub mod receipt;
pub mod results;
pub mod seal;
pub mod status;
pub mod zero_report;
