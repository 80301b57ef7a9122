/**
 * Storage abstraction the engines are written against.
 *  - the `Backend` download/upload contract
 *  - an in-memory backend for the portal binary and tests
 */
pub mod backend;
/**
 * Streaming archive writers (tar, tar+gzip, zip) over a
 *  pubfile payload streamer.
 */
pub mod archive;
/**
 * Access policy: blacklist and portal list with
 *  append-log persistence.
 */
pub mod policy;
/**
 * Bucketed latency counters for the stats endpoint.
 */
pub mod stats;
/**
 * The retrieval engine: publink resolution, default-path
 *  handling, format negotiation and body streaming.
 */
pub mod retrieval;
/**
 * Pinning a remote publink into the local store.
 */
pub mod pin;
/**
 * The upload path: raw-body and multipart pubfile assembly.
 */
pub mod upload;
/**
 * The axum HTTP surface and its error mapping.
 */
pub mod http;

mod config;
mod site_path;
mod state;
mod streamer;

pub use config::Config;
pub use site_path::{SitePath, SitePathError, PUBACCESS_FOLDER};
pub use state::{ServiceState, StateSetupError};
pub use streamer::LimitStreamer;
