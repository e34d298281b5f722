//! VOI relay core library — configuration, channels, request correlation,
//! the VOI API client, and the HTTP server used by the CLI.

pub mod channels;
pub mod config;
pub mod correlate;
pub mod relay;
pub mod server;
