//! JSON API for the latest snapshot, history windows, and manual runs

mod api;
mod server;

pub use server::WebServer;
