//! Native messaging host for the tabtrail tab history engine.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod event_loop;
pub mod logging;
pub mod routes;
pub mod state;
pub mod websocket;
