//! Shared types for the xradio player: the track/channel model, the channel
//! catalog cache, configuration and platform paths.

pub mod catalog;
pub mod config;
pub mod model;
pub mod platform;
