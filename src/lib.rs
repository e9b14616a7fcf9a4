//! PHD2 Remote-Control Client
//!
//! This crate provides a Rust client for the Open PHD Guiding 2 (PHD2)
//! event socket: JSON RPC calls and unsolicited status notifications
//! share one TCP connection on port 4400 + instance - 1. A background
//! reader task routes replies to their pending call and folds events
//! into a live status model (guiding phase, settle progress, star-loss
//! diagnostics, running guide-error statistics) that any task can poll.

pub mod client;
pub mod config;
mod connection;
pub mod error;
pub mod events;
pub mod io;
pub mod rpc;
pub mod stats;
pub mod status;

pub use client::{Phd2Client, Profile};
pub use config::{instance_port, load_config, Config, Phd2Config, SettleParams};
pub use error::{Phd2Error, Result};
pub use events::{AppState, GuideStepStats, Phd2Event};
pub use stats::GuideAccumulator;
pub use status::{GuideStats, GuiderStatus, SettleProgress, StarLostInfo};
