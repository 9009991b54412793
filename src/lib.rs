//! Solar surplus power-balancing engine.
//!
//! Every cycle meters each active solar system once, decides whether its
//! sinks should be nudged toward consuming or producing, throttles that
//! through per-channel cooldowns read back from the action log, delivers the
//! nudge and appends the outcome to the log.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod controller;
pub mod decision;
pub mod domain;
pub(crate) mod http;
pub mod metering;
pub mod recorder;
pub mod telemetry;
