//! S-Life - personalized vital thresholds and risk alerting for a wearable
//! health band.
//!
//! # Overview
//!
//! The band streams heart rate, body temperature, SpO2, a fall flag and GPS.
//! S-Life turns each sample into a health score and risk alerts measured
//! against thresholds personalized for the wearer's age and chronic
//! conditions, and notifies an emergency contact when something is wrong.
//!
//! # Alerting
//!
//! Remote alerts go through a dispatcher that rate-limits per alert type,
//! probes the internet, and walks an ordered chain of channels (email, then
//! SMS with a compose fallback) until one succeeds. On-device notifications
//! and alarms fire independently of that chain.
//!
//! # Persistence
//!
//! Samples are stored remotely when online and in a bounded SQLite queue
//! otherwise; the queue is flushed when connectivity returns.
//!
//! # Modules
//!
//! - [`model`]: Profiles, samples, thresholds, reports and alert types
//! - [`thresholds`]: Personal threshold calculation and classification
//! - [`evaluation`]: Health score and risk alerts for one sample
//! - [`geofence`]: Safe-zone containment
//! - [`dispatcher`]: Rate-limited, network-aware alert delivery
//! - [`channels`]: Email, SMS and local notification channels
//! - [`offline`]: Offline sample queue and remote record store
//! - [`session`]: Ingest pipeline tying everything together
//! - [`storage`]: SQLite storage layer
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod channels;
pub mod config;
pub mod cooldown;
pub mod dispatcher;
pub mod evaluation;
pub mod geofence;
pub mod history;
pub mod model;
pub mod network;
pub mod offline;
pub mod platform;
pub mod session;
pub mod storage;
pub mod thresholds;
