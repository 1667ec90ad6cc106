//! cfglock Server - command line front end for the cluster configuration lock
//!
//! This crate provides:
//! - Configuration loading (file, environment, command line)
//! - Logging startup
//! - Running programs under the configuration lock and probing lock status

pub mod model;
pub mod service;
pub mod startup;
