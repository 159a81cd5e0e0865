//! geneos-ctl: Command-line interface for the Geneos control plane
//!
//! Provides the `geneos` CLI for listing, starting, stopping and
//! configuring instances on the local host and SSH-reachable hosts.

pub mod commands;
pub mod output;
