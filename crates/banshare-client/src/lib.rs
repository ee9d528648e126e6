//! HTTP client for the banshare registry.
//!
//! This crate provides [`RegistryClient`] for pushing local bans, pulling the
//! registry's blocked/allowed/known lists, and releasing IPs.

mod client;
pub mod api;

pub use banshare_core::{Result, RetryConfig, ShareError};
pub use client::{RegistryClient, RegistryClientBuilder};
