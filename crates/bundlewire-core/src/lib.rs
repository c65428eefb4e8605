//! Core data types for bundlewire.
//!
//! This crate defines the inputs of a resolve: the resource arena with its
//! capabilities and requirements, OSGi versions and LDAP filters, wirings of
//! already-resolved resources, the TOML repository description, and user
//! configuration.
//!
//! This crate is intentionally free of resolver logic.

pub mod config;
pub mod filter;
pub mod manifest;
pub mod model;
pub mod version;
pub mod wiring;
