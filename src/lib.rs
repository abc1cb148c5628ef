//! # gab-rs
//!
//! A chat relay server and its wire protocol.
//!
//! The library provides the length-prefixed JSON codec, the authentication
//! primitives (connection handshake and password key-derivation), and the
//! SQLite persistence store. The `gab-server` binary drives them from a
//! tokio accept loop; admin and client front ends reuse the same library.

pub mod auth;
pub mod constants;
pub mod db;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
