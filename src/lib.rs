//! Hlsforged - HLS streaming of MP4 files
//!
//! This library crate exposes the request handling around
//! `hlsforged-media` for the binary and for integration testing.

pub mod cache;
pub mod config;
pub mod handler;
pub mod view_count;

pub use handler::{Handler, HandlerError, Request, Response};
