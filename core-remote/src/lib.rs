//! # Remote Record Server Client
//!
//! Client interface for the remote record-management server.
//!
//! ## Overview
//!
//! This module provides:
//! - Typed wire values (`RemoteValue`, `RemoteRecord`) for record payloads
//! - Schema introspection types (`FieldKind`, `RemoteSchema`)
//! - The `RemoteClient` trait the sync engine programs against
//! - A concrete JSON-RPC implementation (`RpcClient`) over HTTP
//!
//! The server exposes, per entity type, `search`, `search_read`, `read`,
//! `fields_get`, `create`, `write` (partial update), `unlink` and selected
//! named actions. Authentication is session-based per call: credentials are
//! passed with every request, there is no token refresh.

pub mod client;
pub mod error;
pub mod rpc;
pub mod types;

pub use client::{Filter, RemoteClient};
pub use error::{RemoteError, Result};
pub use rpc::{RpcClient, RpcConfig};
pub use types::{FieldDescriptor, FieldKind, RemoteRecord, RemoteSchema, RemoteValue};
