//! The fetch/write primitive consumed by the coordination layer.
//!
//! The core never talks to the network directly. It is handed an
//! `Arc<dyn Transport>` and relies on it to avoid redundant transfers for
//! unchanged data (conditional requests and the like are the transport's
//! business), so the coordinator can call [`Transport::fetch`] liberally.
//!
//! Two implementations ship with the crate:
//! - [`HttpTransport`] speaks JSON over HTTP with `reqwest`.
//! - [`MemoryTransport`] serves fixtures from memory, counts calls and can
//!   inject failures or hold requests open; the CLI uses it for `--fixture`
//!   and the tests use it everywhere.
//!
//! # Content Conventions
//!
//! A transport returns `serde_json::Value`. `Value::Null` means the resource is
//! absent, and handles store it as `content == None`.

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{Fixture, MemoryTransport};

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::core::ResourceKey;

/// Asynchronous access to the remote resources.
pub trait Transport: Send + Sync + 'static {
    /// Read the current content at `key`.
    fn fetch<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<Value>>;

    /// Write `payload` to `key`, returning the server's response body.
    fn write<'a>(&'a self, key: &'a ResourceKey, payload: &'a Value)
    -> BoxFuture<'a, Result<Value>>;
}
