//! Documentation-driven client core for the Habitica REST API.
//!
//! # Overview
//! The service documents its endpoints with apiDoc tags. This crate parses
//! that documentation, folds the endpoints into a tree of path segments and
//! exposes the tree through `ApiProxy`, a fluent call chain that turns
//! `descend("tasks").descend(id).descend("score").descend("up")` into
//! `POST /api/v3/tasks/{id}/score/up` without per-endpoint bindings.
//!
//! # Design
//! - `apidoc` parses text into `EndpointRecord`s, skipping (and reporting)
//!   fragments it does not understand.
//! - `tree` builds the read-only `EndpointNode` tree, shared by `Arc`.
//! - `proxy` splits every call into `build_request` / `parse_response`
//!   around a `Transport`, so the I/O boundary is explicit and the C ABI can
//!   let its host do the round-trip.
//! - `cache` fetches the documentation and keeps it in an explicit on-disk
//!   cache object.
//! - `task_ids` parses `1,3-5` style id lists from the command line.

pub mod apidoc;
pub mod cache;
pub mod error;
pub mod http;
pub mod proxy;
pub mod task_ids;
pub mod tree;

pub use apidoc::{parse_apidoc, EndpointRecord, Param, ParamGroup, ParsedDoc, SkippedFragment};
pub use cache::{fetch_apidoc, ApiDocCache, DocSource, BUNDLED_APIDOC, DEFAULT_APIDOC_URL};
pub use error::{ApiError, CacheError, ParseError, TaskIdError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use proxy::{ApiProxy, ClientConfig, Connection, Credentials, API_PREFIX};
pub use task_ids::{parse_many, parse_task_ids, MAX_TASK_IDS};
pub use tree::EndpointNode;
