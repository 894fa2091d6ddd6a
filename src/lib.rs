#![deny(missing_docs)]
//! A small, multithreaded HTTP gateway that turns JSON requests into redis hash commands.
//!
//! Client devices, identified by a machine uuid, use the gateway to register, to upload and
//! download "encrypted file" records, and to append and page through "trace" records kept on
//! those files. The gateway keeps no state of its own: every record lives in the store.
//!
//! ## Endpoints
//! Every endpoint takes a `POST` with a JSON body (at most 1024 bytes):
//!
//! - `/userregister` register a machine's user, `flag` 1 always writes, 0 is get-or-create
//! - `/userget` look up a registration
//! - `/fileset` store a file record, the whole body is kept
//! - `/fileget` fetch a file record by `uuid`
//! - `/filegetall` page through a machine's files
//! - `/filesettrace` append a trace entry to a file
//! - `/filegettrace` page through a file's trace entries
//!
//! Paging uses the store's own scan cursor: send `"page": 0` to start and pass back the
//! `page` of each reply until it comes back as `0`.
//!
//! Outcomes that carry no payload are reported with a fixed envelope, one of [`STROK`],
//! [`STRFAIL`] or [`STRNOFOUND`].
//!
//! ## Layers
//! - [`handlers`] parse a request body into a record from [`record`] and run it
//! - the [`Executor`] looks each [`Operation`] up in the command table, formats it and sends it
//!   through a [`StoreEngine`]
//! - the [`decode`] functions turn the store's reply into an [`Outcome`]
//! - [`GatewayServer`] accepts HTTP requests and hands each to a [`ThreadPool`]
//!
//! The [`RedisEngine`] opens a new connection for every command and closes it straight
//! after. A store that cannot be reached fails the request with a 503; the server keeps
//! running.

pub use command::{Arg, Operation};
pub use config::{Config, EngineKind, PoolKind, TlsConfig};
pub use decode::{Outcome, STRFAIL, STRNOFOUND, STROK};
pub use engine::{MemoryEngine, RedisEngine, StoreEngine};
pub use error::{KsError, Result};
pub use executor::Executor;
pub use server::{bind, Gateway, GatewayServer, HttpReply, MAX_BODY};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

pub mod command;
pub mod config;
pub mod decode;
mod engine;
mod error;
mod executor;
pub mod handlers;
pub mod record;
mod server;
pub mod thread_pool;
