//! # natsauth
//!
//! Keeps a NATS credential hierarchy signed, stored and rendered from
//! declared state.
//!
//! ## Overview
//!
//! Three kinds of object are declared in a [`Store`](store::Store):
//!
//! - **Operator**: the root of trust. Self-signs and owns the rendered
//!   broker configuration artifact.
//! - **Account**: a tenant, signed by its operator, carrying limits.
//! - **User**: a connecting principal. Either signed by its account (a
//!   credentials file) or a flat username/password entry.
//!
//! ## Key Concepts
//!
//! - **Level-triggered**: every reconcile re-reads the store and converges;
//!   running it twice changes nothing the second time.
//! - **Consistency guard**: a token is re-signed only when its claims, its
//!   issuer or its key changed. Seeds are never regenerated while one is
//!   stored.
//! - **Notification**: accounts and flat users bump an annotation on their
//!   operator and queue it, so the artifact is re-rendered.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use natsauth::{Controller, Engine, EngineConfig};
//! use natsauth::core::{AccountSpec, OperatorSpec};
//! use natsauth::store::{MemoryStore, StoreExt};
//!
//! async fn example() {
//!     let engine = Engine::new(MemoryStore::new(), EngineConfig::default());
//!     engine
//!         .store()
//!         .declare("root", &OperatorSpec::jwt("nats://nats:4222", "nats-auth"))
//!         .await
//!         .unwrap();
//!     engine.store().declare("prod", &AccountSpec::new("root")).await.unwrap();
//!
//!     let controller = Controller::new(engine);
//!     controller.enqueue_all().await.unwrap();
//!     let report = controller.run_until_idle(10).await;
//!     assert!(report.all_ready());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `natsauth::core` - Keys, claims, tokens and the declared-state schema
//! - `natsauth::store` - Record and object storage
//! - `natsauth::conf` - Configuration renderers

mod account;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
mod keys;
mod operator;
pub mod queue;
mod user;

pub use natsauth_conf as conf;
pub use natsauth_core as core;
pub use natsauth_store as store;

pub use config::EngineConfig;
pub use controller::{Controller, RunReport};
pub use engine::{last_update_annotation, Engine, Outcome, ANNOTATION_LAST_UPDATE};
pub use error::{ReconcileError, Result, Retry};
pub use queue::WorkQueue;
