//! # natsauth Conf
//!
//! Renders broker authentication configuration from credential state.
//!
//! Every renderer is a pure function of its inputs: the same users or
//! tokens produce byte-identical text regardless of the order they are
//! passed in (for preloads) or how often they are rendered.
//!
//! ## Key Types
//!
//! - [`FlatUser`] - One row of the flat `authorization` table
//! - [`AccountToken`] - An account token keyed by public id for preloading
//! - [`ResolverDirectory`] - On-disk resolver layout writer
//!
//! ## Usage
//!
//! ```rust
//! use natsauth_conf::{render_flat, render_preload, AccountToken, FlatUser};
//!
//! let flat = render_flat(&[FlatUser::with_password("svc", "pw")]);
//! assert!(flat.starts_with("authorization {"));
//!
//! let chain = render_preload(
//!     "OPERATOR.JWT",
//!     &[AccountToken { name: "prod".into(), public_key: "A…".into(), jwt: "ACCOUNT.JWT".into() }],
//! );
//! assert!(chain.contains("resolver_preload"));
//! ```

pub mod chain;
pub mod dir;
pub mod error;
pub mod flat;

pub use chain::{render_chain, render_directory, render_mixed, render_preload, AccountToken};
pub use dir::ResolverDirectory;
pub use error::{ConfError, Result};
pub use flat::{render_flat, FlatSecret, FlatUser};
