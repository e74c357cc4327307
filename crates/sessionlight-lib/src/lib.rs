//! sessionlight: one status light shared by many concurrent work sessions.
//!
//! Each session reports its mode through a short-lived invocation. The
//! invocations coordinate only through the filesystem: a session registry
//! ([`state`]) guarded by a token-file lock ([`lock`]). The merged mode
//! ([`arbiter`]) is pushed to every configured indicator ([`registry`],
//! [`device`]), and settled modes dim after a delay ([`dim`]).

pub mod arbiter;
pub mod config;
pub mod controller;
pub mod device;
pub mod dim;
pub mod error;
pub mod led;
pub mod lock;
pub mod mode;
pub mod registry;
pub mod state;

pub use error::SessionlightError;
pub use mode::ModeTag;
