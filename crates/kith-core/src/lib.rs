//! kith-core - Platform process layer for kith
//!
//! Everything kith does, it does by running external tools. This crate is
//! the one place that touches OS process primitives: a lazy handle over a
//! single child-process launch, an anonymous pipe for handing a secret to a
//! child without putting it in argv or the environment, and the config-home
//! resolution the tools above share.

pub mod exec;
pub mod paths;
pub mod pipe;

pub use exec::{ExecError, Invocation, Lines, Payload};
pub use paths::config_home;
pub use pipe::SecretChannel;
