//! `plugins` crate: the `Plugin` capability, its registry, and built-in plugins.
//!
//! Every external producer of a node result implements [`Plugin`]. The engine
//! resolves plugins by id through a [`PluginRegistry`] rather than inspecting
//! objects at runtime.

pub mod builtin;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod plugin;
pub mod registry;

pub use envelope::EnvelopePlugin;
pub use error::PluginError;
pub use plugin::{Plugin, PluginResponse};
pub use registry::PluginRegistry;
