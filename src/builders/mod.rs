//! Construction of the core components from configuration.

pub mod context;

pub use context::{AppContext, AppContextBuilder};
