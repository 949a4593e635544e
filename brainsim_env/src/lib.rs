//! brainsim Environment Layer
//!
//! Everything the simulation engine reads from the outside world goes
//! through this crate:
//! - **Parameters**: `ParameterSet`, persisted by a `ParameterStore`
//! - **Persistence**: `ConfigSource` (JSON file in production, memory in tests)
//! - **Time**: `EngineContext`
//!
//! Nothing here is a process-wide singleton; callers construct the store and
//! context they need and pass them by reference.
//!
//! # Example
//!
//! ```no_run
//! use brainsim_env::{JsonFileSource, ParameterStore};
//!
//! let mut store = ParameterStore::open(JsonFileSource::new("config.json"))?;
//! let duration: u64 = store.get("duration", 100);
//! store.set("last_duration", duration)?;
//! # Ok::<(), brainsim_env::ConfigError>(())
//! ```

mod context;
mod error;
mod params;
mod source;
mod store;
mod system_impl;

pub use context::EngineContext;
pub use error::ConfigError;
pub use params::ParameterSet;
pub use source::{ConfigSource, JsonFileSource, MemorySource};
pub use store::ParameterStore;
pub use system_impl::SystemContext;
