pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod events;
#[doc(hidden)]
pub mod frame;
pub mod maps;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod telemetry;
pub mod tls;
pub mod tuple;

pub use config::Config;
pub use error::{NetsiftError, Result};
pub use pipeline::{Engine, HookContext, Verdict};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
