//! Command handlers: bridge CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod deploy;
pub mod inspect;
pub mod plan;
pub mod util;
pub mod validate;
