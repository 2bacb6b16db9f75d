//! Our subcommands.

pub mod evaluate;
pub mod schema;
