//! Command implementations behind the `tslatency` subcommands.

pub mod recv;
pub mod send;
pub mod watch;
