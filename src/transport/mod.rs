//! Transport module - TCP plumbing for the command, control and alert ports.

mod tcp;

pub use tcp::{send_once, CommandConnection};
