// Module structure for the echo daemon.

pub mod conf;
pub mod runtime;
pub mod session;
