pub mod base;
pub mod client;
pub mod logging;
pub mod server;

pub use base::*;
pub use client::*;
pub use logging::*;
pub use server::*;
