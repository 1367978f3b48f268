mod client;
pub mod types;

pub use client::{Client, Config, ConfigBuilder, Stats, connect, connect_with_config};
