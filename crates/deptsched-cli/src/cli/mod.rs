pub mod config;
pub mod fixture;
pub mod protocol;
pub mod runner;

pub use config::CliConfig;
pub use fixture::Fixture;
pub use protocol::{CliCommand, Response};
pub use runner::Session;
