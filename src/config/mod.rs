#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command};
pub use toml_config::{
    ColumnSpec, DependentListing, DomainConfig, ListingConfig, PrimaryListing, SourceConfig,
    SyncConfig,
};
