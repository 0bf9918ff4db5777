//! fanart.tv integration: manifest download, parsing, and image acquisition.

pub mod acquisition;
pub mod artist_provider;
pub mod manifest;
pub mod manifest_fetcher;

pub use artist_provider::FanArtArtistProvider;
