//! HTTP data source for the creature API.
//!
//! This module provides `HttpDataSource`, the `DataSource` used by the
//! command line. It serves two endpoints:
//!
//! - `GET {base}/partitions/{partition}`: one partition page
//! - `GET {base}/creatures/{id}`: a single record

pub mod client;
pub mod error;

pub use client::HttpDataSource;
pub use error::SourceError;
