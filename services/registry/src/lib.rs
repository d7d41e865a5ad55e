//! # Container Registry Dashboard
//!
//! A client for browsing and pruning a container registry which speaks the
//! [OCI Distribution](https://github.com/opencontainers/distribution-spec) /
//! Docker Registry HTTP API v2, plus a small JSON API for a dashboard front end.
//!
//! ## Features
//!
//! - Catalog and tag listings, one page at a time or as a stream
//! - Manifest fetch with digest and content type from the response headers
//! - Digest resolution, singly or as a concurrent batch
//! - Tag deletion (resolve the digest, then delete by digest)
//! - Static Basic authentication, per-client timeouts and cancellation
//!
//! ## Example
//!
//! ```no_run
//! use registry::{RegistryClient, RegistryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::new("https://registry.example.com")
//!     .with_credentials("admin", "hunter2");
//! let client = RegistryClient::new(config)?;
//!
//! let page = client.list_catalog_page(None, Some(50)).await?;
//! for name in page.items {
//!     let tags = client.list_tags(&name).await?;
//!     println!("{name}: {}", tags.join(", "));
//! }
//!
//! // Serve the dashboard API with axum
//! let app = registry::api::router(client);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
mod config;
mod error;
pub mod manifest;
pub mod pagination;

pub use client::RegistryClient;
pub use config::{DEFAULT_PAGE_SIZE, DEFAULT_REGISTRY_URL, RegistryConfig};
pub use error::{ErrorKind, RegistryError, RegistryResult};
pub use manifest::{Manifest, ManifestKind, format_bytes};
pub use pagination::{Page, decode_next_token, encode_query};
