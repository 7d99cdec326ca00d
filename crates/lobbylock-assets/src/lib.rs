//! Asset reference resolution for `LobbyLock` document bodies.
//!
//! Stored document bodies reference uploaded images by key marker
//! (`wasabi-key:documents/<id>/<name>.webp`). Markers are durable; signed URLs
//! expire. This crate moves a body between the two forms:
//!
//! - [`resolve_for_display`] signs every distinct marker key through an
//!   [`AssetSigner`] and substitutes the URLs, before the body is handed to an
//!   editor or viewer.
//! - [`normalize_for_storage`] rewrites system-managed image URLs back to
//!   markers, immediately before the body is submitted to the document store.
//!
//! # Example
//!
//! ```rust,no_run
//! use lobbylock_assets::{HttpSigner, normalize_for_storage, resolve_for_display};
//!
//! # async fn example(stored: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let signer = HttpSigner::new(std::env::var("LOBBYLOCK_TOKEN").unwrap_or_default())?;
//! let editable = resolve_for_display(&signer, stored, "42").await?;
//! let to_save = normalize_for_storage(&editable)?;
//! assert_eq!(to_save, stored);
//! # Ok(())
//! # }
//! ```

mod error;
mod http;
mod key;
mod normalize;
mod resolve;
mod signer;

pub use error::{KeyError, NormalizeError, ResolveError, SigningError};
pub use http::{HttpSigner, SignerConfig};
pub use key::{ASSET_EXTENSION, DOCUMENTS_SEGMENT, KEY_PREFIX, StorageKey, parse_marker};
pub use normalize::{DEFAULT_ORIGIN, normalize_for_storage, normalize_for_storage_with_origin};
pub use resolve::{marker_keys, resolve_for_display};
pub use signer::{AssetSigner, MemorySigner};
