//! Signed URLs back to key markers, immediately before a body is persisted.
//!
//! The body is parsed as HTML and every `<img src>` is resolved against an
//! origin. Sources whose path contains `documents/` and ends in `.webp` are
//! system uploads and get rewritten to `wasabi-key:<key>`; external images,
//! other formats and existing markers are left alone.

use std::borrow::Cow;

use kuchikiki::traits::TendrilSink;
use tracing::debug;
use url::Url;

use crate::error::NormalizeError;
use crate::key::{StorageKey, parse_marker};

/// Origin relative image sources are resolved against.
pub const DEFAULT_ORIGIN: &str = "http://localhost/";

const BODY_PREAMBLE: &str = "<!DOCTYPE html><html><head></head><body>";

/// Rewrite system-managed image sources in `body` to key markers, resolving
/// relative sources against [`DEFAULT_ORIGIN`].
///
/// # Errors
///
/// See [`normalize_for_storage_with_origin`].
pub fn normalize_for_storage(body: &str) -> Result<Cow<'_, str>, NormalizeError> {
    let origin = Url::parse(DEFAULT_ORIGIN).map_err(|e| NormalizeError::Parse {
        reason: format!("invalid default origin: {e}"),
    })?;
    normalize_for_storage_with_origin(body, &origin)
}

/// Rewrite system-managed image sources in `body` to key markers.
///
/// Returns the input borrowed when it is empty or nothing needed rewriting,
/// so untouched bodies stay byte-identical. Otherwise the contents of the
/// parsed `<body>` are re-serialized.
///
/// # Errors
///
/// - [`NormalizeError::Parse`] if the parsed tree has no body element.
/// - [`NormalizeError::Serialize`] / [`NormalizeError::Encoding`] if the
///   rewritten tree cannot be turned back into a UTF-8 string.
pub fn normalize_for_storage_with_origin<'a>(
    body: &'a str,
    origin: &Url,
) -> Result<Cow<'a, str>, NormalizeError> {
    if body.is_empty() {
        return Ok(Cow::Borrowed(body));
    }

    // Opening the body explicitly puts the parser in body mode first, so
    // leading comments and head-only elements (style, title, meta, link,
    // base) stay among the body's children instead of moving to <head>.
    let document = kuchikiki::parse_html().one(format!("{BODY_PREAMBLE}{body}"));
    let images = document.select("img").map_err(|()| NormalizeError::Parse {
        reason: "image selector rejected".to_owned(),
    })?;

    let mut rewritten = 0usize;
    for img in images {
        let mut attrs = img.attributes.borrow_mut();
        let Some(key) = attrs.get("src").and_then(|src| storage_key_for(src, origin)) else {
            continue;
        };
        attrs.insert("src", key.marker());
        rewritten += 1;
    }

    if rewritten == 0 {
        return Ok(Cow::Borrowed(body));
    }
    debug!(rewritten, "normalized image sources to key markers");

    let root = document
        .select_first("body")
        .map_err(|()| NormalizeError::Parse {
            reason: "no body element in parsed document".to_owned(),
        })?;

    let mut out = Vec::with_capacity(body.len());
    for child in root.as_node().children() {
        child.serialize(&mut out)?;
    }
    Ok(Cow::Owned(String::from_utf8(out)?))
}

/// The storage key an image source points at, if it is a system upload.
fn storage_key_for(src: &str, origin: &Url) -> Option<StorageKey> {
    if parse_marker(src).is_some() {
        return None;
    }
    let resolved = origin.join(src).ok()?;
    StorageKey::from_asset_path(resolved.path())
}
