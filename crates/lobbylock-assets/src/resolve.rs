//! Key markers to signed URLs, for handing a body to an editor or viewer.
//!
//! A marker is `wasabi-key:` followed by everything up to the next quote
//! character. Each distinct key is signed once, all keys concurrently, and
//! every occurrence is replaced. A single signing failure fails the call.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use futures::future::try_join_all;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::key::{KEY_PREFIX, StorageKey};
use crate::signer::AssetSigner;

#[allow(clippy::expect_used)]
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"{}([^"']+)"#, regex::escape(KEY_PREFIX)))
        .expect("marker pattern is a valid regex")
});

/// Distinct storage keys referenced by markers in `body`, in order of first
/// occurrence.
pub fn marker_keys(body: &str) -> Vec<StorageKey> {
    let mut seen = HashSet::new();
    MARKER
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|key| seen.insert(*key))
        .map(StorageKey::new)
        .collect()
}

/// Replace every key marker in `body` with a signed URL for its key.
///
/// Bodies that are empty or contain no markers are returned borrowed without
/// calling the signer. Otherwise one `sign` call per distinct key is issued,
/// all polled concurrently.
///
/// # Errors
///
/// [`ResolveError::Signing`] for the first key whose signing failed. No
/// partially substituted body is ever returned.
pub async fn resolve_for_display<'a, S>(
    signer: &S,
    body: &'a str,
    document_id: &str,
) -> Result<Cow<'a, str>, ResolveError>
where
    S: AssetSigner + ?Sized,
{
    if body.is_empty() {
        return Ok(Cow::Borrowed(body));
    }

    let keys = marker_keys(body);
    if keys.is_empty() {
        return Ok(Cow::Borrowed(body));
    }
    debug!(document_id, keys = keys.len(), "signing document assets");

    let signed = try_join_all(keys.iter().map(|key| async move {
        match signer.sign(document_id, key).await {
            Ok(url) => Ok((key.as_str(), url)),
            Err(source) => {
                warn!(document_id, %key, error = %source, "asset signing failed");
                Err(ResolveError::Signing {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }))
    .await?;
    let urls: HashMap<&str, String> = signed.into_iter().collect();

    Ok(MARKER.replace_all(body, |caps: &Captures<'_>| {
        let key = &caps[1];
        // Both scans use the same pattern, so every capture has a URL.
        urls.get(key)
            .cloned()
            .unwrap_or_else(|| caps[0].to_owned())
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SigningError;
    use crate::signer::MemorySigner;

    async fn signer_with(entries: &[(&str, &str)]) -> MemorySigner {
        let signer = MemorySigner::new();
        for (key, url) in entries {
            signer.insert(*key, *url).await;
        }
        signer
    }

    #[test]
    fn keys_stop_at_either_quote() {
        let body = r#"<img src="wasabi-key:documents/d1/a.webp"><img src='wasabi-key:documents/d1/b.webp'>"#;
        let keys = marker_keys(body);
        assert_eq!(
            keys,
            vec![
                StorageKey::new("documents/d1/a.webp"),
                StorageKey::new("documents/d1/b.webp"),
            ]
        );
    }

    #[test]
    fn keys_are_distinct_in_first_occurrence_order() {
        let body = r#"<img src="wasabi-key:b"><img src="wasabi-key:a"><img src="wasabi-key:b">"#;
        assert_eq!(
            marker_keys(body),
            vec![StorageKey::new("b"), StorageKey::new("a")]
        );
    }

    #[test]
    fn bare_prefix_is_not_a_marker() {
        assert!(marker_keys(r#"<img src="wasabi-key:">"#).is_empty());
    }

    #[tokio::test]
    async fn empty_body_makes_no_calls() {
        let signer = MemorySigner::new();
        let out = resolve_for_display(&signer, "", "d1").await.unwrap();
        assert!(matches!(out, Cow::Borrowed("")));
        assert!(signer.calls().await.is_empty());
    }

    #[tokio::test]
    async fn body_without_markers_is_unchanged() {
        let signer = MemorySigner::new();
        let body = r#"<p>hello</p><img src="https://other.example/logo.png">"#;
        let out = resolve_for_display(&signer, body, "d1").await.unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, body);
        assert!(signer.calls().await.is_empty());
    }

    #[tokio::test]
    async fn single_marker_is_replaced() {
        let signer =
            signer_with(&[("documents/d1/a.webp", "https://cdn.example/signed?sig=abc")]).await;
        let out = resolve_for_display(&signer, r#"<img src="wasabi-key:documents/d1/a.webp">"#, "d1")
            .await
            .unwrap();
        assert_eq!(out, r#"<img src="https://cdn.example/signed?sig=abc">"#);
        assert_eq!(
            signer.calls().await,
            vec![("d1".to_owned(), StorageKey::new("documents/d1/a.webp"))]
        );
    }

    #[tokio::test]
    async fn repeated_marker_is_signed_once_and_replaced_everywhere() {
        let signer = signer_with(&[("documents/d1/a.webp", "https://cdn.example/a?sig=1")]).await;
        let body = r#"<img src="wasabi-key:documents/d1/a.webp"><p>x</p><img src="wasabi-key:documents/d1/a.webp">"#;

        let out = resolve_for_display(&signer, body, "d1").await.unwrap();
        assert_eq!(
            out,
            r#"<img src="https://cdn.example/a?sig=1"><p>x</p><img src="https://cdn.example/a?sig=1">"#
        );
        assert_eq!(signer.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn distinct_markers_are_signed_concurrently() {
        let signer = signer_with(&[
            ("documents/d1/a.webp", "https://cdn.example/a"),
            ("documents/d1/b.webp", "https://cdn.example/b"),
        ])
        .await;
        let body = r#"<img src="wasabi-key:documents/d1/a.webp"><img src="wasabi-key:documents/d1/b.webp">"#;

        let out = resolve_for_display(&signer, body, "d1").await.unwrap();
        assert_eq!(
            out,
            r#"<img src="https://cdn.example/a"><img src="https://cdn.example/b">"#
        );
        assert_eq!(signer.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn one_failure_fails_the_whole_body() {
        let signer = signer_with(&[("documents/d1/a.webp", "https://cdn.example/a")]).await;
        let body = r#"<img src="wasabi-key:documents/d1/a.webp"><img src="wasabi-key:documents/d1/missing.webp">"#;

        let err = resolve_for_display(&signer, body, "d1").await.unwrap_err();
        let ResolveError::Signing { key, source } = err;
        assert_eq!(key, "documents/d1/missing.webp");
        assert!(matches!(source, SigningError::NotFound { .. }));
    }

    #[tokio::test]
    async fn lenient_keys_reach_the_signer() {
        let signer = MemorySigner::new();
        let result = resolve_for_display(&signer, r#"<img src="wasabi-key:garbage">"#, "d1").await;
        assert!(result.is_err());
        assert_eq!(signer.calls().await[0].1, StorageKey::new("garbage"));
    }

    #[tokio::test]
    async fn surrounding_markup_is_untouched() {
        let signer = signer_with(&[("documents/d1/a.webp", "https://cdn.example/a")]).await;
        let body = r#"<p class="x">t</p><img alt="pic" src="wasabi-key:documents/d1/a.webp" width="40">"#;
        let out = resolve_for_display(&signer, body, "d1").await.unwrap();
        assert_eq!(
            out,
            r#"<p class="x">t</p><img alt="pic" src="https://cdn.example/a" width="40">"#
        );
    }

    #[tokio::test]
    async fn works_through_a_trait_object() {
        let signer: std::sync::Arc<dyn AssetSigner> =
            std::sync::Arc::new(signer_with(&[("k", "u")]).await);
        let out = resolve_for_display(&*signer, r#"<img src="wasabi-key:k">"#, "d1")
            .await
            .unwrap();
        assert_eq!(out, r#"<img src="u">"#);
    }
}
