//! Group slug helpers.
//!
//! Slugs are the public identity of a group (`/group/{slug}/`). They are
//! derived with the `slug` crate and never change once a group exists.
//! Callers provide their own uniqueness predicate so the generation logic
//! stays independent of storage.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;
const MAX_SLUG_LEN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("`{slug}` is not a valid slug (lowercase letters, digits and hyphens only)")]
    Malformed { slug: String },
    #[error("slug `{slug}` exceeds {MAX_SLUG_LEN} characters")]
    TooLong { slug: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from a human-readable title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    truncate_slug(&mut candidate, MAX_SLUG_LEN);
    Ok(candidate)
}

/// Cut `slug` to at most `max_len` bytes without leaving a trailing hyphen.
/// Slugs produced by `slugify` are ASCII, so any byte index is a boundary.
fn truncate_slug(slug: &mut String, max_len: usize) {
    if slug.len() > max_len {
        slug.truncate(max_len);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
}

/// `base` with `-{attempt}` appended, shortened so the result still fits.
fn suffixed_slug(base: &str, attempt: usize) -> String {
    let suffix = format!("-{attempt}");
    let mut stem = base.to_string();
    truncate_slug(&mut stem, MAX_SLUG_LEN - suffix.len());
    stem.push_str(&suffix);
    stem
}

/// Accept an operator-supplied slug only when it is already in canonical form.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong {
            slug: slug.to_string(),
        });
    }
    if slugify(slug) != slug {
        return Err(SlugError::Malformed {
            slug: slug.to_string(),
        });
    }
    Ok(())
}

/// Produce a slug for `input` that the async predicate reports as unused.
///
/// Collisions are retried with a monotonic suffix (`-2`, `-3`, …).
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).await.map_err(SlugAsyncError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = suffixed_slug(&base, attempt);
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_handles_ascii_titles() {
        assert_eq!(derive_slug("Cats & Dogs").expect("slug"), "cats-dogs");
    }

    #[test]
    fn derive_slug_rejects_blank_titles() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn validate_slug_accepts_canonical_slugs() {
        assert!(validate_slug("test-slug").is_ok());
        assert!(validate_slug("grp").is_ok());
    }

    #[test]
    fn validate_slug_rejects_non_canonical_input() {
        assert_eq!(
            validate_slug("Test Slug"),
            Err(SlugError::Malformed {
                slug: "Test Slug".to_string()
            })
        );
        assert!(matches!(
            validate_slug(&"a".repeat(MAX_SLUG_LEN + 1)),
            Err(SlugError::TooLong { .. })
        ));
    }

    #[tokio::test]
    async fn generate_unique_slug_async_appends_suffix() {
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let existing = Arc::new(Mutex::new(vec!["book-club".to_string()]));

        let slug = generate_unique_slug_async("Book Club", |candidate| {
            let existing = existing.clone();
            let candidate = candidate.to_string();
            async move {
                let mut guard = existing.lock().await;
                if guard.contains(&candidate) {
                    Ok::<bool, std::convert::Infallible>(false)
                } else {
                    guard.push(candidate);
                    Ok::<bool, std::convert::Infallible>(true)
                }
            }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "book-club-2");
    }

    #[tokio::test]
    async fn suffixed_slugs_stay_within_column_width() {
        let title = "a".repeat(80);

        let slug = generate_unique_slug_async(&title, |candidate| {
            let accepted = candidate.ends_with("-5");
            async move { Ok::<bool, std::convert::Infallible>(accepted) }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug.len(), MAX_SLUG_LEN);
        assert!(slug.ends_with("-5"));
        assert!(slug.starts_with(&"a".repeat(MAX_SLUG_LEN - 2)));
    }

    #[test]
    fn suffix_never_follows_a_hyphen() {
        let base = format!("{}-bcd", "a".repeat(46));
        assert_eq!(base.len(), MAX_SLUG_LEN);
        assert_eq!(suffixed_slug(&base, 12), format!("{}-12", "a".repeat(46)));
    }
}
