//! Slug derivation.
//!
//! Derives a stable, filesystem-safe identifier from an entity's
//! human-editable title. Deterministic: the same title always yields the
//! same slug. Exact collisions between distinct entities are disambiguated
//! by the caller with [`disambiguate`].

/// Maximum slug length in bytes. Long titles are truncated at a separator
/// boundary so paths stay readable.
pub const MAX_SLUG_LEN: usize = 80;

/// Derives a filesystem-safe slug from a display title.
///
/// Lower-cases, strips diacritics from Latin-1 letters, collapses runs of
/// non-alphanumeric characters into single `-` separators, and truncates to
/// [`MAX_SLUG_LEN`]. Titles with no usable characters yield `"untitled"`.
///
/// # Examples
///
/// ```rust
/// use vaultsync::slug::slugify;
///
/// assert_eq!(slugify("Access Management"), "access-management");
/// assert_eq!(slugify("Identity & Access Management"), "identity-and-access-management");
/// assert_eq!(slugify("Café Été"), "cafe-ete");
/// ```
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        // "&" reads better spelled out than dropped
        if c == '&' {
            push_word(&mut slug, "and", &mut pending_separator);
            continue;
        }

        for lower in c.to_lowercase() {
            if lower.is_ascii_alphanumeric() {
                if pending_separator {
                    slug.push('-');
                    pending_separator = false;
                }
                slug.push(lower);
            } else if let Some(folded) = fold_diacritic(lower) {
                if pending_separator {
                    slug.push('-');
                    pending_separator = false;
                }
                slug.push_str(folded);
            } else {
                pending_separator = !slug.is_empty();
            }
        }
    }

    if slug.is_empty() {
        return "untitled".to_string();
    }

    truncate_at_separator(&slug, MAX_SLUG_LEN)
}

/// Appends an id fragment to a slug to resolve an exact collision between
/// two distinct entities of the same kind.
///
/// The fragment is the first 8 characters of the entity id, which is enough
/// to distinguish UUIDs while keeping paths readable.
#[must_use]
pub fn disambiguate(slug: &str, entity_id: &str) -> String {
    let fragment: String = entity_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    if fragment.is_empty() {
        slug.to_string()
    } else {
        format!("{slug}-{fragment}")
    }
}

/// Checks whether a slug is safe to use as a file stem (no path traversal).
#[must_use]
pub fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN + 9
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn push_word(slug: &mut String, word: &str, pending_separator: &mut bool) {
    if !slug.is_empty() {
        slug.push('-');
    }
    slug.push_str(word);
    *pending_separator = false;
}

fn truncate_at_separator(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }
    let truncated = &slug[..max_len];
    truncated
        .rfind('-')
        .map_or_else(|| truncated.to_string(), |pos| truncated[..pos].to_string())
}

/// Maps common Latin-1 accented characters to their ASCII base.
/// Characters outside the table act as separators.
const fn fold_diacritic(c: char) -> Option<&'static str> {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => Some("a"),
        'è' | 'é' | 'ê' | 'ë' => Some("e"),
        'ì' | 'í' | 'î' | 'ï' => Some("i"),
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => Some("o"),
        'ù' | 'ú' | 'û' | 'ü' => Some("u"),
        'ý' | 'ÿ' => Some("y"),
        'ç' => Some("c"),
        'ñ' => Some("n"),
        'æ' => Some("ae"),
        'œ' => Some("oe"),
        'ß' => Some("ss"),
        'đ' | 'ð' => Some("d"),
        'þ' => Some("th"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Access Management", "access-management")]
    #[test_case("Identity & Access Management", "identity-and-access-management")]
    #[test_case("  Leading and trailing  ", "leading-and-trailing")]
    #[test_case("CAPS Lock", "caps-lock")]
    #[test_case("multi---dash___mess", "multi-dash-mess")]
    #[test_case("Café Été", "cafe-ete")]
    #[test_case("Señor Müller's Straße", "senor-muller-s-strasse")]
    #[test_case("v2.0 / API (draft)", "v2-0-api-draft")]
    #[test_case("", "untitled" ; "empty title")]
    #[test_case("!!!", "untitled" ; "punctuation only")]
    #[test_case("日本語", "untitled" ; "no foldable characters")]
    fn test_slugify(title: &str, expected: &str) {
        assert_eq!(slugify(title), expected);
    }

    #[test]
    fn test_slugify_is_deterministic() {
        let a = slugify("Identity & Access Management");
        let b = slugify("Identity & Access Management");
        assert_eq!(a, b);
    }

    #[test]
    fn test_slugify_truncates_at_separator() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("word-word"));
    }

    #[test]
    fn test_disambiguate_appends_id_fragment() {
        let id = "9f8b7c6d-1234-5678-9abc-def012345678";
        assert_eq!(disambiguate("access-management", id), "access-management-9f8b7c6d");
    }

    #[test]
    fn test_disambiguate_empty_id() {
        assert_eq!(disambiguate("slug", "---"), "slug");
    }

    #[test]
    fn test_is_safe_slug() {
        assert!(is_safe_slug("access-management"));
        assert!(is_safe_slug("a_b-c123"));
        assert!(!is_safe_slug(""));
        assert!(!is_safe_slug("../etc/passwd"));
        assert!(!is_safe_slug("a/b"));
        assert!(!is_safe_slug("a b"));
    }

    #[test]
    fn test_slug_output_is_always_safe() {
        for title in ["Access Management", "Café & Crème", "???", "a".repeat(300).as_str()] {
            assert!(is_safe_slug(&slugify(title)), "unsafe slug for {title:?}");
        }
    }
}
