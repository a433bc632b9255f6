//! Virtual path codec
//!
//! Posts are addressed as `/{language}/{slug}`. The root lists languages,
//! a language directory lists its posts. Anything deeper is invalid.

use std::fmt;
use std::path::Path;

use crate::error::{PostFsError, Result};

/// Suffix shown to callers for post files. Not stored in the table.
pub const POST_EXTENSION: &str = ".md";

/// Parsed `(language, slug)` pair. Either part may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostAddress {
    pub language: String,
    pub slug: String,
}

impl PostAddress {
    /// Parse a slash-separated virtual path.
    ///
    /// Leading and trailing separators are trimmed; no other normalization
    /// happens, so segments must already be decoded.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        match segments.as_slice() {
            [language] => Ok(Self {
                language: language.to_string(),
                slug: String::new(),
            }),
            [language, slug] => Ok(Self {
                language: language.to_string(),
                slug: slug.to_string(),
            }),
            _ => Err(PostFsError::InvalidPath(path.to_string())),
        }
    }

    /// Parse a filesystem path
    pub fn parse_path(path: &Path) -> Result<Self> {
        Self::parse(&path.to_string_lossy())
    }

    pub fn is_root(&self) -> bool {
        self.language.is_empty()
    }

    pub fn has_slug(&self) -> bool {
        !self.slug.is_empty()
    }

    /// Both language and slug are present
    pub fn is_post(&self) -> bool {
        !self.language.is_empty() && !self.slug.is_empty()
    }

    /// Return the address only if it names a single post
    pub fn require_post(self, path: &Path) -> Result<Self> {
        if self.is_post() {
            Ok(self)
        } else {
            Err(PostFsError::InvalidPath(format!(
                "{:?} does not name a post",
                path
            )))
        }
    }
}

impl fmt::Display for PostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.language.is_empty(), self.slug.is_empty()) {
            (true, _) => write!(f, "/"),
            (false, true) => write!(f, "/{}", self.language),
            (false, false) => write!(f, "/{}/{}", self.language, self.slug),
        }
    }
}

/// File name shown for a post slug
pub fn display_name(slug: &str) -> String {
    format!("{}{}", slug, POST_EXTENSION)
}

/// Slug of a displayed post file name, `None` without the display suffix
pub fn strip_extension(name: &str) -> Option<&str> {
    name.strip_suffix(POST_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(language: &str, slug: &str) -> PostAddress {
        PostAddress {
            language: language.to_string(),
            slug: slug.to_string(),
        }
    }

    #[test]
    fn test_parse_depths() {
        assert_eq!(PostAddress::parse("").unwrap(), addr("", ""));
        assert_eq!(PostAddress::parse("/").unwrap(), addr("", ""));
        assert_eq!(PostAddress::parse("en").unwrap(), addr("en", ""));
        assert_eq!(PostAddress::parse("/en/").unwrap(), addr("en", ""));
        assert_eq!(PostAddress::parse("en/my-post").unwrap(), addr("en", "my-post"));
        assert_eq!(PostAddress::parse("//en/my-post//").unwrap(), addr("en", "my-post"));
    }

    #[test]
    fn test_too_deep_is_invalid() {
        for path in ["en/a/b", "/en/a/b/", "a/b/c/d"] {
            assert!(
                matches!(PostAddress::parse(path), Err(PostFsError::InvalidPath(_))),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_no_normalization() {
        assert_eq!(PostAddress::parse("EN/Post%20One").unwrap(), addr("EN", "Post%20One"));
        assert_eq!(PostAddress::parse("en/post.md").unwrap(), addr("en", "post.md"));
    }

    #[test]
    fn test_require_post() {
        let p = Path::new("/en");
        assert!(PostAddress::parse("en").unwrap().require_post(p).is_err());
        assert!(PostAddress::parse("").unwrap().require_post(p).is_err());
        assert!(PostAddress::parse("en/x").unwrap().require_post(p).is_ok());
    }

    #[test]
    fn test_display_and_extension() {
        assert_eq!(addr("en", "hello").to_string(), "/en/hello");
        assert_eq!(addr("en", "").to_string(), "/en");
        assert_eq!(addr("", "").to_string(), "/");
        assert_eq!(display_name("hello"), "hello.md");
        assert_eq!(strip_extension("hello.md"), Some("hello"));
        assert_eq!(strip_extension("hello"), None);
    }
}
