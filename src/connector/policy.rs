//! Per-path capability policy

use serde::Serialize;

use crate::path::PostAddress;

/// What a caller may do at a given path.
///
/// Languages only exist through the posts that use them, so directories are
/// never created, and posts never move between addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathCapabilities {
    pub can_create_file: bool,
    pub can_create_directory: bool,
    pub can_rename: bool,
    pub can_move: bool,
    /// The caller should list again after creating a post
    pub refresh_on_create: bool,
    /// The `.md` suffix is cosmetic
    pub hide_extension: bool,
}

impl PathCapabilities {
    pub fn for_address(address: &PostAddress) -> Self {
        Self {
            can_create_file: !address.has_slug(),
            can_create_directory: false,
            can_rename: address.has_slug(),
            can_move: false,
            refresh_on_create: true,
            hide_extension: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(path: &str) -> PathCapabilities {
        PathCapabilities::for_address(&PostAddress::parse(path).unwrap())
    }

    #[test]
    fn test_language_directory() {
        let c = caps("en");
        assert!(c.can_create_file);
        assert!(!c.can_rename);
    }

    #[test]
    fn test_post_file() {
        let c = caps("en/post");
        assert!(!c.can_create_file);
        assert!(c.can_rename);
    }

    #[test]
    fn test_constant_flags() {
        for path in ["", "en", "en/post"] {
            let c = caps(path);
            assert!(!c.can_create_directory);
            assert!(!c.can_move);
            assert!(c.refresh_on_create);
            assert!(c.hide_extension);
        }
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(caps("en")).unwrap();
        assert_eq!(json["canCreateFile"], true);
        assert_eq!(json["hideExtension"], true);
    }
}
