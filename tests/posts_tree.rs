//! Listing and path handling of the virtual post tree

mod common;

use std::path::Path;

use common::Fixture;
use post_editor_fs::connector::{Connector, DirEntry, FileType};
use post_editor_fs::{PostFsError, Result};

#[tokio::test]
async fn test_empty_table_lists_nothing() -> Result<()> {
    let fx = Fixture::new()?;
    assert!(fx.connector.list(Path::new("/")).await?.is_empty());
    assert!(fx.connector.list(Path::new("/en")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_root_lists_distinct_languages() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "a", Some("2024-01-01")).await?;
    fx.insert_raw("en", "b", Some("2024-01-02")).await?;
    fx.insert_raw("fr", "a", Some("2024-01-03")).await?;

    let entries = fx.connector.list(Path::new("/")).await?;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.file_type == FileType::Directory));
    assert!(entries.iter().all(|e| e.size.is_none() && e.mtime.is_none()));
    assert_eq!(fx.names("/").await?, vec!["en", "fr"]);
    Ok(())
}

#[tokio::test]
async fn test_language_lists_posts_with_extension() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "hello", Some("2024-01-01")).await?;
    fx.insert_raw("en", "world", Some("2024-01-02 10:30:00")).await?;
    fx.insert_raw("de", "hallo", Some("2024-01-01")).await?;

    let mut entries = fx.connector.list(Path::new("/en")).await?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "hello.md");
    assert_eq!(entries[0].file_type, FileType::File);
    assert_eq!(entries[0].size, None);
    assert_eq!(entries[0].modified_unix(), 1_704_067_200);
    // the time of day is dropped
    assert_eq!(entries[1].name, "world.md");
    assert_eq!(entries[1].modified_unix(), 1_704_153_600);
    Ok(())
}

#[tokio::test]
async fn test_unparsable_dates_list_at_epoch() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "garbage", Some("yesterday")).await?;
    fx.insert_raw("en", "null", None).await?;
    fx.insert_raw("en", "short", Some("2024-1-1")).await?;

    let entries = fx.connector.list(Path::new("/en")).await?;
    assert_eq!(entries.len(), 3);
    for entry in entries {
        assert_eq!(entry.modified_unix(), 0, "{} should degrade", entry.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_listing_a_post_fails() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "hello", Some("2024-01-01")).await?;

    let err = fx.connector.list(Path::new("/en/hello")).await.unwrap_err();
    assert!(matches!(err, PostFsError::NotADirectory(_)));
    Ok(())
}

#[tokio::test]
async fn test_over_depth_paths_are_invalid() -> Result<()> {
    let fx = Fixture::new()?;
    let deep = Path::new("/en/hello/extra");

    assert!(matches!(
        fx.connector.list(deep).await,
        Err(PostFsError::InvalidPath(_))
    ));
    assert!(matches!(
        fx.connector.read(deep).await,
        Err(PostFsError::InvalidPath(_))
    ));
    assert!(matches!(
        fx.connector.create_file(deep).await,
        Err(PostFsError::InvalidPath(_))
    ));
    assert!(matches!(
        fx.connector.remove_file(deep).await,
        Err(PostFsError::InvalidPath(_))
    ));
    assert!(matches!(
        fx.connector.write(deep, &common::document("t", "d", "c")).await,
        Err(PostFsError::InvalidPath(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_operations_need_a_slug() -> Result<()> {
    let fx = Fixture::new()?;
    for path in ["/", "/en"] {
        let path = Path::new(path);
        assert!(matches!(
            fx.connector.read(path).await,
            Err(PostFsError::InvalidPath(_))
        ));
        assert!(matches!(
            fx.connector.create_file(path).await,
            Err(PostFsError::InvalidPath(_))
        ));
        assert!(matches!(
            fx.connector.remove_file(path).await,
            Err(PostFsError::InvalidPath(_))
        ));
    }
    Ok(())
}

#[tokio::test]
async fn test_directories_and_moves_are_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "hello", Some("2024-01-01")).await?;

    for path in ["", "/", "/en", "/new-lang", "/en/hello"] {
        assert!(matches!(
            fx.connector.create_dir(Path::new(path)).await,
            Err(PostFsError::NotAllowed(_))
        ));
    }
    assert!(matches!(
        fx.connector
            .rename(Path::new("/en/hello"), Path::new("/en/bye"))
            .await,
        Err(PostFsError::NotAllowed(_))
    ));
    assert!(matches!(
        fx.connector.rename(Path::new(""), Path::new("")).await,
        Err(PostFsError::NotAllowed(_))
    ));

    assert_eq!(fx.names("/").await?, vec!["en"]);
    assert_eq!(fx.names("/en").await?, vec!["hello.md"]);
    Ok(())
}

#[tokio::test]
async fn test_metadata_flags() -> Result<()> {
    let fx = Fixture::new()?;

    let root = fx.connector.metadata(Path::new("/"));
    assert!(root.can_create_file);
    assert!(!root.can_rename);

    let lang = fx.connector.metadata(Path::new("/en"));
    assert!(lang.can_create_file);
    assert!(!lang.can_rename);

    let post = fx.connector.metadata(Path::new("/en/hello"));
    assert!(!post.can_create_file);
    assert!(post.can_rename);

    for caps in [root, lang, post] {
        assert!(!caps.can_create_directory);
        assert!(!caps.can_move);
        assert!(caps.refresh_on_create);
        assert!(caps.hide_extension);
    }

    // never fails, even on a path the codec rejects
    let deep = fx.connector.metadata(Path::new("/a/b/c/d"));
    assert!(deep.hide_extension);
    Ok(())
}

#[tokio::test]
async fn test_stat_follows_the_table() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert_raw("en", "hello", Some("2024-01-01")).await?;

    assert!(fx.connector.stat(Path::new("/")).await?.is_dir());
    assert!(fx.connector.stat(Path::new("/en")).await?.is_dir());
    assert!(fx.connector.stat(Path::new("/en/hello")).await?.is_file());
    assert!(!fx.connector.exists(Path::new("/fr")).await?);
    assert!(!fx.connector.exists(Path::new("/en/missing")).await?);
    assert!(matches!(
        fx.connector.stat(Path::new("/fr/hello")).await,
        Err(PostFsError::NotFound(_))
    ));

    let listed: Vec<DirEntry> = fx.connector.list(Path::new("/en")).await?;
    let meta = fx.connector.stat(Path::new("/en/hello")).await?;
    assert_eq!(listed[0].mtime, Some(meta.mtime));
    Ok(())
}
