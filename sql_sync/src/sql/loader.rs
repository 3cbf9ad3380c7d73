//! SQL source loader
//!
//! Reads object and hook files from the base path into [`SqlCode`] units.

use futures::future::try_join_all;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sql::types::{ObjectType, SourceTree, SqlCode};
use crate::utils::naming::{is_drop_only, resolve_object_info, SQL_EXTENSION};

/// Read a single file relative to `base_path`
pub async fn resolve_file(base_path: &Path, filename: &str) -> Result<SqlCode> {
    let path = base_path.join(filename);
    let sql = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| Error::FileReadError { path, source })?;

    Ok(SqlCode {
        name: filename.to_string(),
        sql,
        drop_only: is_drop_only(filename),
        info: None,
    })
}

/// Read several files concurrently, keeping their order
pub async fn resolve_files(base_path: &Path, filenames: &[String]) -> Result<Vec<SqlCode>> {
    try_join_all(filenames.iter().map(|f| resolve_file(base_path, f))).await
}

/// Read object files, classifying every path before any file is read
pub async fn resolve_object_files(base_path: &Path, filenames: &[String]) -> Result<Vec<SqlCode>> {
    let infos = filenames
        .iter()
        .map(|f| resolve_object_info(f))
        .collect::<Result<Vec<_>>>()?;

    let codes = resolve_files(base_path, filenames).await?;

    Ok(codes
        .into_iter()
        .zip(infos)
        .map(|(code, info)| SqlCode {
            info: Some(info),
            ..code
        })
        .collect())
}

/// List object files under `base_path` in creation order.
///
/// Files are grouped by object type (schemas first, triggers last) and sorted
/// by path within a group. Directories that are not object types are skipped.
pub fn discover_sql_files(base_path: &Path) -> Result<Vec<String>> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for object_type in ObjectType::ALL {
        let dir = base_path.join(object_type.as_str());
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry.map_err(|e| Error::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(base_path)
                .map_err(|e| Error::Unknown(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");

            if relative.ends_with(SQL_EXTENSION) {
                found.push((object_type.precedence(), relative));
            }
        }
    }

    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Load the configured object files, discovering them when none are listed
pub async fn load_objects(config: &Config) -> Result<Vec<SqlCode>> {
    let base_path = config.base_path.as_path();

    let sql_files = if config.sql.is_empty() {
        discover_sql_files(base_path)?
    } else {
        config.sql.clone()
    };

    resolve_object_files(base_path, &sql_files).await
}

/// Build the source tree of one sync cycle
pub async fn load_source_tree(config: &Config) -> Result<SourceTree> {
    let base_path = config.base_path.as_path();

    let (pre_sync, objects, post_sync) = futures::try_join!(
        resolve_files(base_path, &config.hooks.pre_sync),
        load_objects(config),
        resolve_files(base_path, &config.hooks.post_sync),
    )?;

    tracing::debug!(
        objects = objects.len(),
        pre_sync = pre_sync.len(),
        post_sync = post_sync.len(),
        "Loaded SQL source tree"
    );

    Ok(SourceTree {
        pre_sync,
        objects,
        post_sync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(base: &Path, relative: &str, content: &str) {
        let path = base.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_resolve_file_detects_drop_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "view/old_report.drop.sql", "CREATE VIEW old_report AS SELECT 1;");

        let code = resolve_file(dir.path(), "view/old_report.drop.sql").await.unwrap();

        assert!(code.drop_only);
        assert_eq!(code.sql, "CREATE VIEW old_report AS SELECT 1;");
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();

        let err = resolve_file(dir.path(), "view/missing.sql").await.unwrap_err();

        assert!(matches!(err, Error::FileReadError { .. }));
    }

    #[tokio::test]
    async fn test_resolve_object_files_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "schema/app.sql", "CREATE SCHEMA app;");
        write(dir.path(), "view/app/users.sql", "CREATE VIEW app.users AS SELECT 1;");

        let files = vec!["view/app/users.sql".to_string(), "schema/app.sql".to_string()];
        let codes = resolve_object_files(dir.path(), &files).await.unwrap();

        let fqons: Vec<_> = codes
            .iter()
            .map(|c| c.info.as_ref().unwrap().fqon.clone())
            .collect();
        assert_eq!(fqons, vec!["app.users", "app"]);
    }

    #[tokio::test]
    async fn test_classification_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();

        // Neither file exists; the unsupported type must be reported first
        let files = vec!["view/missing.sql".to_string(), "table/users.sql".to_string()];
        let err = resolve_object_files(dir.path(), &files).await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedObject { .. }));
    }

    #[test]
    fn test_discover_sql_files_orders_by_type() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "view/app/users.sql", "");
        write(dir.path(), "schema/app.sql", "");
        write(dir.path(), "function/app/slugify.sql", "");
        write(dir.path(), "view/app/accounts.sql", "");
        write(dir.path(), "hooks/pre.sql", "");
        write(dir.path(), "view/app/README.md", "");

        let files = discover_sql_files(dir.path()).unwrap();

        assert_eq!(
            files,
            vec![
                "schema/app.sql",
                "function/app/slugify.sql",
                "view/app/accounts.sql",
                "view/app/users.sql",
            ]
        );
    }
}
