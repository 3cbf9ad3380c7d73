//! Naming utilities for sql_sync
//!
//! Source files follow a `<object type>/[<schema>/]<name>.sql` convention. This
//! module turns such a relative path into a typed object descriptor.

use std::path::Path;

use crate::error::{Error, Result};
use crate::sql::types::{ObjectType, SqlFileInfo};

/// Extension of every SQL source file
pub const SQL_EXTENSION: &str = ".sql";

/// Marker placed before the extension of objects that are only ever dropped
pub const DROP_ONLY_MARKER: &str = ".drop";

/// Resolve a path relative to the base path into an object descriptor.
///
/// `view/reporting/daily_totals.sql` becomes a view named `daily_totals` in
/// schema `reporting` with fully qualified name `reporting.daily_totals`.
pub fn resolve_object_info(relative_path: &str) -> Result<SqlFileInfo> {
    if is_absolute(relative_path) {
        return Err(Error::invalid_path(
            relative_path,
            "expected a path relative to the base path",
        ));
    }

    let segments = split_segments(relative_path);

    if segments.iter().any(|s| *s == "..") {
        return Err(Error::invalid_path(
            relative_path,
            "parent directory segments are not allowed",
        ));
    }

    let type_segment = segments.first().copied().unwrap_or_default();
    let object_type: ObjectType = type_segment
        .parse()
        .map_err(|_| Error::unsupported_object(relative_path, type_segment))?;

    let (schema, file) = match segments.as_slice() {
        [_, file] => (None, *file),
        [_, schema, file] => (Some(*schema), *file),
        [_] => {
            return Err(Error::invalid_path(relative_path, "missing file name"));
        }
        _ => {
            return Err(Error::invalid_path(
                relative_path,
                "expected <type>/[<schema>/]<name>.sql",
            ));
        }
    };

    let name = object_name(file);
    if name.is_empty() {
        return Err(Error::invalid_path(relative_path, "empty object name"));
    }

    // Schemas are never qualified by another schema
    let schema = match object_type {
        ObjectType::Schema => None,
        _ => schema.map(str::to_string),
    };

    let fqon = match &schema {
        Some(schema) => format!("{}.{}", schema, name),
        None => name.clone(),
    };

    Ok(SqlFileInfo {
        name,
        fqon,
        object_type,
        schema,
    })
}

/// Whether a source file is marked drop-only (`<name>.drop.sql`)
pub fn is_drop_only(filename: &str) -> bool {
    strip_extension(file_segment(filename)).ends_with(DROP_ONLY_MARKER)
}

/// Object name from a file name, without extension or drop-only marker
pub fn object_name(filename: &str) -> String {
    let stem = strip_extension(file_segment(filename));
    stem.strip_suffix(DROP_ONLY_MARKER)
        .unwrap_or(stem)
        .to_string()
}

fn strip_extension(file: &str) -> &str {
    file.strip_suffix(SQL_EXTENSION).unwrap_or(file)
}

fn file_segment(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute()
}
