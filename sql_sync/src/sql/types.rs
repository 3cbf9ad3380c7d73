//! Type definitions for synchronized SQL objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kinds of database objects managed by a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Schema,
    View,
    Function,
    Procedure,
    Trigger,
}

impl ObjectType {
    /// All supported object types, in the order discovered files are created
    pub const ALL: [ObjectType; 5] = [
        ObjectType::Schema,
        ObjectType::Function,
        ObjectType::View,
        ObjectType::Procedure,
        ObjectType::Trigger,
    ];

    /// Directory / path segment naming this object type
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Schema => "schema",
            ObjectType::View => "view",
            ObjectType::Function => "function",
            ObjectType::Procedure => "procedure",
            ObjectType::Trigger => "trigger",
        }
    }

    /// Keyword used in `DROP <keyword> IF EXISTS`
    pub fn drop_keyword(&self) -> &'static str {
        match self {
            ObjectType::Schema => "SCHEMA",
            ObjectType::View => "VIEW",
            ObjectType::Function => "FUNCTION",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Trigger => "TRIGGER",
        }
    }

    /// Position in `ALL`; lower values are created first
    pub fn precedence(&self) -> usize {
        Self::ALL
            .iter()
            .position(|t| t == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::unsupported_object(s, s))
    }
}

/// Descriptor of a SQL object derived from its source path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlFileInfo {
    pub name: String,
    /// `schema.name`, or `name` for unqualified and schema objects
    pub fqon: String,
    pub object_type: ObjectType,
    pub schema: Option<String>,
}

/// A loaded source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCode {
    /// Path of the file relative to the base path
    pub name: String,
    pub sql: String,
    /// Tracked for teardown but never executed during setup
    pub drop_only: bool,
    /// Present for object files, absent for hook scripts
    pub info: Option<SqlFileInfo>,
}

/// Everything a sync cycle executes, built fresh for each cycle
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub pre_sync: Vec<SqlCode>,
    pub objects: Vec<SqlCode>,
    pub post_sync: Vec<SqlCode>,
}

impl SourceTree {
    /// Descriptors of every managed object, in creation order
    pub fn object_infos(&self) -> Vec<SqlFileInfo> {
        self.objects
            .iter()
            .filter_map(|code| code.info.clone())
            .collect()
    }

    /// Scripts executed during setup, in execution order
    pub fn setup_sequence(&self) -> impl Iterator<Item = &SqlCode> {
        self.pre_sync
            .iter()
            .chain(self.objects.iter())
            .chain(self.post_sync.iter())
    }
}
