//! Top-level configuration document for the intake engine.
//!
//! One TOML file declares the stored tables, the scripts that feed them,
//! and the side-channel grace period:
//!
//! ```toml
//! [tables.members]
//! id = "incr_integer"
//! name = "string"
//!
//! [scripts.registration]
//! beginning = "Welcome!"
//! ending = "All done."
//! table = "members"
//!
//! [[scripts.registration.questions]]
//! name = "name"
//! display_name = "Name"
//! query = "What is your name?"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::schema::{ColumnType, TableSchema};
use crate::script::ScriptConfig;

/// Ordered `column = "type"` pairs for one `[tables.*]` entry.
///
/// Declaration order becomes the physical column order, so this reads the
/// TOML table through a map visitor instead of collecting into a `HashMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpecs(pub Vec<(String, String)>);

impl<'de> Deserialize<'de> for ColumnSpecs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = ColumnSpecs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column names to column type names")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, type_name)) = access.next_entry::<String, String>()? {
                    entries.push((name, type_name));
                }
                Ok(ColumnSpecs(entries))
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

impl Serialize for ColumnSpecs {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, type_name) in &self.0 {
            map.serialize_entry(name, type_name)?;
        }
        map.end()
    }
}

/// Top-level configuration for the intake engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Seconds a conversation's side channel stays around after the
    /// conversation ends.
    #[serde(default = "default_side_channel_grace_secs")]
    pub side_channel_grace_secs: u64,

    /// Stored tables: table name -> ordered column specs. Tables listed
    /// here are mirrored; tables registered in code are not.
    #[serde(default)]
    pub tables: BTreeMap<String, ColumnSpecs>,

    /// Conversation scripts: script kind -> definition.
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptConfig>,
}

fn default_side_channel_grace_secs() -> u64 {
    60
}

impl IntakeConfig {
    /// Grace period before a finished conversation's side channel is
    /// deleted.
    pub fn side_channel_grace(&self) -> Duration {
        Duration::from_secs(self.side_channel_grace_secs)
    }

    /// Build validated schemas from the `[tables]` section.
    ///
    /// Column declaration order is preserved per table. Any unknown type
    /// name or malformed identifier fails the whole load.
    pub fn table_schemas(&self) -> Result<Vec<TableSchema>, ConfigError> {
        self.tables
            .iter()
            .map(|(name, specs)| {
                let columns = specs
                    .0
                    .iter()
                    .map(|(column, type_name)| Ok((column.clone(), ColumnType::parse(type_name)?)))
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                TableSchema::new(name, columns)
            })
            .collect()
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            side_channel_grace_secs: default_side_channel_grace_secs(),
            tables: BTreeMap::new(),
            scripts: BTreeMap::new(),
        }
    }
}
