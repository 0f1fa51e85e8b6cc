//! Table vocabulary for one match's footprint across the stats store.
//!
//! The six tables are declared once, each with the table it depends on. The
//! repair deletion order is derived from that declaration (leaves first), so a
//! new dependent table only needs a new entry in [`FOOTPRINT`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{IntegrityError, Result};

pub const DEFAULT_SCHEMA: &str = "pathfinder_stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    MatchHistory,
    PlayerMatchStats,
    PlayerKillStats,
    PlayerDeathStats,
    PlayerVictim,
    PlayerNemesis,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::MatchHistory => "match_history",
            Table::PlayerMatchStats => "player_match_stats",
            Table::PlayerKillStats => "player_kill_stats",
            Table::PlayerDeathStats => "player_death_stats",
            Table::PlayerVictim => "player_victim",
            Table::PlayerNemesis => "player_nemesis",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableDependency {
    pub table: Table,
    /// Table whose rows must exist before this one is written. `None` for the root.
    pub parent: Option<Table>,
}

/// Parents are declared before their dependents.
pub const FOOTPRINT: &[TableDependency] = &[
    TableDependency { table: Table::MatchHistory, parent: None },
    TableDependency { table: Table::PlayerMatchStats, parent: Some(Table::MatchHistory) },
    TableDependency { table: Table::PlayerKillStats, parent: Some(Table::PlayerMatchStats) },
    TableDependency { table: Table::PlayerDeathStats, parent: Some(Table::PlayerMatchStats) },
    TableDependency { table: Table::PlayerVictim, parent: Some(Table::PlayerMatchStats) },
    TableDependency { table: Table::PlayerNemesis, parent: Some(Table::PlayerMatchStats) },
];

fn depth(table: Table) -> usize {
    let mut depth = 0;
    let mut current = table;
    while let Some(parent) = FOOTPRINT
        .iter()
        .find(|d| d.table == current)
        .and_then(|d| d.parent)
    {
        depth += 1;
        current = parent;
        if depth > FOOTPRINT.len() {
            break;
        }
    }
    depth
}

/// Reverse dependency order: deepest tables first, and among siblings the most
/// recently declared first. Deleting in this order never leaves a dependent row
/// behind once its parent is gone.
pub fn deletion_order() -> Vec<Table> {
    let mut ordered: Vec<(usize, usize, Table)> = FOOTPRINT
        .iter()
        .enumerate()
        .map(|(idx, dep)| (depth(dep.table), idx, dep.table))
        .collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    ordered.into_iter().map(|(_, _, t)| t).collect()
}

/// Schema that qualifies every table name. An empty schema means unqualified
/// names (SQLite has no schemas).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self { name: Some(DEFAULT_SCHEMA.to_string()) }
    }
}

impl Schema {
    /// Schema names are spliced into SQL, so only plain identifiers are accepted.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Self::unqualified());
        }
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(IntegrityError::precondition(format!(
                "invalid schema name {name:?}: expected [A-Za-z_][A-Za-z0-9_]*"
            )));
        }
        Ok(Self { name: Some(name.to_string()) })
    }

    pub fn unqualified() -> Self {
        Self { name: None }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn table(&self, table: Table) -> String {
        match &self.name {
            Some(schema) => format!("{schema}.{}", table.name()),
            None => table.name().to_string(),
        }
    }
}
