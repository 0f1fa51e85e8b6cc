//! Result of one detection run.
//!
//! A report is built once by a detector and never mutated afterwards; running
//! detection again yields a new report. It reflects the store at the moment the
//! checks ran and may be stale by the time a repair uses it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player lists longer than this are truncated in verbose output.
const VERBOSE_PLAYER_LIMIT: usize = 10;
const VERBOSE_PLAYER_PREVIEW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    NoPlayerStats,
    BadPlayerCount,
    MissingKillStats,
    MissingDeathStats,
    AllMissingVictimStats,
    AllMissingNemesisStats,
    PlayerMissingVictimStats,
    PlayerMissingNemesisStats,
}

/// Whether a category's count is reported in matches or in players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Match,
    Player,
}

impl IssueCategory {
    pub const STANDARD: [IssueCategory; 6] = [
        IssueCategory::NoPlayerStats,
        IssueCategory::BadPlayerCount,
        IssueCategory::MissingKillStats,
        IssueCategory::MissingDeathStats,
        IssueCategory::AllMissingVictimStats,
        IssueCategory::AllMissingNemesisStats,
    ];

    pub const PER_PLAYER: [IssueCategory; 2] = [
        IssueCategory::PlayerMissingVictimStats,
        IssueCategory::PlayerMissingNemesisStats,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            IssueCategory::NoPlayerStats => "no_player_stats",
            IssueCategory::BadPlayerCount => "bad_player_count",
            IssueCategory::MissingKillStats => "missing_kill_stats",
            IssueCategory::MissingDeathStats => "missing_death_stats",
            IssueCategory::AllMissingVictimStats => "all_missing_victim_stats",
            IssueCategory::AllMissingNemesisStats => "all_missing_nemesis_stats",
            IssueCategory::PlayerMissingVictimStats => "player_missing_victim_stats",
            IssueCategory::PlayerMissingNemesisStats => "player_missing_nemesis_stats",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            IssueCategory::NoPlayerStats => "Matches missing player stats",
            IssueCategory::BadPlayerCount => "Matches with zero/null/mismatched player count",
            IssueCategory::MissingKillStats => "Players missing kill stats",
            IssueCategory::MissingDeathStats => "Players missing death stats",
            IssueCategory::AllMissingVictimStats => "Players in matches with no victim stats",
            IssueCategory::AllMissingNemesisStats => "Players in matches with no nemesis stats",
            IssueCategory::PlayerMissingVictimStats => "Players missing victim stats",
            IssueCategory::PlayerMissingNemesisStats => "Players missing nemesis stats",
        }
    }

    pub const fn granularity(self) -> Granularity {
        match self {
            IssueCategory::NoPlayerStats | IssueCategory::BadPlayerCount => Granularity::Match,
            _ => Granularity::Player,
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    #[default]
    Standard,
    Thorough,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Standard => f.write_str("STANDARD"),
            DetectionMode::Thorough => f.write_str("THOROUGH"),
        }
    }
}

/// Raw output of one check for one match, before it becomes an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFinding {
    pub match_id: i64,
    pub player_ids: Vec<String>,
    /// `player_count` as stored, for the player-count check.
    pub recorded_count: Option<i64>,
    /// Distinct players actually present in `player_match_stats`.
    pub actual_count: Option<i64>,
}

impl MatchFinding {
    pub fn match_only(match_id: i64) -> Self {
        Self {
            match_id,
            player_ids: Vec::new(),
            recorded_count: None,
            actual_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub category: IssueCategory,
    pub match_id: i64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub player_ids: Vec<String>,
}

impl IntegrityIssue {
    fn from_finding(category: IssueCategory, finding: MatchFinding) -> Self {
        let id = finding.match_id;
        let n = finding.player_ids.len();
        let description = match category {
            IssueCategory::NoPlayerStats => {
                format!("Match {id} exists in match_history but has no player_match_stats records")
            }
            IssueCategory::BadPlayerCount => {
                let recorded = finding
                    .recorded_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "NULL".to_string());
                let actual = finding.actual_count.unwrap_or_default();
                format!("Match {id} has player_count={recorded} but {actual} players in player_match_stats")
            }
            IssueCategory::MissingKillStats => format!("Match {id}: {n} players missing kill stats"),
            IssueCategory::MissingDeathStats => format!("Match {id}: {n} players missing death stats"),
            IssueCategory::AllMissingVictimStats => format!(
                "Match {id}: all {n} players with kills missing victim stats (likely partial insertion)"
            ),
            IssueCategory::AllMissingNemesisStats => format!(
                "Match {id}: all {n} players with deaths missing nemesis stats (likely partial insertion)"
            ),
            IssueCategory::PlayerMissingVictimStats => {
                format!("Match {id}: {n} players with kills missing victim stats")
            }
            IssueCategory::PlayerMissingNemesisStats => {
                format!("Match {id}: {n} players with deaths missing nemesis stats")
            }
        };
        Self {
            category,
            match_id: id,
            description,
            player_ids: finding.player_ids,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryCount {
    pub matches: usize,
    pub players: usize,
}

impl CategoryCount {
    /// The headline number: matches for match-level checks, players otherwise.
    pub fn headline(&self, category: IssueCategory) -> usize {
        match category.granularity() {
            Granularity::Match => self.matches,
            Granularity::Player => self.players,
        }
    }
}

/// A check that could not run. The rest of the report is still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCheck {
    pub category: IssueCategory,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub mode: DetectionMode,
    pub generated_at: DateTime<Utc>,
    issues: Vec<IntegrityIssue>,
    counts: BTreeMap<IssueCategory, CategoryCount>,
    failed_checks: Vec<FailedCheck>,
}

impl IntegrityReport {
    pub fn issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    pub fn failed_checks(&self) -> &[FailedCheck] {
        &self.failed_checks
    }

    pub fn total_issues(&self) -> usize {
        self.issues.len()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Some checks failed, so absence of an issue is not proof of completeness.
    pub fn is_partial(&self) -> bool {
        !self.failed_checks.is_empty()
    }

    /// De-duplicated union of every flagged match.
    pub fn affected_match_ids(&self) -> BTreeSet<i64> {
        self.issues.iter().map(|i| i.match_id).collect()
    }

    pub fn by_category(&self) -> BTreeMap<IssueCategory, BTreeSet<i64>> {
        let mut out: BTreeMap<IssueCategory, BTreeSet<i64>> = BTreeMap::new();
        for issue in &self.issues {
            out.entry(issue.category).or_default().insert(issue.match_id);
        }
        out
    }

    /// Every category that fired for `match_id`.
    pub fn categories_for(&self, match_id: i64) -> BTreeSet<IssueCategory> {
        self.issues
            .iter()
            .filter(|i| i.match_id == match_id)
            .map(|i| i.category)
            .collect()
    }

    pub fn count(&self, category: IssueCategory) -> CategoryCount {
        self.counts.get(&category).copied().unwrap_or_default()
    }

    /// Per-issue audit listing for `--verbose`.
    pub fn verbose_detail(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\nDETAILED ISSUE LIST\n{}\n", "-".repeat(60), "-".repeat(60)));
        for issue in &self.issues {
            out.push_str(&format!("\n  [{}]\n    {}\n", issue.category, issue.description));
            let n = issue.player_ids.len();
            if n == 0 {
                continue;
            }
            if n <= VERBOSE_PLAYER_LIMIT {
                out.push_str(&format!("    Players: {:?}\n", issue.player_ids));
            } else {
                out.push_str(&format!(
                    "    Players: {:?} ... and {} more\n",
                    &issue.player_ids[..VERBOSE_PLAYER_PREVIEW],
                    n - VERBOSE_PLAYER_PREVIEW
                ));
            }
        }
        out
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "DATA INTEGRITY CHECK RESULTS ({} mode)", self.mode)?;
        writeln!(f, "{rule}")?;

        if !self.has_issues() && self.is_partial() {
            writeln!(
                f,
                "\nINCOMPLETE: no issues among the checks that ran, but {} of them failed.",
                self.failed_checks.len()
            )?;
        } else if !self.has_issues() {
            writeln!(f, "\nNo data integrity issues found.")?;
            writeln!(f, "  All matches have complete data in all tables.")?;
        } else {
            writeln!(
                f,
                "\nFound {} issues across {} matches:\n",
                self.total_issues(),
                self.affected_match_ids().len()
            )?;
            for (category, count) in &self.counts {
                let n = count.headline(*category);
                if n > 0 {
                    writeln!(f, "  - {}: {}", category.label(), n)?;
                }
            }
            let ids: Vec<i64> = self.affected_match_ids().into_iter().collect();
            writeln!(f, "\nAffected match IDs: {ids:?}")?;
        }

        if self.is_partial() {
            writeln!(f, "\nWARNING: {} check(s) failed; this report is partial:", self.failed_checks.len())?;
            for failed in &self.failed_checks {
                writeln!(f, "  - {}: {}", failed.category, failed.error)?;
            }
        }
        Ok(())
    }
}

/// Accumulates check results in a fixed category order.
#[derive(Debug)]
pub struct ReportBuilder {
    mode: DetectionMode,
    issues: Vec<IntegrityIssue>,
    counts: BTreeMap<IssueCategory, CategoryCount>,
    failed_checks: Vec<FailedCheck>,
}

impl ReportBuilder {
    pub fn new(mode: DetectionMode) -> Self {
        Self {
            mode,
            issues: Vec::new(),
            counts: BTreeMap::new(),
            failed_checks: Vec::new(),
        }
    }

    pub fn record(&mut self, category: IssueCategory, findings: Vec<MatchFinding>) {
        let count = CategoryCount {
            matches: findings.len(),
            players: findings.iter().map(|f| f.player_ids.len()).sum(),
        };
        self.counts.insert(category, count);
        self.issues
            .extend(findings.into_iter().map(|f| IntegrityIssue::from_finding(category, f)));
    }

    pub fn record_failure(&mut self, category: IssueCategory, error: impl fmt::Display) {
        self.failed_checks.push(FailedCheck {
            category,
            error: error.to_string(),
        });
    }

    pub fn finish(mut self) -> IntegrityReport {
        self.issues.sort_by(|a, b| a.category.cmp(&b.category).then(a.match_id.cmp(&b.match_id)));
        self.failed_checks.sort_by_key(|f| f.category);
        IntegrityReport {
            mode: self.mode,
            generated_at: Utc::now(),
            issues: self.issues,
            counts: self.counts,
            failed_checks: self.failed_checks,
        }
    }
}
