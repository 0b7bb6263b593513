//! Conflict resolution for repeated writes to the same cell.
//!
//! The policy is an ordered list of [`MergeRule`]s.  The first rule whose
//! predicate holds decides the action; the cell's write count is bumped
//! afterwards whatever the outcome.  Rule order matters: a short ASCII
//! fragment that also mentions the unit marker is overwritten, not appended.

use crate::cell::Cell;

/// Later fragments shorter than this (in characters) overwrite.
pub const SHORT_ASCII_LIMIT: usize = 20;

/// Weight-unit marker.  Weight cells hold two stacked values.
pub const UNIT_MARKER: &str = "KGM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Replace the cell text with the incoming text.
    Overwrite,
    /// Add the incoming text as a new line.
    AppendLine,
}

/// One predicate/action pair of the policy.
#[derive(Debug, Clone, Copy)]
pub struct MergeRule {
    pub name: &'static str,
    pub applies: fn(&Cell, &str) -> bool,
    pub action: MergeAction,
}

/// `true` for the very first write to a cell.
pub fn is_first_write(cell: &Cell, _incoming: &str) -> bool {
    cell.write_count() == 0
}

/// `true` when the incoming text is printable ASCII only and shorter than
/// [`SHORT_ASCII_LIMIT`].
pub fn is_short_ascii(_cell: &Cell, incoming: &str) -> bool {
    incoming.chars().all(|c| (' '..='~').contains(&c))
        && incoming.chars().count() < SHORT_ASCII_LIMIT
}

/// `true` when either side carries the [`UNIT_MARKER`].
pub fn has_unit_marker(cell: &Cell, incoming: &str) -> bool {
    cell.final_text().contains(UNIT_MARKER) || incoming.contains(UNIT_MARKER)
}

fn always(_cell: &Cell, _incoming: &str) -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct MergePolicy {
    rules: Vec<MergeRule>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            rules: vec![
                MergeRule {
                    name: "first-write",
                    applies: is_first_write,
                    action: MergeAction::Overwrite,
                },
                MergeRule {
                    name: "short-ascii",
                    applies: is_short_ascii,
                    action: MergeAction::Overwrite,
                },
                MergeRule {
                    name: "unit-marker",
                    applies: has_unit_marker,
                    action: MergeAction::AppendLine,
                },
                MergeRule {
                    name: "overwrite",
                    applies: always,
                    action: MergeAction::Overwrite,
                },
            ],
        }
    }
}

impl MergePolicy {
    pub fn rules(&self) -> &[MergeRule] {
        &self.rules
    }

    /// Apply `incoming` to `cell` and return the name of the rule that
    /// fired.  The write count always increases by one.
    pub fn resolve(&self, cell: &mut Cell, incoming: &str) -> &'static str {
        let rule = self.rules.iter().find(|r| (r.applies)(cell, incoming));

        let name = match rule {
            Some(rule) => {
                match rule.action {
                    MergeAction::Overwrite => cell.set_text(incoming.to_string()),
                    MergeAction::AppendLine => cell.append_line(incoming),
                }
                rule.name
            }
            None => "none",
        };

        cell.bump();
        name
    }
}
