//! Reconcile a source-of-truth catalog with its migrated copy.
//!
//! Obsolete entries are ignored on both sides: Zanata keeps them in
//! its exports while Weblate deletes them, so they carry no
//! information about the migration.

use crate::catalog::{Catalog, CatalogEntry};
use log::{error, info};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

/// Number of discrepancies of each kind shown in logs and error lists.
pub const SAMPLE_LIMIT: usize = 5;

/// Maximum number of characters of a msgid shown in samples.
const SAMPLE_WIDTH: usize = 50;

/// The result of checking one translation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComparisonOutcome {
    pub total_count: usize,
    pub translated_count: usize,
    pub success: bool,
    pub errors: Vec<String>,
}

impl ComparisonOutcome {
    pub fn failure(total_count: usize, translated_count: usize, error: String) -> Self {
        Self {
            total_count,
            translated_count,
            success: false,
            errors: vec![error],
        }
    }
}

/// Message counts of both catalogs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountReport {
    pub source_total: usize,
    pub target_total: usize,
    pub source_translated: usize,
    pub target_translated: usize,
    pub errors: Vec<String>,
}

impl CountReport {
    pub fn counts_match(&self) -> bool {
        self.source_total == self.target_total
    }

    pub fn translated_match(&self) -> bool {
        self.source_translated == self.target_translated
    }

    pub fn success(&self) -> bool {
        self.counts_match() && self.translated_match()
    }

    pub fn into_outcome(self) -> ComparisonOutcome {
        ComparisonOutcome {
            total_count: self.source_total,
            translated_count: self.source_translated,
            success: self.success(),
            errors: self.errors,
        }
    }
}

/// Compare the number of active and translated messages.
pub fn count_check(source: &Catalog, target: &Catalog) -> CountReport {
    let (source_total, source_translated) = counts(source);
    let (target_total, target_translated) = counts(target);

    let mut errors = Vec::new();
    if source_total != target_total {
        errors.push(format!(
            "total sentence count mismatch: {source_total} != {target_total}"
        ));
    }
    if source_translated != target_translated {
        errors.push(format!(
            "translated count mismatch: {source_translated} != {target_translated}"
        ));
    }

    CountReport {
        source_total,
        target_total,
        source_translated,
        target_translated,
        errors,
    }
}

fn counts(catalog: &Catalog) -> (usize, usize) {
    catalog.active().fold((0, 0), |(total, translated), entry| {
        (total + 1, translated + usize::from(entry.is_translated()))
    })
}

/// A message whose translation differs between the catalogs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub msgid: String,
    pub source_msgstr: String,
    pub target_msgstr: String,
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "translation mismatch for msgid '{}': '{}' != '{}'",
            abbreviate(&self.msgid),
            self.source_msgstr,
            self.target_msgstr
        )
    }
}

/// Message-by-message differences between the catalogs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetailReport {
    pub total_count: usize,
    pub translated_count: usize,
    /// Source msgids absent from the migrated catalog.
    pub missing: Vec<String>,
    pub mismatched: Vec<Mismatch>,
    /// Migrated msgids absent from the source catalog.
    pub extra: Vec<String>,
}

impl DetailReport {
    pub fn success(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty() && self.extra.is_empty()
    }

    /// One line per kind of discrepancy followed by a few samples.
    pub fn summary_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.missing.is_empty() {
            errors.push(format!("missing in migrated catalog: {}", self.missing.len()));
            errors.extend(
                self.missing
                    .iter()
                    .take(SAMPLE_LIMIT)
                    .map(|msgid| format!("missing msgid '{}'", abbreviate(msgid))),
            );
        }
        if !self.mismatched.is_empty() {
            errors.push(format!("translation mismatches: {}", self.mismatched.len()));
            errors.extend(
                self.mismatched
                    .iter()
                    .take(SAMPLE_LIMIT)
                    .map(Mismatch::to_string),
            );
        }
        if !self.extra.is_empty() {
            errors.push(format!("extra in migrated catalog: {}", self.extra.len()));
            errors.extend(
                self.extra
                    .iter()
                    .take(SAMPLE_LIMIT)
                    .map(|msgid| format!("extra msgid '{}'", abbreviate(msgid))),
            );
        }
        errors
    }

    /// Write the findings to the log.
    pub fn log(&self) {
        if self.success() {
            info!("✓ Sentence detail matched: {} entries", self.total_count);
            return;
        }
        error!("Sentence detail check completed with issues:");
        for line in self.summary_errors() {
            error!("  - {line}");
        }
    }

    pub fn into_outcome(self) -> ComparisonOutcome {
        ComparisonOutcome {
            total_count: self.total_count,
            translated_count: self.translated_count,
            success: self.success(),
            errors: self.summary_errors(),
        }
    }
}

/// Compare the catalogs message by message.
///
/// Messages are matched by msgid and translations are compared
/// verbatim. If the migrated catalog repeats a msgid, the last
/// occurrence is used.
pub fn detail_check(source: &Catalog, target: &Catalog) -> DetailReport {
    let target_by_msgid = target
        .active()
        .map(|entry| (entry.msgid.as_str(), entry))
        .collect::<HashMap<&str, &CatalogEntry>>();

    let mut report = DetailReport::default();
    let mut source_msgids = HashSet::new();
    for entry in source.active() {
        report.total_count += 1;
        if entry.is_translated() {
            report.translated_count += 1;
        }
        source_msgids.insert(entry.msgid.as_str());

        match target_by_msgid.get(entry.msgid.as_str()) {
            None => report.missing.push(entry.msgid.clone()),
            Some(migrated) if migrated.msgstr != entry.msgstr => {
                report.mismatched.push(Mismatch {
                    msgid: entry.msgid.clone(),
                    source_msgstr: entry.msgstr.clone(),
                    target_msgstr: migrated.msgstr.clone(),
                });
            }
            Some(_) => {}
        }
    }

    let mut seen = HashSet::new();
    report.extra = target
        .active()
        .map(|entry| entry.msgid.as_str())
        .filter(|msgid| !source_msgids.contains(msgid) && seen.insert(*msgid))
        .map(String::from)
        .collect();

    report
}

fn abbreviate(msgid: &str) -> String {
    msgid.chars().take(SAMPLE_WIDTH).collect()
}
