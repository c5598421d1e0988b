// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Aggregate store of check results.
//!
//! Results are kept in a tree of projects, categories (versions),
//! components and locales, and persisted as JSON so that many
//! independent runs can build up a single report:
//!
//! ```json
//! {
//!   "projects": {
//!     "horizon": {
//!       "master": {
//!         "metadata": {
//!           "total_components": 1,
//!           "total_locales": 2,
//!           "locales": ["en_US", "ko_KR"]
//!         },
//!         "last_updated": "2025-01-01 12:00:00",
//!         "horizon-django": {
//!           "total_count": 100,
//!           "locales": {
//!             "ko_KR": {
//!               "total_count": 100,
//!               "translated_count": 90,
//!               "success": false,
//!               "errors": ["translated count mismatch: 90 != 89"],
//!               "last_updated": "2025-01-01 12:00:00"
//!             }
//!           }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::compare::ComparisonOutcome;
use crate::Coordinate;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Could not read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Could not write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Malformed result JSON in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Could not serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0:?} is reserved and cannot name a component")]
    ReservedComponent(String),
}

pub type Result<T> = std::result::Result<T, ResultError>;

/// Outcome of the most recent check of one locale.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleResult {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub translated_count: usize,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub total_count: usize,
    #[serde(default)]
    pub locales: BTreeMap<String, LocaleResult>,
}

/// Values derived from the components of a category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMetadata {
    pub total_components: usize,
    pub total_locales: usize,
    pub locales: Vec<String>,
}

/// Keys of a category which are not components.
const RESERVED_KEYS: [&str; 2] = ["metadata", "last_updated"];

/// A version or branch of a project, such as `master` or `stable/2025.1`.
///
/// Components are stored next to the `metadata` and `last_updated`
/// keys in the JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub metadata: CategoryMetadata,
    #[serde(default)]
    pub last_updated: String,
    #[serde(flatten)]
    pub components: BTreeMap<String, Component>,
}

impl Category {
    fn new() -> Self {
        Self {
            metadata: CategoryMetadata::default(),
            last_updated: timestamp(),
            components: BTreeMap::new(),
        }
    }

    /// Recompute the metadata from the components.
    fn refresh_metadata(&mut self) {
        let locales = self
            .components
            .values()
            .flat_map(|component| component.locales.keys().cloned())
            .collect::<BTreeSet<_>>();
        self.metadata = CategoryMetadata {
            total_components: self.components.len(),
            total_locales: locales.len(),
            locales: locales.into_iter().collect(),
        };
        self.last_updated = timestamp();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Project {
    pub categories: BTreeMap<String, Category>,
}

/// Counts over the whole store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub projects: usize,
    pub tests: usize,
    pub successes: usize,
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} projects, {} tests, {} successful",
            self.projects, self.tests, self.successes
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultStore {
    pub projects: BTreeMap<String, Project>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`, or start empty if there is no such file.
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self::new();
        store.restore(path)?;
        Ok(store)
    }

    /// Replace the whole tree with the contents of the JSON file at `path`.
    ///
    /// The in-memory tree is left untouched if the file cannot be read
    /// or parsed.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|source| ResultError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        *self = serde_json::from_str(&content).map_err(|source| ResultError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Test results loaded from: {}", path.display());
        Ok(())
    }

    /// Record the outcome of checking `coordinate`.
    ///
    /// Missing projects, categories and components are created. An
    /// existing result for the same locale is replaced, and the
    /// component total is overwritten by the new value. Components
    /// cannot be named after the keys a category stores next to them.
    pub fn upsert(&mut self, coordinate: &Coordinate, outcome: ComparisonOutcome) -> Result<()> {
        if RESERVED_KEYS.contains(&coordinate.component) {
            return Err(ResultError::ReservedComponent(
                coordinate.component.to_string(),
            ));
        }
        let category = self
            .projects
            .entry(coordinate.project.to_string())
            .or_default()
            .categories
            .entry(coordinate.category.to_string())
            .or_insert_with(Category::new);
        let component = category
            .components
            .entry(coordinate.component.to_string())
            .or_default();

        if component.locales.contains_key(coordinate.locale) {
            info!("Overwriting result for {coordinate}");
        }

        component.total_count = outcome.total_count;
        component.locales.insert(
            coordinate.locale.to_string(),
            LocaleResult {
                total_count: outcome.total_count,
                translated_count: outcome.translated_count,
                success: outcome.success,
                errors: outcome.errors,
                last_updated: timestamp(),
            },
        );
        category.refresh_metadata();
        Ok(())
    }

    /// Recompute the metadata of one category. Unknown categories are ignored.
    pub fn recompute_category_metadata(&mut self, project: &str, category: &str) {
        if let Some(category) = self
            .projects
            .get_mut(project)
            .and_then(|project| project.categories.get_mut(category))
        {
            category.refresh_metadata();
        }
    }

    /// Write the store to `path` as pretty-printed JSON.
    ///
    /// The metadata of every category is recomputed first. The file is
    /// written next to `path` and renamed into place, so an existing
    /// report survives a failed write.
    pub fn persist(&mut self, path: &Path) -> Result<()> {
        for project in self.projects.values_mut() {
            for category in project.categories.values_mut() {
                category.refresh_metadata();
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let write_error = |source: io::Error| ResultError::Write {
            path: path.to_path_buf(),
            source,
        };
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(directory).map_err(write_error)?;

        let mut file = tempfile::NamedTempFile::new_in(directory).map_err(write_error)?;
        file.write_all(json.as_bytes()).map_err(write_error)?;
        file.as_file().sync_all().map_err(write_error)?;
        file.persist(path).map_err(|err| write_error(err.error))?;

        info!("Test results saved to: {}", path.display());
        Ok(())
    }

    pub fn component(&self, project: &str, category: &str, component: &str) -> Option<&Component> {
        self.projects
            .get(project)?
            .categories
            .get(category)?
            .components
            .get(component)
    }

    /// Locale codes recorded for a component, in sorted order.
    pub fn locales_of(&self, project: &str, category: &str, component: &str) -> Vec<String> {
        self.component(project, category, component)
            .map(|component| component.locales.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Percentage of the locales of a component whose last check succeeded.
    ///
    /// A component without results has a success rate of zero.
    pub fn success_rate(&self, project: &str, category: &str, component: &str) -> f64 {
        let Some(component) = self.component(project, category, component) else {
            return 0.0;
        };
        if component.locales.is_empty() {
            return 0.0;
        }
        let successes = component
            .locales
            .values()
            .filter(|result| result.success)
            .count();
        100.0 * successes as f64 / component.locales.len() as f64
    }

    pub fn summary(&self) -> Summary {
        let results = self
            .projects
            .values()
            .flat_map(|project| project.categories.values())
            .flat_map(|category| category.components.values())
            .flat_map(|component| component.locales.values());
        let (tests, successes) = results.fold((0, 0), |(tests, successes), result| {
            (tests + 1, successes + usize::from(result.success))
        });
        Summary {
            projects: self.projects.len(),
            tests,
            successes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HORIZON: Coordinate = Coordinate {
        project: "horizon",
        category: "master",
        component: "horizon-django",
        locale: "en_US",
    };

    fn outcome(total_count: usize, translated_count: usize, errors: &[&str]) -> ComparisonOutcome {
        ComparisonOutcome {
            total_count,
            translated_count,
            success: errors.is_empty(),
            errors: errors.iter().map(|error| error.to_string()).collect(),
        }
    }

    fn metadata(store: &ResultStore, project: &str, category: &str) -> CategoryMetadata {
        store.projects[project].categories[category].metadata.clone()
    }

    #[test]
    fn test_success_rate_and_locales() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(10, 10, &[])).unwrap();
        store
            .upsert(
                &Coordinate {
                    locale: "ko_KR",
                    ..HORIZON
                },
                outcome(10, 8, &["x"]),
            )
            .unwrap();

        assert_eq!(
            store.success_rate("horizon", "master", "horizon-django"),
            50.0
        );
        assert_eq!(
            store.locales_of("horizon", "master", "horizon-django"),
            vec!["en_US", "ko_KR"]
        );
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(10, 10, &[])).unwrap();
        let first = metadata(&store, "horizon", "master");
        store.upsert(&HORIZON, outcome(10, 10, &[])).unwrap();
        assert_eq!(metadata(&store, "horizon", "master"), first);
        assert_eq!(store.summary().tests, 1);
    }

    #[test]
    fn test_upsert_overwrites_locale() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(10, 7, &["first", "second"])).unwrap();
        store.upsert(&HORIZON, outcome(12, 12, &[])).unwrap();

        let component = store
            .component("horizon", "master", "horizon-django")
            .unwrap();
        let result = &component.locales["en_US"];
        assert_eq!(result.total_count, 12);
        assert_eq!(result.translated_count, 12);
        assert!(result.success);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_component_total_is_last_write() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(10, 10, &[])).unwrap();
        store
            .upsert(
                &Coordinate {
                    locale: "de",
                    ..HORIZON
                },
                outcome(7, 7, &[]),
            )
            .unwrap();
        let component = store
            .component("horizon", "master", "horizon-django")
            .unwrap();
        assert_eq!(component.total_count, 7);
        assert_eq!(component.locales["en_US"].total_count, 10);
    }

    #[test]
    fn test_metadata_tracks_components_and_locales() {
        let mut store = ResultStore::new();
        let writes = [
            ("horizon-django", "ko_KR"),
            ("horizon-djangojs", "de"),
            ("horizon-django", "de"),
            ("horizon-djangojs", "ja"),
        ];
        for (component, locale) in writes {
            store
                .upsert(
                    &Coordinate {
                        component,
                        locale,
                        ..HORIZON
                    },
                    outcome(1, 1, &[]),
                )
                .unwrap();
            let category = &store.projects["horizon"].categories["master"];
            let expected = category
                .components
                .values()
                .flat_map(|component| component.locales.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            assert_eq!(
                category.metadata.total_components,
                category.components.len()
            );
            assert_eq!(category.metadata.total_locales, expected.len());
            assert_eq!(category.metadata.locales, expected);
        }
        assert_eq!(
            metadata(&store, "horizon", "master"),
            CategoryMetadata {
                total_components: 2,
                total_locales: 3,
                locales: vec!["de".into(), "ja".into(), "ko_KR".into()],
            }
        );
    }

    #[test]
    fn test_queries_do_not_create_nodes() {
        let store = ResultStore::new();
        assert_eq!(store.success_rate("nova", "master", "nova"), 0.0);
        assert!(store.locales_of("nova", "master", "nova").is_empty());
        assert!(store.projects.is_empty());
    }

    #[test]
    fn test_success_rate_without_locales() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(1, 1, &[])).unwrap();
        store
            .projects
            .get_mut("horizon")
            .unwrap()
            .categories
            .get_mut("master")
            .unwrap()
            .components
            .insert("empty".into(), Component::default());
        assert_eq!(store.success_rate("horizon", "master", "empty"), 0.0);
    }

    #[test]
    fn test_recompute_unknown_category() {
        let mut store = ResultStore::new();
        store.recompute_category_metadata("nova", "master");
        assert!(store.projects.is_empty());
    }

    #[test]
    fn test_persist_and_restore() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("reports").join("result.json");

        let mut store = ResultStore::new();
        store
            .upsert(
                &Coordinate {
                    locale: "ko_KR",
                    ..HORIZON
                },
                outcome(3, 2, &["번역 불일치"]),
            )
            .unwrap();
        store.persist(&path)?;

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("번역 불일치"));
        assert!(content.contains("\n  \"projects\": {"));

        let mut restored = ResultStore::new();
        restored.upsert(&HORIZON, outcome(1, 1, &[])).unwrap();
        restored.restore(&path)?;
        assert_eq!(restored, store);
        Ok(())
    }

    #[test]
    fn test_json_layout() -> anyhow::Result<()> {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(4, 4, &[])).unwrap();
        let value = serde_json::to_value(&store)?;
        let category = &value["projects"]["horizon"]["master"];
        assert_eq!(category["metadata"]["total_components"], 1);
        assert_eq!(category["metadata"]["locales"][0], "en_US");
        assert!(category["last_updated"].is_string());
        assert_eq!(category["horizon-django"]["total_count"], 4);
        assert_eq!(
            category["horizon-django"]["locales"]["en_US"]["success"],
            true
        );
        Ok(())
    }

    #[test]
    fn test_restore_malformed_json() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("result.json");
        fs::write(&path, "{\"projects\": ")?;

        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(1, 1, &[])).unwrap();
        let before = store.clone();
        let err = store.restore(&path).unwrap_err();
        assert!(matches!(err, ResultError::Malformed { .. }));
        assert_eq!(store, before);
        Ok(())
    }

    #[test]
    fn test_open_missing_file() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let store = ResultStore::open(&tmp_dir.path().join("result.json"))?;
        assert_eq!(store, ResultStore::new());
        Ok(())
    }

    #[test]
    fn test_restore_partial_locale() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("result.json");
        fs::write(
            &path,
            r#"{"projects": {"horizon": {"master": {
                "metadata": {"total_components": 1, "total_locales": 1, "locales": ["ko_KR"]},
                "last_updated": "2025-01-01 12:00:00",
                "horizon-django": {"total_count": 100, "locales": {
                    "ko_KR": {"translated_count": 90, "success": false,
                              "errors": ["Translation is not complete"]}}}}}}}"#,
        )?;
        let store = ResultStore::load(&path)?;
        assert_eq!(
            store.locales_of("horizon", "master", "horizon-django"),
            vec!["ko_KR"]
        );
        assert_eq!(
            store.success_rate("horizon", "master", "horizon-django"),
            0.0
        );
        Ok(())
    }

    #[test]
    fn test_restore_locale_without_outcome() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("result.json");
        fs::write(
            &path,
            r#"{"projects": {"nova": {"master": {
                "nova": {"total_count": 12, "locales": {"ja": {"total_count": 12}}}}}}}"#,
        )?;
        let store = ResultStore::load(&path)?;
        let result = &store.component("nova", "master", "nova").unwrap().locales["ja"];
        assert_eq!(result.translated_count, 0);
        assert!(!result.success);
        Ok(())
    }

    #[test]
    fn test_reserved_component_names() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("result.json");
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(3, 3, &[]))?;

        for component in ["metadata", "last_updated"] {
            let coordinate = Coordinate {
                component,
                ..HORIZON
            };
            let err = store.upsert(&coordinate, outcome(1, 1, &[])).unwrap_err();
            assert!(matches!(err, ResultError::ReservedComponent(_)));
        }

        store.persist(&path)?;
        let restored = ResultStore::load(&path)?;
        assert_eq!(restored, store);
        assert_eq!(metadata(&restored, "horizon", "master").total_components, 1);
        Ok(())
    }

    #[test]
    fn test_summary() {
        let mut store = ResultStore::new();
        store.upsert(&HORIZON, outcome(1, 1, &[])).unwrap();
        store
            .upsert(
                &Coordinate {
                    project: "nova",
                    component: "nova",
                    ..HORIZON
                },
                outcome(1, 0, &["x"]),
            )
            .unwrap();
        let summary = store.summary();
        assert_eq!(
            summary,
            Summary {
                projects: 2,
                tests: 2,
                successes: 1,
            }
        );
        assert_eq!(summary.to_string(), "2 projects, 2 tests, 1 successful");
    }
}
