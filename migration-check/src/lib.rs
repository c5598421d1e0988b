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

//! Verification helpers for moving translations from Zanata to Weblate.
//!
//! A migration is checked one translation at a time: the PO file
//! exported from Zanata is the source of truth, and the PO file
//! downloaded from Weblate is the migrated copy. The [`compare`]
//! module decides whether the two catalogs are equivalent, the
//! [`retry`] module re-uploads stale copies and checks again, and the
//! [`results`] module accumulates the outcomes of many runs into a
//! single JSON report.

pub mod catalog;
pub mod compare;
pub mod results;
pub mod retry;

use std::fmt::{self, Display, Formatter};

pub use catalog::{Catalog, CatalogEntry};
pub use compare::{count_check, detail_check, ComparisonOutcome, CountReport, DetailReport};
pub use results::{ResultError, ResultStore};
pub use retry::{run_count_check, RetryPolicy};

/// Identifies a single translation: one locale of one component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate<'a> {
    pub project: &'a str,
    pub category: &'a str,
    pub component: &'a str,
    pub locale: &'a str,
}

impl<'a> Coordinate<'a> {
    pub fn new(project: &'a str, category: &'a str, component: &'a str, locale: &'a str) -> Self {
        Self {
            project,
            category,
            component,
            locale,
        }
    }
}

impl Display for Coordinate<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project, self.category, self.component, self.locale
        )
    }
}
