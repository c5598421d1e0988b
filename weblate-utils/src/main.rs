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

//! Utilities for migrating translations from Zanata to Weblate.
//!
//! Each subcommand handles a single object (project, category,
//! component or translation) so that a batch driver can call the tool
//! once per translation. The check commands compare a PO file exported
//! from Zanata with the copy downloaded from Weblate and can record the
//! outcome in a shared JSON report.

mod client;
mod convert;
mod slug;

use anyhow::{anyhow, bail, Context as _};
use clap::{Args, Parser, Subcommand};
use client::{ClientError, HttpTransport, Transport, WeblateClient};
use log::{error, info};
use migration_check::{
    count_check, detail_check, run_count_check, Catalog, ComparisonOutcome, Coordinate,
    ResultStore, RetryPolicy,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(about = "Weblate management utilities for the Zanata migration")]
struct Cli {
    /// Base URL of the Weblate instance.
    #[arg(long, env = "WEBLATE_URL", global = true)]
    weblate_url: Option<String>,
    /// API token used for authentication.
    #[arg(long, env = "WEBLATE_TOKEN", global = true, hide_env_values = true)]
    weblate_token: Option<String>,
    /// Timeout of a single HTTP request, in seconds.
    #[arg(long, default_value_t = 120, global = true)]
    timeout: u64,
    /// Delay between upload attempts, in seconds.
    #[arg(long, default_value_t = 15, global = true)]
    upload_delay: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CoordinateArgs {
    /// Name of the project.
    #[arg(long)]
    project: String,
    /// Name of the category (version).
    #[arg(long)]
    category: String,
    /// Name of the component.
    #[arg(long)]
    component: String,
    /// Locale of the translation.
    #[arg(long)]
    locale: String,
}

impl CoordinateArgs {
    fn coordinate(&self) -> Coordinate<'_> {
        Coordinate::new(&self.project, &self.category, &self.component, &self.locale)
    }
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[command(flatten)]
    coordinate: CoordinateArgs,
    /// Path to the PO file exported from Zanata.
    #[arg(long)]
    zanata_po_path: PathBuf,
    /// Path to the PO file downloaded from Weblate.
    #[arg(long)]
    weblate_po_path: PathBuf,
    /// Path to the JSON report to update.
    #[arg(long)]
    result_json: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new project.
    CreateProject {
        #[arg(long)]
        project: String,
    },
    /// Create a new category.
    CreateCategory {
        #[arg(long)]
        project: String,
        #[arg(long)]
        category: String,
    },
    /// Create a new component from a POT file.
    CreateComponent {
        #[arg(long)]
        project: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        component: String,
        #[arg(long)]
        pot_path: PathBuf,
    },
    /// Create a new glossary.
    CreateGlossary {
        #[arg(long)]
        project: String,
    },
    /// Create a new translation.
    CreateTranslation {
        #[command(flatten)]
        coordinate: CoordinateArgs,
    },
    /// Upload a PO file, replacing the translation.
    UploadPoFile {
        #[command(flatten)]
        coordinate: CoordinateArgs,
        #[arg(long)]
        po_path: PathBuf,
    },
    /// Download the translation files of a project.
    DownloadTranslationFile {
        #[arg(long)]
        project: String,
        #[arg(long)]
        po_path: PathBuf,
    },
    /// Download the PO file of a single translation.
    DownloadTranslation {
        #[command(flatten)]
        coordinate: CoordinateArgs,
        #[arg(long)]
        po_path: PathBuf,
    },
    /// Check the sentence count of the translation.
    CheckSentenceCount {
        #[command(flatten)]
        check: CheckArgs,
        /// Delay between a re-upload and the next check, in seconds.
        #[arg(long, default_value_t = 10)]
        recheck_delay: u64,
    },
    /// Check the sentence detail of the translation.
    CheckSentenceDetail {
        #[command(flatten)]
        check: CheckArgs,
    },
    /// Copy msgid into msgstr for every message of a POT file.
    ConvertPot { pot_path: PathBuf },
}

impl Cli {
    fn client(&self) -> anyhow::Result<WeblateClient<HttpTransport>> {
        let url = self
            .weblate_url
            .as_deref()
            .ok_or_else(|| anyhow!("WEBLATE_URL is not set"))?;
        let token = self
            .weblate_token
            .as_deref()
            .ok_or_else(|| anyhow!("WEBLATE_TOKEN is not set"))?;
        let transport = HttpTransport::new(url, token, Duration::from_secs(self.timeout))?;
        Ok(WeblateClient::new(
            transport,
            Duration::from_secs(self.upload_delay),
        ))
    }
}

fn load_pair(check: &CheckArgs) -> anyhow::Result<(Catalog, Catalog)> {
    Ok((
        Catalog::load(&check.zanata_po_path)?,
        Catalog::load(&check.weblate_po_path)?,
    ))
}

/// Count check with re-uploads of the Zanata file while the counts differ.
///
/// Every attempt after the first compares against a fresh download
/// of the Weblate file.
fn check_sentence_count<T: Transport>(
    client: &WeblateClient<T>,
    check: &CheckArgs,
    policy: &RetryPolicy,
) -> anyhow::Result<ComparisonOutcome> {
    let coordinate = check.coordinate.coordinate();

    run_count_check(
        policy,
        |attempt| {
            if attempt > 0 {
                client.download_translation(&coordinate, &check.weblate_po_path)?;
            }
            let (zanata, weblate) = load_pair(check)?;
            Ok(count_check(&zanata, &weblate))
        },
        |_| {
            if !client.upload_po_file(&coordinate, &check.zanata_po_path)? {
                error!("Weblate did not accept the upload of {coordinate}");
            }
            Ok(())
        },
        || {
            let (zanata, weblate) = load_pair(check)?;
            detail_check(&zanata, &weblate).log();
            Ok(())
        },
    )
}

fn check_sentence_detail(check: &CheckArgs) -> anyhow::Result<ComparisonOutcome> {
    let (zanata, weblate) = load_pair(check)?;
    let report = detail_check(&zanata, &weblate);
    report.log();
    Ok(report.into_outcome())
}

/// Add the outcome to the JSON report and print statistics.
#[allow(clippy::print_stdout)]
fn record(path: &Path, coordinate: &Coordinate, outcome: ComparisonOutcome) -> anyhow::Result<()> {
    let mut store = ResultStore::open(path)?;
    store.upsert(coordinate, outcome)?;
    store.persist(path)?;

    let locales = store.locales_of(coordinate.project, coordinate.category, coordinate.component);
    let rate = store.success_rate(coordinate.project, coordinate.category, coordinate.component);
    println!("Results: {}", store.summary());
    println!(
        "{}/{}/{}: {} locales, {rate:.1}% successful",
        coordinate.project,
        coordinate.category,
        coordinate.component,
        locales.len()
    );
    Ok(())
}

/// Run a check and record its outcome.
///
/// Catalogs which cannot be read are recorded as failed outcomes
/// before the error is returned. Errors talking to Weblate abort
/// without touching the report, since nothing was measured.
fn run_check(
    check: &CheckArgs,
    run: impl FnOnce() -> anyhow::Result<ComparisonOutcome>,
) -> anyhow::Result<()> {
    let coordinate = check.coordinate.coordinate();
    let result = run();
    if let Err(err) = &result {
        if err.chain().any(|cause| cause.is::<ClientError>()) {
            error!("Could not check {coordinate}: {err:#}");
            return result.map(|_| ());
        }
    }
    if let Some(path) = &check.result_json {
        let outcome = match &result {
            Ok(outcome) => outcome.clone(),
            Err(err) => ComparisonOutcome::failure(0, 0, format!("{err:#}")),
        };
        record(path, &coordinate, outcome)
            .with_context(|| format!("Could not record result in {}", path.display()))?;
    }

    if !result?.success {
        bail!("Check failed for {coordinate}");
    }
    info!("Check passed for {coordinate}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
    let cli = Cli::parse();

    match &cli.command {
        Command::CreateProject { project } => cli.client()?.create_project(project)?,
        Command::CreateCategory { project, category } => {
            cli.client()?.create_category(project, category)?
        }
        Command::CreateComponent {
            project,
            category,
            component,
            pot_path,
        } => cli
            .client()?
            .create_component(project, category, component, pot_path)?,
        Command::CreateGlossary { project } => cli.client()?.create_glossary(project)?,
        Command::CreateTranslation { coordinate } => cli
            .client()?
            .create_translation(&coordinate.coordinate())?,
        Command::UploadPoFile {
            coordinate,
            po_path,
        } => {
            let coordinate = coordinate.coordinate();
            if !cli.client()?.upload_po_file(&coordinate, po_path)? {
                bail!("Weblate did not accept the upload of {coordinate}");
            }
        }
        Command::DownloadTranslationFile { project, po_path } => cli
            .client()?
            .download_translation_file(project, po_path)?,
        Command::DownloadTranslation {
            coordinate,
            po_path,
        } => cli
            .client()?
            .download_translation(&coordinate.coordinate(), po_path)?,
        Command::CheckSentenceCount {
            check,
            recheck_delay,
        } => {
            let client = cli.client()?;
            let policy = RetryPolicy {
                upload_delay: Duration::from_secs(cli.upload_delay),
                recheck_delay: Duration::from_secs(*recheck_delay),
                ..RetryPolicy::default()
            };
            run_check(check, || check_sentence_count(&client, check, &policy))?
        }
        Command::CheckSentenceDetail { check } => {
            run_check(check, || check_sentence_detail(check))?
        }
        Command::ConvertPot { pot_path } => {
            convert::convert_pot(pot_path)?;
        }
    }

    Ok(())
}
