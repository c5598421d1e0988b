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

//! Client for the Weblate REST API.
//!
//! Requests go through the [`Transport`] trait so that the logic
//! deciding what to create or upload can be exercised without a
//! server. Paths are relative to the `api/` prefix of the instance.

use crate::slug::{component_path, filemask, sanitize_locale, sanitize_slug, version_name};
use log::{info, warn};
use migration_check::Coordinate;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Number of uploads of one file before giving up.
const UPLOAD_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("Unexpected status {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Invalid JSON from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },
    #[error("Category does not exist: {0}")]
    MissingCategory(String),
    #[error("Could not access {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Could not build component archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Status code and raw body of an HTTP response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self, url: &str) -> Result<Value> {
        serde_json::from_slice(&self.body).map_err(|source| ClientError::Json {
            url: url.to_string(),
            source,
        })
    }

    /// Fail unless the server answered with a 2xx status.
    fn require_success(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Status {
                url: url.to_string(),
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// A file sent in a `multipart/form-data` request.
#[derive(Clone, Copy, Debug)]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub trait Transport {
    /// Absolute URL of an API path.
    fn api_url(&self, path: &str) -> String;

    fn fetch(&self, path: &str) -> Result<Response>;

    fn post_json(&self, path: &str, body: &Value) -> Result<Response>;

    fn post_multipart(&self, path: &str, fields: &[(&str, &str)], file: FilePart)
        -> Result<Response>;
}

/// Blocking HTTP transport authenticated with an API token.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("weblate-utils/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| transport_error(base_url, err))?;
        Ok(Self {
            client,
            api_base: format!("{}/api/", base_url.trim_end_matches('/')),
            token: token.to_string(),
        })
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Read the whole response. Error statuses are returned, not raised.
fn read_response(
    url: &str,
    result: reqwest::Result<reqwest::blocking::Response>,
) -> Result<Response> {
    let response = result.map_err(|err| transport_error(url, err))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .map_err(|err| transport_error(url, err))?
        .to_vec();
    Ok(Response { status, body })
}

impl Transport for HttpTransport {
    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn fetch(&self, path: &str) -> Result<Response> {
        let url = self.api_url(path);
        let result = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.authorization())
            .send();
        read_response(&url, result)
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        let url = self.api_url(path);
        let result = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.authorization())
            .json(body)
            .send();
        read_response(&url, result)
    }

    fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        file: FilePart,
    ) -> Result<Response> {
        let url = self.api_url(path);
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.to_string())
            .mime_str(file.content_type)
            .map_err(|err| transport_error(&url, err))?;
        let form = fields
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.to_string(), value.to_string())
            })
            .part(file.field.to_string(), part);
        let result = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.authorization())
            .multipart(form)
            .send();
        read_response(&url, result)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Pack a POT file into a zip archive under `name`.
fn zip_template(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(name, options)?;
    writer
        .write_all(content)
        .map_err(zip::result::ZipError::from)?;
    Ok(writer.finish()?.into_inner())
}

pub struct WeblateClient<T> {
    transport: T,
    upload_delay: Duration,
}

impl<T: Transport> WeblateClient<T> {
    pub fn new(transport: T, upload_delay: Duration) -> Self {
        Self {
            transport,
            upload_delay,
        }
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        self.transport
            .post_json(path, body)?
            .require_success(&self.transport.api_url(path))
    }

    fn fetch_success(&self, path: &str) -> Result<Response> {
        self.transport
            .fetch(path)?
            .require_success(&self.transport.api_url(path))
    }

    fn unexpected(&self, path: &str, response: Response) -> ClientError {
        ClientError::Status {
            url: self.transport.api_url(path),
            status: response.status,
            body: response.text(),
        }
    }

    /// Category names of a project mapped to their ids.
    pub fn categories(&self, project: &str) -> Result<BTreeMap<String, u64>> {
        let path = format!("projects/{}/categories/", sanitize_slug(project));
        let json = self
            .fetch_success(&path)?
            .json(&self.transport.api_url(&path))?;
        let categories: BTreeMap<String, u64> = json["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|category| {
                        Some((
                            category["name"].as_str()?.to_string(),
                            category["id"].as_u64()?,
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(categories)
    }

    fn category_id(&self, project: &str, category: &str) -> Result<u64> {
        self.categories(project)?
            .get(&version_name(category))
            .copied()
            .ok_or_else(|| ClientError::MissingCategory(category.to_string()))
    }

    pub fn create_project(&self, project: &str) -> Result<()> {
        let path = format!("projects/{}/", sanitize_slug(project));
        let response = self.transport.fetch(&path)?;
        match response.status {
            200 => info!("Project already exists: {project}"),
            404 => {
                info!("Project does not exist: {project}");
                self.post_json(
                    "projects/",
                    &json!({
                        "name": project,
                        "slug": sanitize_slug(project),
                        "web": format!("https://opendev.org/openstack/{project}"),
                    }),
                )?;
                info!("Project created: {project}");
            }
            _ => return Err(self.unexpected(&path, response)),
        }
        Ok(())
    }

    pub fn create_category(&self, project: &str, category: &str) -> Result<()> {
        if self.categories(project)?.contains_key(&version_name(category)) {
            info!("Category already exists: {category}");
            return Ok(());
        }

        info!("Category does not exist: {category}");
        let project_url = self
            .transport
            .api_url(&format!("projects/{}/", sanitize_slug(project)));
        self.post_json(
            "categories/",
            &json!({
                "name": version_name(category),
                "slug": sanitize_slug(category),
                "project": project_url,
            }),
        )?;
        info!("Category created: {category}");
        Ok(())
    }

    pub fn create_glossary(&self, project: &str) -> Result<()> {
        let path = format!("components/{}/glossary/", sanitize_slug(project));
        let response = self.transport.fetch(&path)?;
        match response.status {
            200 => info!("Glossary component already exists"),
            404 => {
                info!("Glossary component does not exist");
                self.post_json(
                    &format!("projects/{}/components/", sanitize_slug(project)),
                    &json!({
                        "name": "glossary",
                        "slug": "glossary",
                        "file_format": "tbx",
                        "filemask": "*.tbx",
                        "repo": "local:",
                        "vcs": "local",
                        "source_language": "en_US",
                        "is_glossary": true,
                    }),
                )?;
                info!("Glossary created");
            }
            _ => return Err(self.unexpected(&path, response)),
        }
        Ok(())
    }

    /// Create a component in a category, seeded with the POT file.
    pub fn create_component(
        &self,
        project: &str,
        category: &str,
        component: &str,
        pot_path: &Path,
    ) -> Result<()> {
        let path = format!("components/{}/", component_path(project, category, component));
        let response = self.transport.fetch(&path)?;
        match response.status {
            200 => {
                info!("Component already exists: {component}");
                return Ok(());
            }
            404 => info!("Component does not exist: {component}"),
            _ => return Err(self.unexpected(&path, response)),
        }

        let category_url = self.transport.api_url(&format!(
            "categories/{}/",
            self.category_id(project, category)?
        ));
        let template = format!("{component}.pot");
        let archive = zip_template(&template, &read_file(pot_path)?)?;
        let archive_name = format!("{component}.zip");
        let slug = sanitize_slug(component);
        let mask = filemask(component);
        let fields = [
            ("name", component),
            ("slug", slug.as_str()),
            ("file_format", "po"),
            ("filemask", mask.as_str()),
            ("repo", "local:"),
            ("vcs", "local"),
            ("source_language", "en_US"),
            ("new_base", template.as_str()),
            ("category", category_url.as_str()),
        ];
        let components_path = format!("projects/{}/components/", sanitize_slug(project));
        self.transport
            .post_multipart(
                &components_path,
                &fields,
                FilePart {
                    field: "zipfile",
                    file_name: &archive_name,
                    content_type: "application/zip",
                    bytes: &archive,
                },
            )?
            .require_success(&self.transport.api_url(&components_path))?;
        info!("Component created: {component}");
        Ok(())
    }

    pub fn create_translation(&self, coordinate: &Coordinate) -> Result<()> {
        let locale = sanitize_locale(coordinate.locale);
        let component = component_path(
            coordinate.project,
            coordinate.category,
            coordinate.component,
        );
        let path = format!("translations/{component}/{locale}/");
        let response = self.transport.fetch(&path)?;
        match response.status {
            200 => info!("Translation already exists: {locale}"),
            404 => {
                self.post_json(
                    &format!("components/{component}/translations/"),
                    &json!({ "language_code": locale }),
                )?;
                info!("Translation created: {locale}");
            }
            _ => return Err(self.unexpected(&path, response)),
        }
        Ok(())
    }

    /// Replace the translation with the content of `po_path`.
    ///
    /// Weblate may accept the request but report that nothing was
    /// imported. The upload is repeated a few times in that case.
    /// Returns whether an upload was accepted.
    pub fn upload_po_file(&self, coordinate: &Coordinate, po_path: &Path) -> Result<bool> {
        let locale = sanitize_locale(coordinate.locale);
        let path = format!(
            "translations/{}/{locale}/file/",
            component_path(
                coordinate.project,
                coordinate.category,
                coordinate.component
            )
        );
        let url = self.transport.api_url(&path);
        let content = read_file(po_path)?;
        let file_name = po_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{locale}.po"));

        let mut last_response = Response::default();
        for attempt in 1..=UPLOAD_ATTEMPTS {
            info!(
                "Uploading PO file: {}, attempt {attempt}/{UPLOAD_ATTEMPTS}",
                po_path.display()
            );
            let response = self
                .transport
                .post_multipart(
                    &path,
                    &[("method", "replace")],
                    FilePart {
                        field: "file",
                        file_name: &file_name,
                        content_type: "text/x-gettext-translation",
                        bytes: &content,
                    },
                )?
                .require_success(&url)?;
            if response.json(&url)?["result"] == true {
                info!("Upload successful: {} {locale}", coordinate.component);
                return Ok(true);
            }
            last_response = response;
            if attempt < UPLOAD_ATTEMPTS {
                thread::sleep(self.upload_delay);
            }
        }

        warn!("Upload failed: {}", last_response.text());
        Ok(false)
    }

    /// Download the translation files of a whole project.
    pub fn download_translation_file(&self, project: &str, output: &Path) -> Result<()> {
        let path = format!("projects/{}/file/", sanitize_slug(project));
        let response = self.fetch_success(&path)?;
        write_file(output, &response.body)?;
        info!(
            "Downloaded translation file from {}",
            self.transport.api_url(&path)
        );
        info!("Saved to: {}", output.display());
        Ok(())
    }

    /// Download the PO file of a single translation.
    pub fn download_translation(&self, coordinate: &Coordinate, output: &Path) -> Result<()> {
        let path = format!(
            "translations/{}/{}/file/",
            component_path(
                coordinate.project,
                coordinate.category,
                coordinate.component
            ),
            sanitize_locale(coordinate.locale)
        );
        let response = self.fetch_success(&path)?;
        write_file(output, &response.body)?;
        info!("Saved {coordinate} to: {}", output.display());
        Ok(())
    }
}
