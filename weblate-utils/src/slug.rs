//! Naming rules for Weblate objects created from Zanata data.

use regex::Regex;
use std::sync::OnceLock;

/// Convert a Zanata locale into the form Weblate uses.
///
/// Script-based Chinese codes are mapped to region codes and the
/// language part is lowercased, e.g. `Th` becomes `th`. Only the
/// first two parts are kept, so `sr_Latn_RS` becomes `sr_Latn`.
pub fn sanitize_locale(locale: &str) -> String {
    let locale = match locale {
        "zh_Hans" => "zh_CN",
        "zh_Hant" => "zh_TW",
        other => other,
    };
    let mut parts = locale.split('_');
    let language = parts.next().unwrap_or_default().to_lowercase();
    match parts.next() {
        Some(region) => format!("{language}_{region}"),
        None => language,
    }
}

/// Replace characters which are not allowed in a slug with hyphens.
///
/// For example `stable/2025.1` becomes `stable-2025-1`.
pub fn sanitize_slug(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static HYPHENS: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("well-formed regex"));
    let hyphens = HYPHENS.get_or_init(|| Regex::new(r"-+").expect("well-formed regex"));

    let replaced = invalid.replace_all(name, "-");
    hyphens.replace_all(&replaced, "-").trim_matches('-').to_string()
}

/// Weblate category names cannot contain slashes.
pub fn version_name(version: &str) -> String {
    version.replace('/', "-")
}

/// File mask of a component, following the layout Zanata used.
pub fn filemask(component: &str) -> String {
    if component == "releasenotes" {
        "source/locale/*/LC_MESSAGES/releasenotes.po".to_string()
    } else if component == "django" || component.ends_with("-django") {
        // Several horizon plugins in one project need distinct
        // component names but share the file layout.
        "locale/*/LC_MESSAGES/django.po".to_string()
    } else if component == "djangojs" || component.ends_with("-djangojs") {
        "locale/*/LC_MESSAGES/djangojs.po".to_string()
    } else if component.starts_with("doc") {
        format!("source/locale/*/LC_MESSAGES/{component}.po")
    } else {
        format!("locale/*/LC_MESSAGES/{component}.po")
    }
}

/// API path segment of a component inside a category.
///
/// The slash between category and component is URL-encoded twice.
pub fn component_path(project: &str, category: &str, component: &str) -> String {
    format!(
        "{}/{}%252F{}",
        sanitize_slug(project),
        sanitize_slug(category),
        sanitize_slug(component)
    )
}
