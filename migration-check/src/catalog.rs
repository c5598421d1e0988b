//! Gettext catalogs reduced to the fields needed for reconciliation.

use anyhow::{anyhow, Context};
use log::debug;
use polib::message::MessageView;
use polib::po_file;
use std::fs;
use std::io::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Separator between the translated forms of a plural message.
///
/// Compiled MO files join plural forms the same way.
pub const PLURAL_SEPARATOR: char = '\0';

/// Header fields polib needs, with the value used when one is missing.
const REQUIRED_HEADERS: [(&str, &str); 9] = [
    ("Project-Id-Version", "PACKAGE VERSION"),
    ("POT-Creation-Date", ""),
    ("PO-Revision-Date", ""),
    ("Language-Team", ""),
    ("Language", ""),
    ("MIME-Version", "1.0"),
    ("Content-Type", "text/plain; charset=UTF-8"),
    ("Content-Transfer-Encoding", "8bit"),
    ("Plural-Forms", DEFAULT_PLURAL_FORMS),
];

const DEFAULT_PLURAL_FORMS: &str = "nplurals=2; plural=(n != 1);";

/// Returns true if polib can read the `Plural-Forms` value.
fn valid_plural_forms(value: &str) -> bool {
    let mut nplurals = None;
    let mut expr = None;
    for rule in value.split(';').map(str::trim).filter(|rule| !rule.is_empty()) {
        match rule.split_once('=') {
            Some(("nplurals", value)) => nplurals = value.parse::<usize>().ok(),
            Some(("plural", value)) => expr = Some(value),
            _ => return false,
        }
    }
    matches!(nplurals, Some(n) if n > 0) && expr.is_some_and(|expr| !expr.is_empty())
}

/// Add the header fields polib requires but `text` lacks.
///
/// Returns `None` when the header is already complete, or when there
/// is no header at all and the parser should report that itself.
fn complete_header(text: &str) -> Option<String> {
    let lines = text.lines().collect::<Vec<_>>();
    let end = lines
        .iter()
        .position(|line| line.trim().is_empty())
        .unwrap_or(lines.len());
    if !lines[..end].iter().any(|line| line.trim() == r#"msgid """#) {
        return None;
    }

    let mut header = Vec::with_capacity(end + REQUIRED_HEADERS.len());
    let mut present = Vec::new();
    let mut changed = false;
    for line in &lines[..end] {
        let field = line
            .trim()
            .strip_prefix('"')
            .and_then(|field| field.split_once(':'));
        if let Some((key, value)) = field {
            let value = value.trim_end_matches('"').trim_end_matches("\\n").trim();
            if key == "Plural-Forms" && !valid_plural_forms(value) {
                changed = true;
                continue;
            }
            present.push(key);
        }
        header.push(line.to_string());
    }
    for (key, default) in REQUIRED_HEADERS {
        if !present.contains(&key) {
            header.push(format!(r#""{key}: {default}\n""#));
            changed = true;
        }
    }
    if !changed {
        return None;
    }

    let mut completed = header.join("\n");
    for line in &lines[end..] {
        completed.push('\n');
        completed.push_str(line);
    }
    completed.push('\n');
    Some(completed)
}

/// Parse the PO file at `path` with polib.
///
/// Missing header fields are filled in first, and a panic inside the
/// parser is reported as an error.
pub fn parse_po(path: &Path) -> anyhow::Result<polib::catalog::Catalog> {
    let text = fs::read_to_string(path).with_context(|| format!("Could not read {path:?}"))?;
    let completed = match complete_header(&text) {
        Some(completed) => {
            debug!("Filling in missing header fields of {}", path.display());
            let mut file = tempfile::NamedTempFile::new()?;
            file.write_all(completed.as_bytes())?;
            file.flush()?;
            Some(file)
        }
        None => None,
    };
    let source = completed.as_ref().map_or(path, |file| file.path());

    panic::catch_unwind(AssertUnwindSafe(|| po_file::parse(source)))
        .map_err(|_| anyhow!("PO parser failed on malformed input"))?
        .with_context(|| format!("Could not parse {path:?} as PO file"))
}

/// A single message read from a PO or POT file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    pub msgid: String,
    pub msgstr: String,
    pub fuzzy: bool,
    pub obsolete: bool,
}

impl CatalogEntry {
    pub fn new(msgid: impl Into<String>, msgstr: impl Into<String>, obsolete: bool) -> Self {
        Self {
            msgid: msgid.into(),
            msgstr: msgstr.into(),
            fuzzy: false,
            obsolete,
        }
    }

    /// Returns true if the message has a usable translation.
    ///
    /// Obsolete and fuzzy messages never count as translated. For
    /// plural messages, every form must be filled in.
    pub fn is_translated(&self) -> bool {
        !self.obsolete
            && !self.fuzzy
            && !self.msgstr.is_empty()
            && self.msgstr.split(PLURAL_SEPARATOR).all(|form| !form.is_empty())
    }

    fn from_message(message: &dyn MessageView) -> anyhow::Result<Self> {
        let msgstr = if message.is_plural() {
            message
                .msgstr_plural()?
                .join(&PLURAL_SEPARATOR.to_string())
        } else {
            message.msgstr()?.to_string()
        };
        Ok(Self {
            msgid: message.msgid().to_string(),
            msgstr,
            fuzzy: message.is_fuzzy(),
            obsolete: false,
        })
    }
}

/// An ordered sequence of catalog entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse the PO file at `path`.
    ///
    /// Obsolete (`#~`) messages are dropped by the parser, so every
    /// loaded entry is active.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let catalog = parse_po(path)?;
        catalog
            .messages()
            .map(CatalogEntry::from_message)
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Self::new)
            .with_context(|| format!("Could not read messages from {path:?}"))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries which are not obsolete, in catalog order.
    pub fn active(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|entry| !entry.obsolete)
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const PO_FILE: &str = r#"msgid ""
msgstr ""
"Language: ko_KR\n"
"MIME-Version: 1.0\n"
"Content-Type: text/plain; charset=UTF-8\n"
"Content-Transfer-Encoding: 8bit\n"
"Plural-Forms: nplurals=1; plural=0;\n"

msgid "Save"
msgstr "저장"

msgid "Cancel"
msgstr ""

#, fuzzy
msgid "Delete"
msgstr "삭제"

msgid "One file"
msgid_plural "%d files"
msgstr[0] "파일 %d개"

#~ msgid "Old"
#~ msgstr "예전"
"#;

    #[test]
    fn test_translated_requires_text() {
        assert!(CatalogEntry::new("a", "x", false).is_translated());
        assert!(!CatalogEntry::new("b", "", false).is_translated());
    }

    #[test]
    fn test_translated_excludes_obsolete_and_fuzzy() {
        assert!(!CatalogEntry::new("a", "x", true).is_translated());
        let fuzzy = CatalogEntry {
            fuzzy: true,
            ..CatalogEntry::new("a", "x", false)
        };
        assert!(!fuzzy.is_translated());
    }

    #[test]
    fn test_translated_plural_needs_every_form() {
        assert!(CatalogEntry::new("file", "Datei\0Dateien", false).is_translated());
        assert!(!CatalogEntry::new("file", "Datei\0", false).is_translated());
    }

    #[test]
    fn test_active_skips_obsolete() {
        let catalog = Catalog::from_iter([
            CatalogEntry::new("a", "x", false),
            CatalogEntry::new("c", "y", true),
            CatalogEntry::new("b", "", false),
        ]);
        let msgids = catalog
            .active()
            .map(|entry| entry.msgid.as_str())
            .collect::<Vec<_>>();
        assert_eq!(msgids, vec!["a", "b"]);
    }

    #[test]
    fn test_load_po_file() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("ko_KR.po");
        fs::write(&path, PO_FILE)?;

        let catalog = Catalog::load(&path)?;
        let entries = catalog
            .entries()
            .iter()
            .map(|entry| (entry.msgid.as_str(), entry.is_translated()))
            .collect::<Vec<_>>();
        assert_eq!(
            entries,
            vec![
                ("Save", true),
                ("Cancel", false),
                ("Delete", false),
                ("One file", true),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_load_minimal_header() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("ja.po");
        fs::write(
            &path,
            "msgid \"\"\nmsgstr \"\"\n\"Content-Type: text/plain; charset=UTF-8\\n\"\n\n\
             msgid \"Save\"\nmsgstr \"保存\"\n",
        )?;

        let catalog = Catalog::load(&path)?;
        assert_eq!(catalog.entries(), &[CatalogEntry::new("Save", "保存", false)]);
        Ok(())
    }

    #[test]
    fn test_load_placeholder_plural_forms() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("nova.pot");
        fs::write(
            &path,
            "msgid \"\"\nmsgstr \"\"\n\
             \"Plural-Forms: nplurals=INTEGER; plural=EXPRESSION;\\n\"\n\n\
             msgid \"Reboot\"\nmsgstr \"\"\n",
        )?;

        let catalog = Catalog::load(&path)?;
        assert_eq!(catalog.entries(), &[CatalogEntry::new("Reboot", "", false)]);
        Ok(())
    }

    #[test]
    fn test_load_without_header_fails() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("ko_KR.po");
        fs::write(&path, "msgid \"Save\"\nmsgstr \"저장\"\n")?;
        assert!(Catalog::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_load_malformed_body_fails() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("ko_KR.po");
        fs::write(&path, format!("{PO_FILE}\nmsgid \"Broken\"\n\"\n"))?;
        assert!(Catalog::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_complete_header_keeps_full_header() {
        let header = REQUIRED_HEADERS
            .iter()
            .map(|(key, value)| format!("\"{key}: {value}\\n\"\n"))
            .collect::<String>();
        let text = format!("msgid \"\"\nmsgstr \"\"\n{header}\nmsgid \"a\"\nmsgstr \"b\"\n");
        assert_eq!(complete_header(&text), None);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        assert!(Catalog::load(&tmp_dir.path().join("missing.po")).is_err());
    }
}
