//! Seed a source-language translation from a template.

use anyhow::Context;
use log::info;
use migration_check::catalog::parse_po;
use polib::message::{MessageMutView, MessageView};
use polib::po_file;
use std::path::Path;

/// Copy the msgid of every singular message into its msgstr.
///
/// The file is rewritten in place. Returns the number of messages
/// which were changed.
pub fn convert_pot(path: &Path) -> anyhow::Result<usize> {
    let mut catalog = parse_po(path)?;

    let mut changes = 0;
    for mut message in catalog.messages_mut() {
        if message.msgid().is_empty() || message.is_plural() {
            continue;
        }
        let msgid = message.msgid().to_string();
        message.set_msgstr(msgid)?;
        changes += 1;
    }

    po_file::write(&catalog, path).with_context(|| format!("Could not write {path:?}"))?;
    info!("Converted {changes} messages in {}", path.display());
    Ok(changes)
}
