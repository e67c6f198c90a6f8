use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::{ConfigError, ConfigSource, Setting, SourceLayer};
use crate::atomic_file;

/// The `KEY=VALUE` pairs of a settings file in file order, plus what was wrong with it
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SettingsFileContents {
    pub entries: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

/// Read a settings file without logging.
///
/// A missing file yields no entries. Lines that can't be parsed are skipped with a
/// warning, later duplicates win.
pub fn read(path: &Path) -> SettingsFileContents {
    let mut contents = SettingsFileContents::default();
    if !path.exists() {
        return contents;
    }
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(err) => {
            contents
                .warnings
                .push(format!("Ignoring settings file {}: {err}", path.display()));
            return contents;
        }
    };
    for entry in iter {
        match entry {
            Ok(entry) => contents.entries.push(entry),
            Err(err) => contents
                .warnings
                .push(format!("Skipping invalid line in {}: {err}", path.display())),
        }
    }
    contents
}

/// Read the entries of a settings file, logging any problems
pub fn read_entries(path: &Path) -> Vec<(String, String)> {
    let contents = read(path);
    for warning in &contents.warnings {
        log::warn!("{warning}");
    }
    contents.entries
}

/// Read a settings file as a configuration layer. Keys yapcli doesn't know are skipped.
///
/// This runs before logging is set up, so problems are appended to `warnings`.
pub fn read_layer(path: &Path, source: ConfigSource, warnings: &mut Vec<String>) -> SourceLayer {
    let contents = read(path);
    warnings.extend(contents.warnings);
    let mut layer = SourceLayer::new(source);
    for (key, value) in contents.entries {
        match Setting::from_key(&key) {
            Some(setting) => {
                layer.values.insert(setting, value);
            }
            None => warnings.push(format!(
                "Skipping unrecognized key {key} in settings file {}",
                path.display()
            )),
        }
    }
    layer
}

/// Atomically rewrite a settings file. Known keys come first in canonical order,
/// unknown keys follow sorted by name.
pub async fn write(path: &Path, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    let content = render(values);
    atomic_file::write_atomic(path, content.as_bytes())
        .await
        .map_err(|source| ConfigError::SettingsFile {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })
}

fn render(values: &BTreeMap<String, String>) -> String {
    let known = Setting::ALL
        .iter()
        .map(|setting| setting.key())
        .filter(|key| values.contains_key(*key));
    let unknown = values
        .keys()
        .map(String::as_str)
        .filter(|key| Setting::from_key(key).is_none());

    known
        .chain(unknown)
        .map(|key| format!("{key}={}\n", quote(&values[key])))
        .collect()
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if needs_quotes {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_file_is_empty_layer() {
        let tempdir = tempfile::tempdir().unwrap();
        let mut warnings = vec![];
        let layer = read_layer(&tempdir.path().join(".env"), ConfigSource::CwdFile, &mut warnings);
        assert_eq!(SourceLayer::new(ConfigSource::CwdFile), layer);
        assert!(warnings.is_empty());
    }

    #[test]
    fn reads_known_keys_and_skips_unknown() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join(".env");
        std::fs::write(
            &path,
            "# comment\nPLAID_CLIENT_ID=client\nUNRELATED=1\nPLAID_ENV=\n",
        )
        .unwrap();

        let mut warnings = vec![];
        let layer = read_layer(&path, ConfigSource::CwdFile, &mut warnings);

        assert_eq!(
            vec![format!(
                "Skipping unrecognized key UNRELATED in settings file {}",
                path.display()
            )],
            warnings
        );
        assert_eq!(
            SourceLayer::new(ConfigSource::CwdFile)
                .with(Setting::ClientId, "client")
                .with(Setting::Environment, ""),
            layer
        );
    }

    #[test]
    fn render_orders_known_keys_canonically() {
        let rendered = render(&values(&[
            ("ZZZ_CUSTOM", "x"),
            ("PLAID_SECRET", "s"),
            ("PLAID_CLIENT_ID", "c"),
            ("AAA_CUSTOM", "y"),
        ]));
        assert_eq!(
            "PLAID_CLIENT_ID=c\nPLAID_SECRET=s\nAAA_CUSTOM=y\nZZZ_CUSTOM=x\n",
            rendered
        );
    }

    #[tokio::test]
    async fn written_file_reads_back() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("config").join(".env");
        let written = values(&[
            ("PLAID_CLIENT_ID", "client id"),
            ("PLAID_ENV", ""),
            ("PLAID_COUNTRY_CODES", "US,CA"),
        ]);

        write(&path, &written).await.unwrap();

        let read: BTreeMap<String, String> = read_entries(&path).into_iter().collect();
        assert_eq!(written, read);
    }
}
