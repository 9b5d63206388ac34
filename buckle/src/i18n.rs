//! Message translation.
//!
//! Catalogs are JSON files named `<locale>.json` in the locale
//! directory, mapping message IDs to either a plain string or a plural
//! object:
//!
//! ```json
//! {
//!     "greeting": "Hello, {name}!",
//!     "inbox": { "one": "{count} message", "other": "{count} messages" }
//! }
//! ```
//!
//! `{name}` placeholders are substituted from the argument map; plural
//! messages select `one` for a count of 1 and `other` otherwise, with
//! `{count}` available as a placeholder. A missing message never fails
//! a render: it produces a visible `translation missing` marker
//! instead.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// A single message: plain text or plural forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Message {
    Simple(String),
    Plural {
        #[serde(default)]
        one: Option<String>,
        other: String,
    },
}

type Catalog = HashMap<String, Message>;

/// Translation lookup service.
///
/// Catalogs are loaded eagerly at construction; with `reload` enabled
/// they are re-read from disk on every lookup, so editing a catalog in
/// development takes effect without a restart.
pub struct Translator {
    dir: Option<PathBuf>,
    default_locale: String,
    reload: bool,
    catalogs: RwLock<HashMap<String, Catalog>>,
}

impl Translator {
    /// Load catalogs from `dir`. `None` yields an empty translator that
    /// marks every message as missing.
    ///
    /// # Errors
    ///
    /// Fails if the directory contains a non-`.json` file or a catalog
    /// that does not parse.
    pub fn new(
        dir: Option<PathBuf>,
        default_locale: impl Into<String>,
        reload: bool,
    ) -> Result<Self> {
        let catalogs = match &dir {
            Some(dir) => load_catalogs(dir)?,
            None => HashMap::new(),
        };

        Ok(Self {
            dir,
            default_locale: default_locale.into(),
            reload,
            catalogs: RwLock::new(catalogs),
        })
    }

    /// The configured fallback locale.
    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Pick the locale for a request: an explicit `locale` query
    /// parameter wins, then the first `Accept-Language` tag with a
    /// loaded catalog, then the default.
    pub fn resolve_locale(
        &self,
        query_locale: Option<&str>,
        accept_language: Option<&str>,
    ) -> String {
        if let Some(locale) = query_locale {
            if !locale.is_empty() {
                return locale.to_string();
            }
        }

        if let Some(accept) = accept_language {
            let loaded = self.read();
            for tag in accept.split(',') {
                let tag = tag.split(';').next().unwrap_or("").trim();
                if tag.is_empty() {
                    continue;
                }
                if loaded.contains_key(tag) {
                    return tag.to_string();
                }
                // "en-GB" falls back to an "en" catalog.
                if let Some(primary) = tag.split('-').next() {
                    if loaded.contains_key(primary) {
                        return primary.to_string();
                    }
                }
            }
        }

        self.default_locale.clone()
    }

    /// Translate `id` for `locale`, interpolating `args` and selecting
    /// a plural form when `count` is given.
    ///
    /// Unknown locales and message IDs yield
    /// `translation missing: <locale>, <id>`.
    pub fn translate(
        &self,
        locale: &str,
        id: &str,
        args: &HashMap<String, JsonValue>,
        count: Option<i64>,
    ) -> String {
        if self.reload {
            if let Some(dir) = &self.dir {
                match load_catalogs(dir) {
                    Ok(fresh) => *self.write() = fresh,
                    Err(err) => {
                        tracing::warn!(error = %err, "locale catalog reload failed; keeping previous catalogs")
                    }
                }
            }
        }

        let catalogs = self.read();
        let message = catalogs
            .get(locale)
            .or_else(|| catalogs.get(&self.default_locale))
            .and_then(|catalog| catalog.get(id));

        let Some(message) = message else {
            return format!("translation missing: {locale}, {id}");
        };

        let pattern = match (message, count) {
            (Message::Simple(text), _) => text.clone(),
            (Message::Plural { one, other }, Some(1)) => {
                one.clone().unwrap_or_else(|| other.clone())
            }
            (Message::Plural { other, .. }, _) => other.clone(),
        };

        interpolate(&pattern, args, count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Catalog>> {
        match self.catalogs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Catalog>> {
        match self.catalogs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load_catalogs(dir: &Path) -> Result<HashMap<String, Catalog>> {
    let mut catalogs = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            continue;
        }

        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            return Err(Error::I18n(format!(
                "locale catalog {} must end in .json",
                path.display()
            )));
        }

        let locale = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let raw = fs::read_to_string(&path)?;
        let catalog: Catalog = serde_json::from_str(&raw).map_err(|err| {
            Error::I18n(format!("failed to parse locale catalog {}: {err}", path.display()))
        })?;

        catalogs.insert(locale, catalog);
    }

    Ok(catalogs)
}

/// Substitute `{name}` placeholders from the argument map. `{count}`
/// resolves to the plural count when not overridden by an argument.
fn interpolate(pattern: &str, args: &HashMap<String, JsonValue>, count: Option<i64>) -> String {
    let mut out = pattern.to_string();

    if let Some(count) = count {
        if !args.contains_key("count") {
            out = out.replace("{count}", &count.to_string());
        }
    }

    for (key, value) in args {
        let rendered = match value {
            JsonValue::String(text) => text.clone(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{key}}}"), &rendered);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn translator(entries: &[(&str, &str)], reload: bool) -> (tempfile::TempDir, Translator) {
        let dir = tempfile::tempdir().unwrap();
        for (file, body) in entries {
            fs::write(dir.path().join(file), body).unwrap();
        }
        let translator = Translator::new(Some(dir.path().to_path_buf()), "en", reload).unwrap();
        (dir, translator)
    }

    #[test]
    fn interpolates_named_arguments() {
        let (_dir, t) = translator(&[("en.json", r#"{"greeting": "Hello, {name}!"}"#)], false);
        let args = HashMap::from([("name".to_string(), json!("Ada"))]);
        assert_eq!(t.translate("en", "greeting", &args, None), "Hello, Ada!");
    }

    #[test]
    fn selects_plural_forms_by_count() {
        let (_dir, t) = translator(
            &[(
                "en.json",
                r#"{"inbox": {"one": "{count} message", "other": "{count} messages"}}"#,
            )],
            false,
        );
        let args = HashMap::new();
        assert_eq!(t.translate("en", "inbox", &args, Some(1)), "1 message");
        assert_eq!(t.translate("en", "inbox", &args, Some(3)), "3 messages");
    }

    #[test]
    fn missing_messages_are_marked_not_fatal() {
        let (_dir, t) = translator(&[("en.json", "{}")], false);
        assert_eq!(
            t.translate("fr", "nope", &HashMap::new(), None),
            "translation missing: fr, nope"
        );
    }

    #[test]
    fn unknown_locale_falls_back_to_default_catalog() {
        let (_dir, t) = translator(&[("en.json", r#"{"hi": "hello"}"#)], false);
        assert_eq!(t.translate("de", "hi", &HashMap::new(), None), "hello");
    }

    #[test]
    fn resolve_locale_prefers_query_then_accept_language() {
        let (_dir, t) = translator(&[("en.json", "{}"), ("fr.json", "{}")], false);

        assert_eq!(t.resolve_locale(Some("fr"), None), "fr");
        assert_eq!(t.resolve_locale(None, Some("fr-CA,fr;q=0.9")), "fr");
        assert_eq!(t.resolve_locale(None, Some("de-DE,de;q=0.9")), "en");
        assert_eq!(t.resolve_locale(None, None), "en");
    }

    #[test]
    fn reload_picks_up_catalog_edits() {
        let (dir, t) = translator(&[("en.json", r#"{"hi": "hello"}"#)], true);
        assert_eq!(t.translate("en", "hi", &HashMap::new(), None), "hello");

        fs::write(dir.path().join("en.json"), r#"{"hi": "howdy"}"#).unwrap();
        assert_eq!(t.translate("en", "hi", &HashMap::new(), None), "howdy");
    }

    #[test]
    fn stray_files_in_locale_dir_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hm").unwrap();
        let err = Translator::new(Some(dir.path().to_path_buf()), "en", false).unwrap_err();
        assert!(err.to_string().contains("must end in .json"));
    }
}
