//! Template discovery and parsing.
//!
//! The store converts a directory tree into a set of named, parsed
//! template bodies. Files under the reserved `layouts/` subtree are
//! collected separately; everything else is a content template. Names
//! are derived from the path relative to the root with the extension
//! stripped and separators normalized to `/`, so
//! `templates/users/show.html` becomes `users/show`.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment};

use crate::error::{Error, Result};

use super::funcs::FuncMap;

/// The only extension the template root may contain.
const TEMPLATE_EXT: &str = "html";

/// Reserved subtree for layout templates.
pub(crate) const LAYOUT_DIR: &str = "layouts";

/// The parsed result of walking a template root.
///
/// `base` holds every template (contents under their canonical names,
/// layouts under `layouts/<name>`) parsed with the placeholder function
/// globals installed; the raw sources are kept alongside so the composer
/// can overlay content into environment clones.
pub(crate) struct TemplateStore {
    pub base: Environment<'static>,
    pub contents: Vec<(String, String)>,
    pub layouts: Vec<(String, String)>,
}

impl TemplateStore {
    /// Walk `root` and parse every template it contains.
    ///
    /// Fails on the first file with a foreign extension or template
    /// syntax error; a partially built store is never returned.
    pub fn build(root: &Path, placeholders: &FuncMap) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Template(format!(
                "template root {} is not a directory",
                root.display()
            )));
        }

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_name| AutoEscape::Html);
        for (name, value) in placeholders {
            env.add_global(name.clone(), value.clone());
        }

        let mut files = Vec::new();
        walk(root, &mut files)?;

        let mut contents = Vec::new();
        let mut layouts = Vec::new();

        for path in files {
            let rel = path
                .strip_prefix(root)
                .expect("walked path is under the root");

            if rel.extension().and_then(|ext| ext.to_str()) != Some(TEMPLATE_EXT) {
                return Err(Error::Template(format!(
                    "template {} must end in .{}",
                    path.display(),
                    TEMPLATE_EXT
                )));
            }

            let source = fs::read_to_string(&path)?;
            let name = canonical_name(rel);

            if let Some(layout_name) = name.strip_prefix(&format!("{LAYOUT_DIR}/")) {
                layouts.push((layout_name.to_string(), source));
            } else {
                contents.push((name, source));
            }
        }

        for (name, source) in &contents {
            env.add_template_owned(name.clone(), source.clone())
                .map_err(|err| {
                    Error::Template(format!("failed to parse template {name}: {err}"))
                })?;
        }
        for (name, source) in &layouts {
            env.add_template_owned(format!("{LAYOUT_DIR}/{name}"), source.clone())
                .map_err(|err| {
                    Error::Template(format!("failed to parse layout {name}: {err}"))
                })?;
        }

        Ok(Self {
            base: env,
            contents,
            layouts,
        })
    }
}

/// Collect every file under `dir`, depth first, in a stable order.
fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else {
            files.push(path);
        }
    }

    Ok(())
}

/// Derive the canonical template name from a root-relative path: strip
/// the extension and join components with `/` regardless of the OS
/// separator.
fn canonical_name(rel: &Path) -> String {
    let stripped = rel.with_extension("");
    stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
