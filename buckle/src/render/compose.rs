//! Layout composition.
//!
//! For every layout and every content template, the composer clones the
//! store's base environment and re-parses the content into the clone
//! under the reserved name `"content"`. A layout marks its extension
//! point with `{% include "content" %}`; because the overlay is parsed
//! into that specific clone last, the layout resolves it to exactly the
//! content it was paired with. Clones are fully independent: re-parsing
//! content into one pair is invisible to every other pair, including
//! pairs derived from the same layout.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use minijinja::Environment;

use crate::error::{Error, Result};

use super::funcs::{placeholder_table, TemplateFuncs};
use super::store::{TemplateStore, LAYOUT_DIR};

/// Name the content template is re-parsed under within each pair clone.
pub(crate) const CONTENT_NAME: &str = "content";

/// The composed template arena, keyed by (layout, content).
pub(crate) struct RenderCache {
    /// layout name → content name → independent environment.
    pairs: HashMap<String, HashMap<String, Environment<'static>>>,
    /// Base environment for layout-less rendering.
    bare: Environment<'static>,
    layout_names: Vec<String>,
    content_names: Vec<String>,
}

impl RenderCache {
    /// Walk the template root and compose the full (layout × content)
    /// cross product. Any parse failure aborts the whole build.
    pub fn build(root: &Path, providers: &[Arc<dyn TemplateFuncs>]) -> Result<Self> {
        let placeholders = placeholder_table(providers);
        let store = TemplateStore::build(root, &placeholders)?;

        let mut pairs = HashMap::new();
        for (layout_name, _) in &store.layouts {
            let mut per_layout = HashMap::new();
            for (content_name, content_source) in &store.contents {
                let mut clone = store.base.clone();
                clone
                    .add_template_owned(CONTENT_NAME.to_string(), content_source.clone())
                    .map_err(|err| {
                        Error::Template(format!(
                            "failed to parse template {content_name} under layout {layout_name}: {err}"
                        ))
                    })?;
                per_layout.insert(content_name.clone(), clone);
            }
            pairs.insert(layout_name.clone(), per_layout);
        }

        let mut layout_names: Vec<_> = store.layouts.iter().map(|(n, _)| n.clone()).collect();
        let mut content_names: Vec<_> = store.contents.iter().map(|(n, _)| n.clone()).collect();
        layout_names.sort();
        content_names.sort();

        Ok(Self {
            pairs,
            bare: store.base,
            layout_names,
            content_names,
        })
    }

    /// Look up the composed environment for (layout, content), cloning
    /// it out so the caller can execute after any cache lock is gone.
    /// `layout: None` selects the bare, layout-less environment.
    pub fn lookup(&self, layout: Option<&str>, content: &str) -> LookupOutcome {
        match layout {
            None => {
                if self.content_names.iter().any(|n| n == content) {
                    LookupOutcome::Found {
                        env: self.bare.clone(),
                        template: content.to_string(),
                    }
                } else {
                    LookupOutcome::UnknownContent
                }
            }
            Some(layout) => match self.pairs.get(layout) {
                None => LookupOutcome::UnknownLayout,
                Some(per_layout) => match per_layout.get(content) {
                    None => LookupOutcome::UnknownContent,
                    Some(env) => LookupOutcome::Found {
                        env: env.clone(),
                        template: format!("{LAYOUT_DIR}/{layout}"),
                    },
                },
            },
        }
    }

    /// Diagnostic enumeration of the known template set, used in error
    /// bodies.
    pub fn defined_templates(&self) -> String {
        format!(
            "layouts: {}, templates: {}",
            self.layout_names.join(", "),
            self.content_names.join(", ")
        )
    }
}

/// Result of a cache lookup.
pub(crate) enum LookupOutcome {
    Found {
        env: Environment<'static>,
        template: String,
    },
    UnknownLayout,
    UnknownContent,
}
