//! Render engine behavior: layout composition, cache isolation, error
//! degradation, hot reload, and race freedom under concurrent renders.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use buckle::render::{
    self, noop_func, Data, FuncMap, RenderOptions, RenderScope, Renderer, TemplateFuncs,
};
use minijinja::Value;
use serde_json::json;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn basic_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "<html>{% include \"content\" %}</html>",
    );
    write(dir.path(), "index.html", "<p>hi</p>");
    write(dir.path(), "other.html", "<p>other</p>");
    dir
}

fn renderer(dir: &Path, reload: bool, funcs: Vec<Arc<dyn TemplateFuncs>>) -> Renderer {
    Renderer::new(render::Options {
        dir: dir.to_path_buf(),
        reload,
        funcs,
        ..Default::default()
    })
    .unwrap()
}

async fn into_parts(response: Response) -> (StatusCode, HeaderMap, String) {
    let (head, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (
        head.status,
        head.headers,
        String::from_utf8(bytes.to_vec()).unwrap(),
    )
}

/// A provider exposing one `token()` function that echoes the scope's
/// CSRF token, for asserting per-request function isolation.
fn token_provider() -> Arc<dyn TemplateFuncs> {
    Arc::new(|scope: Option<&RenderScope>| -> FuncMap {
        match scope {
            None => vec![("token".to_string(), noop_func())],
            Some(scope) => {
                let token = scope.csrf_token.clone().unwrap_or_default();
                vec![(
                    "token".to_string(),
                    Value::from_function(move || token.clone()),
                )]
            }
        }
    })
}

#[tokio::test]
async fn renders_content_inside_layout_with_html_content_type() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let (status, headers, body) = into_parts(
        renderer.html(None, "index", None, RenderOptions::default()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/html");
    assert_eq!(body, "<html><p>hi</p></html>");
}

#[tokio::test]
async fn status_code_option_is_honored() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let (status, _, _) = into_parts(renderer.html(
        None,
        "index",
        None,
        RenderOptions::default().status(StatusCode::CREATED),
    ))
    .await;

    assert_eq!(status, StatusCode::CREATED);
}

#[test]
fn composed_pairs_are_isolated() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());
    let opts = RenderOptions::default();

    let first = renderer.render(None, "index", None, &opts).unwrap();
    let other = renderer.render(None, "other", None, &opts).unwrap();
    let again = renderer.render(None, "index", None, &opts).unwrap();

    assert_eq!(first, "<html><p>hi</p></html>");
    assert_eq!(other, "<html><p>other</p></html>");
    // Rendering another content under the same layout must not bleed
    // into subsequent renders: byte-identical output.
    assert_eq!(first, again);
    assert!(!again.contains("other"));
}

#[tokio::test]
async fn unknown_content_is_a_500_enumerating_known_templates() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let (status, _, body) = into_parts(
        renderer.html(None, "nope", None, RenderOptions::default()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("nope"));
    assert!(body.contains("index"));
    assert!(body.contains("other"));
}

#[tokio::test]
async fn unknown_layout_is_a_500_enumerating_known_layouts() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let (status, _, body) = into_parts(renderer.html(
        None,
        "index",
        None,
        RenderOptions::default().layout("missing"),
    ))
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("missing"));
    assert!(body.contains("layouts: layout"));
}

#[test]
fn layoutless_render_produces_bare_content() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let body = renderer
        .render(None, "index", None, &RenderOptions::default().no_layout())
        .unwrap();

    assert_eq!(body, "<p>hi</p>");
}

#[test]
fn hot_reload_picks_up_new_templates() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), true, Vec::new());
    let opts = RenderOptions::default();

    assert!(renderer.render(None, "fresh", None, &opts).is_err());

    write(dir.path(), "fresh.html", "<p>fresh</p>");

    let body = renderer.render(None, "fresh", None, &opts).unwrap();
    assert_eq!(body, "<html><p>fresh</p></html>");
}

#[test]
fn static_mode_ignores_new_templates_until_rebuild() {
    let dir = basic_tree();
    let fixed = renderer(dir.path(), false, Vec::new());
    let opts = RenderOptions::default();

    write(dir.path(), "fresh.html", "<p>fresh</p>");
    assert!(fixed.render(None, "fresh", None, &opts).is_err());

    // A freshly constructed renderer (the explicit rebuild) sees it.
    let rebuilt = renderer(dir.path(), false, Vec::new());
    assert_eq!(
        rebuilt.render(None, "fresh", None, &opts).unwrap(),
        "<html><p>fresh</p></html>"
    );
}

#[test]
fn hot_reload_picks_up_edits_to_existing_templates() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), true, Vec::new());
    let opts = RenderOptions::default();

    assert_eq!(
        renderer.render(None, "index", None, &opts).unwrap(),
        "<html><p>hi</p></html>"
    );

    write(dir.path(), "index.html", "<p>edited</p>");
    assert_eq!(
        renderer.render(None, "index", None, &opts).unwrap(),
        "<html><p>edited</p></html>"
    );
}

#[test]
fn first_registered_function_provider_wins() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "{% include \"content\" %}",
    );
    write(dir.path(), "greet.html", "{{ who() }}");

    let first: Arc<dyn TemplateFuncs> = Arc::new(|scope: Option<&RenderScope>| -> FuncMap {
        match scope {
            None => vec![("who".to_string(), noop_func())],
            Some(_) => vec![(
                "who".to_string(),
                Value::from_function(|| "first".to_string()),
            )],
        }
    });
    let second: Arc<dyn TemplateFuncs> = Arc::new(|scope: Option<&RenderScope>| -> FuncMap {
        match scope {
            None => vec![("who".to_string(), noop_func())],
            Some(_) => vec![(
                "who".to_string(),
                Value::from_function(|| "second".to_string()),
            )],
        }
    });

    let renderer = renderer(dir.path(), false, vec![first, second]);
    let scope = RenderScope::default();

    for _ in 0..5 {
        let body = renderer
            .render(Some(&scope), "greet", None, &RenderOptions::default())
            .unwrap();
        assert_eq!(body, "first");
    }
}

#[test]
fn placeholder_functions_render_empty_without_a_request() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "[{% include \"content\" %}]",
    );
    write(dir.path(), "page.html", "{{ token() }}");

    let renderer = renderer(dir.path(), false, vec![token_provider()]);
    let body = renderer
        .render(None, "page", None, &RenderOptions::default())
        .unwrap();

    assert_eq!(body, "[]");
}

#[test]
fn handler_data_wins_over_request_values() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "{% include \"content\" %}",
    );
    write(dir.path(), "who.html", "{{ name }}");

    let renderer = renderer(dir.path(), false, Vec::new());
    let scope = RenderScope::default();
    scope.values.insert("name", json!("bag"));

    let from_bag = renderer
        .render(Some(&scope), "who", None, &RenderOptions::default())
        .unwrap();
    assert_eq!(from_bag, "bag");

    let data: Data = HashMap::from([("name".to_string(), json!("data"))]);
    let from_data = renderer
        .render(Some(&scope), "who", Some(data), &RenderOptions::default())
        .unwrap();
    assert_eq!(from_data, "data");
}

#[test]
fn variable_output_is_html_escaped() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "{% include \"content\" %}",
    );
    write(dir.path(), "page.html", "{{ payload }}");

    let renderer = renderer(dir.path(), false, Vec::new());
    let data: Data = HashMap::from([("payload".to_string(), json!("<script>alert(1)</script>"))]);

    let body = renderer
        .render(None, "page", Some(data), &RenderOptions::default())
        .unwrap();

    assert!(!body.contains("<script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn execution_errors_degrade_to_plain_text_500() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "{% include \"content\" %}",
    );
    // Parses fine, fails at execution.
    write(dir.path(), "page.html", "{{ x // y }}");

    let renderer = renderer(dir.path(), false, Vec::new());
    let data: Data = HashMap::from([
        ("x".to_string(), json!(1)),
        ("y".to_string(), json!(0)),
    ]);

    let (status, headers, body) = into_parts(renderer.html(
        None,
        "page",
        Some(data),
        RenderOptions::default(),
    ))
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(!body.is_empty());
}

#[test]
fn broken_template_trees_refuse_to_build() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "layouts/layout.html", "{% include \"content\" %}");
    write(dir.path(), "bad.html", "{% if %}");

    let result = Renderer::new(render::Options {
        dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    assert!(result.is_err());

    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "stray.txt", "nope");
    let result = Renderer::new(render::Options {
        dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    assert!(result.is_err());
}

#[test]
fn concurrent_renders_observe_only_their_own_functions() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "<html>{% include \"content\" %}</html>",
    );
    write(dir.path(), "page.html", "<p>{{ token() }}</p>");

    let renderer = Arc::new(renderer(dir.path(), false, vec![token_provider()]));

    std::thread::scope(|threads| {
        for i in 0..100 {
            let renderer = Arc::clone(&renderer);
            threads.spawn(move || {
                let scope = RenderScope {
                    csrf_token: Some(format!("tok-{i}")),
                    ..Default::default()
                };
                let body = renderer
                    .render(Some(&scope), "page", None, &RenderOptions::default())
                    .unwrap();
                assert_eq!(body, format!("<html><p>tok-{i}</p></html>"));
            });
        }
    });
}

#[test]
fn concurrent_renders_race_freely_under_hot_reload() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "layouts/layout.html",
        "<html>{% include \"content\" %}</html>",
    );
    write(dir.path(), "page.html", "<p>{{ token() }}</p>");

    let renderer = Arc::new(renderer(dir.path(), true, vec![token_provider()]));

    std::thread::scope(|threads| {
        for i in 0..32 {
            let renderer = Arc::clone(&renderer);
            threads.spawn(move || {
                let scope = RenderScope {
                    csrf_token: Some(format!("tok-{i}")),
                    ..Default::default()
                };
                for _ in 0..4 {
                    let body = renderer
                        .render(Some(&scope), "page", None, &RenderOptions::default())
                        .unwrap();
                    assert_eq!(body, format!("<html><p>tok-{i}</p></html>"));
                }
            });
        }
    });
}

#[test]
fn defined_templates_lists_layouts_and_contents() {
    let dir = basic_tree();
    let renderer = renderer(dir.path(), false, Vec::new());

    let listing = renderer.defined_templates();
    assert_eq!(listing, "layouts: layout, templates: index, other");
}
