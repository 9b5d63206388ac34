//! Guestbook demo: layouts, flash messages, CSRF-protected forms, and
//! i18n in one small app.
//!
//! ## Running
//!
//! ```bash
//! cargo run --example guestbook
//! ```
//!
//! Then open http://localhost:3000 (try `?locale=fr` too).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::Extension;
use buckle::prelude::*;

#[derive(Clone, Default)]
struct Guestbook {
    entries: Arc<RwLock<Vec<String>>>,
}

#[derive(Deserialize)]
struct SignForm {
    name: String,
}

#[tokio::main]
async fn main() -> buckle::Result<()> {
    let demo_root = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/demos"));

    let mut options = Options {
        template_dir: demo_root.join("templates"),
        locale_dir: Some(demo_root.join("locales")),
        reload: true,
        serve_public: false,
        ..Default::default()
    };
    options.session.secure = false;
    buckle::init_tracing(&options);

    let guestbook = Guestbook::default();

    let app = App::new(options)?.merge(
        Router::new()
            .route("/", get(index))
            .route("/sign", post(sign))
            .route("/entries.json", get(entries_json))
            .layer(Extension(guestbook)),
    );

    app.listen("127.0.0.1:3000").await
}

async fn index(ctx: Context, Extension(guestbook): Extension<Guestbook>) -> Response {
    let entries = guestbook.entries.read().unwrap().clone();
    let data: Data = HashMap::from([("entries".to_string(), json!(entries))]);
    ctx.render("index", Some(data)).await
}

async fn sign(
    ctx: Context,
    Extension(guestbook): Extension<Guestbook>,
    Form(form): Form<SignForm>,
) -> Response {
    let name = form.name.trim().to_string();
    if name.is_empty() {
        if let Err(err) = ctx.flash.add("alert", json!("A name is required")).await {
            return ctx.error(err).await;
        }
        return ctx.redirect("/");
    }

    guestbook.entries.write().unwrap().push(name);
    if let Err(err) = ctx.flash.add("notice", json!("Thanks for signing!")).await {
        return ctx.error(err).await;
    }
    ctx.redirect("/")
}

async fn entries_json(
    ctx: Context,
    Extension(guestbook): Extension<Guestbook>,
) -> Response {
    let entries = guestbook.entries.read().unwrap().clone();
    ctx.json(StatusCode::OK, &entries)
}
