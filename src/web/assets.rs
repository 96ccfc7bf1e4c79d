//! Embedded dashboard files.

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

pub async fn handle_index() -> Response {
    match Assets::get("index.html") {
        Some(file) => Html(String::from_utf8_lossy(&file.data).into_owned()).into_response(),
        None => (StatusCode::NOT_FOUND, "Dashboard not bundled").into_response(),
    }
}

pub async fn handle_static(Path(path): Path<String>) -> Response {
    serve_asset(&path)
}

fn serve_asset(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], file.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_content_types() {
        let js = serve_asset("js/dashboard.js");
        assert_eq!(js.status(), StatusCode::OK);
        assert!(js.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .ends_with("javascript"));

        let css = serve_asset("css/dashboard.css");
        assert_eq!(css.headers()[header::CONTENT_TYPE].to_str().unwrap(), "text/css");

        assert_eq!(serve_asset("missing.txt").status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_is_html() {
        let resp = handle_index().await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }
}
