//! Static asset handlers.

use failsafe_http::{Request, ResponseInfo};

use crate::{
    assets,
    engine::{Response, UriHandler},
};

/// Serves one embedded asset verbatim.
pub struct StaticPage {
    name: &'static str,
}

impl StaticPage {
    /// Handler for the named asset.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl UriHandler for StaticPage {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        match assets::find(self.name) {
            Some(asset) => {
                response.set_std(
                    ResponseInfo { content_type: asset.mime, ..ResponseInfo::text(200) },
                    asset.body,
                );
            },
            None => serve_not_found(response),
        }
    }
}

/// The empty-path fallback: the 404 page.
pub struct NotFound;

impl UriHandler for NotFound {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        serve_not_found(response);
    }
}

fn serve_not_found(response: &mut Response) {
    match assets::find("404.html") {
        Some(asset) => response.set_std(
            ResponseInfo { content_type: asset.mime, ..ResponseInfo::text(404) },
            asset.body,
        ),
        None => response.text(404, "Error: file not found"),
    }
}

#[cfg(test)]
mod tests {
    use failsafe_http::{ReadLimits, RequestReader};

    use super::*;
    use crate::engine::ResponsePayload;

    fn get(path: &str) -> Request {
        let mut reader = RequestReader::new(ReadLimits::default());
        reader.feed(format!("GET {path} HTTP/1.1\r\n\r\n").as_bytes()).unwrap();
        reader.into_request().unwrap()
    }

    #[test]
    fn serves_asset_with_mime() {
        let mut response = Response::default();
        StaticPage::new("style.css").on_new(&get("/style.css"), &mut response);

        assert_eq!(response.info.code, 200);
        assert_eq!(response.info.content_type, "text/css");
        assert!(matches!(response.payload, ResponsePayload::Std(_)));
    }

    #[test]
    fn missing_asset_falls_through_to_404() {
        let mut response = Response::default();
        StaticPage::new("ghost.html").on_new(&get("/ghost.html"), &mut response);
        assert_eq!(response.info.code, 404);
    }

    #[test]
    fn fallback_serves_404_page() {
        let mut response = Response::default();
        NotFound.on_new(&get("/definitely/not/here"), &mut response);
        assert_eq!(response.info.code, 404);
        assert_eq!(response.info.content_type, "text/html");
    }
}
