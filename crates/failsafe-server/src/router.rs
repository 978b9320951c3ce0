//! Exact-path request routing.

use std::collections::HashMap;

use crate::engine::UriHandler;

/// Per-instance handler registry. Paths match exactly; the fallback
/// handler (registered under the empty path) serves everything else,
/// conventionally as 404.
#[derive(Default)]
pub struct Router {
    handlers: HashMap<String, Box<dyn UriHandler>>,
    fallback: Option<Box<dyn UriHandler>>,
}

impl Router {
    /// Empty router. Lookups fail until a fallback is registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`. An empty path installs the
    /// fallback. Re-registering a path replaces the previous handler.
    pub fn register(&mut self, path: &str, handler: Box<dyn UriHandler>) {
        if path.is_empty() {
            self.fallback = Some(handler);
        } else {
            self.handlers.insert(path.to_string(), handler);
        }
    }

    /// Handler for `path`, or the fallback.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&dyn UriHandler> {
        self.handlers
            .get(path)
            .or(self.fallback.as_ref())
            .map(Box::as_ref)
    }

    /// Number of registered paths, fallback excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no paths are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("paths", &self.handlers.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use failsafe_http::Request;

    use super::*;
    use crate::engine::Response;

    struct Tag(&'static str);

    impl UriHandler for Tag {
        fn on_new(&self, _request: &Request, response: &mut Response) {
            response.text(200, self.0);
        }
    }

    fn body_of(handler: &dyn UriHandler) -> String {
        let mut response = Response::default();
        let mut reader = failsafe_http::RequestReader::new(failsafe_http::ReadLimits::default());
        reader.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        handler.on_new(&reader.into_request().unwrap(), &mut response);
        match response.payload {
            crate::engine::ResponsePayload::Std(ref b) => {
                String::from_utf8(b.to_vec()).unwrap()
            },
            _ => panic!("expected STD payload"),
        }
    }

    #[test]
    fn exact_match_and_fallback() {
        let mut router = Router::new();
        router.register("/version", Box::new(Tag("version")));
        router.register("", Box::new(Tag("404")));

        assert_eq!(body_of(router.lookup("/version").unwrap()), "version");
        assert_eq!(body_of(router.lookup("/nope").unwrap()), "404");
        assert_eq!(body_of(router.lookup("/version/extra").unwrap()), "404");
    }

    #[test]
    fn lookup_without_fallback_is_none() {
        let mut router = Router::new();
        router.register("/x", Box::new(Tag("x")));
        assert!(router.lookup("/y").is_none());
    }

    #[test]
    fn reregistration_replaces() {
        let mut router = Router::new();
        router.register("/a", Box::new(Tag("first")));
        router.register("/a", Box::new(Tag("second")));
        assert_eq!(router.len(), 1);
        assert_eq!(body_of(router.lookup("/a").unwrap()), "second");
    }
}
