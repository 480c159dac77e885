use std::future::Future;

use crate::files::store::{FileStore, normalize_target};
use crate::http::builder::{build_response, without_body};
use crate::http::handler::Handler;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const ALLOW: &str = "GET, HEAD, OPTIONS";

/// Method dispatch for a static site.
///
/// GET serves files from the [`FileStore`]; HEAD answers with the GET head
/// and no body; OPTIONS lists the allowed methods. Everything else gets
/// `405 Method Not Allowed`.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    store: FileStore,
    gzip: bool,
}

impl StaticFiles {
    /// `gzip` enables compression for clients whose Accept-Encoding lists it.
    pub fn new(store: FileStore, gzip: bool) -> Self {
        Self { store, gzip }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub async fn get(&self, mut request: Request) -> Response {
        request.target = normalize_target(&request.target);

        let resource = self.store.open(&request.target).await;
        let gzip = self.gzip && request.accepts_gzip();

        build_response(&request, resource, gzip)
    }

    pub async fn head(&self, request: Request) -> Response {
        without_body(&self.get(request).await)
    }

    pub fn options(&self, request: &Request) -> Response {
        ResponseBuilder::new(StatusCode::NoContent)
            .version(request.version)
            .header("Connection", "keep-alive")
            .header("Allow", ALLOW)
            .build()
    }

    pub fn unsupported(&self, request: &Request) -> Response {
        ResponseBuilder::new(StatusCode::MethodNotAllowed)
            .version(request.version)
            .header("Connection", "keep-alive")
            .header("Allow", ALLOW)
            .build()
    }
}

impl Handler for StaticFiles {
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send {
        async move {
            match request.method {
                Method::GET => self.get(request).await,
                Method::HEAD => self.head(request).await,
                Method::OPTIONS => self.options(&request),
                _ => self.unsupported(&request),
            }
        }
    }
}
