use std::future::Future;

use crate::http::request::Request;
use crate::http::response::Response;

/// Produces a response for a parsed request.
///
/// The connection layer owns framing and keep-alive; implementors only see
/// the request. Closures `Fn(Request) -> Response` implement this directly.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send {
        std::future::ready(self(request))
    }
}
