//! hudsucker handler wiring the interceptor chain into the proxy.

use hudsucker::{
    hyper::{Method, Request, Response},
    Body, HttpContext, HttpHandler, RequestOrResponse,
};

use crate::intercept::InterceptorChain;

/// HTTP handler for the intercepting proxy.
///
/// Every request and response goes through the chain. CONNECT tunnels are
/// decrypted only when `intercept_https` is set; otherwise they are relayed
/// as opaque bytes.
#[derive(Clone, Debug)]
pub struct ProxyHandler {
    chain: InterceptorChain,
    intercept_https: bool,
}

impl ProxyHandler {
    /// Creates a handler running `chain`.
    pub fn new(chain: InterceptorChain, intercept_https: bool) -> Self {
        Self {
            chain,
            intercept_https,
        }
    }
}

impl HttpHandler for ProxyHandler {
    async fn handle_request(
        &mut self,
        _ctx: &HttpContext,
        req: Request<Body>,
    ) -> RequestOrResponse {
        if req.method() == Method::CONNECT {
            return RequestOrResponse::Request(req);
        }
        RequestOrResponse::Request(self.chain.process_request(req).await)
    }

    async fn handle_response(&mut self, _ctx: &HttpContext, res: Response<Body>) -> Response<Body> {
        self.chain.process_response(res).await
    }

    async fn should_intercept(&mut self, _ctx: &HttpContext, _req: &Request<Body>) -> bool {
        self.intercept_https
    }
}
