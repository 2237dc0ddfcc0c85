//! Request and response interception interfaces.

use std::sync::Arc;

use hudsucker::hyper::{Request, Response};
use hudsucker::Body;

/// Observes or rewrites a request before it is forwarded upstream.
#[async_trait::async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Returns the request to forward.
    async fn intercept_request(&self, request: Request<Body>) -> Request<Body>;
}

/// Observes or rewrites a response before it is returned to the client.
#[async_trait::async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Returns the response to deliver.
    async fn intercept_response(&self, response: Response<Body>) -> Response<Body>;
}

/// Ordered interceptors applied to every exchange.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    requests: Vec<Arc<dyn RequestInterceptor>>,
    responses: Vec<Arc<dyn ResponseInterceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("requests", &self.requests.len())
            .field("responses", &self.responses.len())
            .finish()
    }
}

impl InterceptorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request interceptor.
    pub fn with_request(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.requests.push(interceptor);
        self
    }

    /// Appends a response interceptor.
    pub fn with_response(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.responses.push(interceptor);
        self
    }

    /// Runs `request` through every request interceptor in order.
    pub async fn process_request(&self, mut request: Request<Body>) -> Request<Body> {
        for interceptor in &self.requests {
            request = interceptor.intercept_request(request).await;
        }
        request
    }

    /// Runs `response` through every response interceptor in order.
    pub async fn process_response(&self, mut response: Response<Body>) -> Response<Body> {
        for interceptor in &self.responses {
            response = interceptor.intercept_response(response).await;
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudsucker::hyper::header::HeaderValue;

    struct Tag(&'static str);

    #[async_trait::async_trait]
    impl RequestInterceptor for Tag {
        async fn intercept_request(&self, mut request: Request<Body>) -> Request<Body> {
            request
                .headers_mut()
                .append("x-seen", HeaderValue::from_static(self.0));
            request
        }
    }

    #[tokio::test]
    async fn interceptors_run_in_order() {
        let chain = InterceptorChain::new()
            .with_request(Arc::new(Tag("first")))
            .with_request(Arc::new(Tag("second")));

        let request = Request::builder()
            .uri("http://a.com/")
            .body(Body::empty())
            .unwrap();
        let request = chain.process_request(request).await;

        let seen: Vec<_> = request
            .headers()
            .get_all("x-seen")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(seen, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn empty_chain_passes_through() {
        let chain = InterceptorChain::new();
        let response = Response::builder().status(404).body(Body::empty()).unwrap();
        assert_eq!(chain.process_response(response).await.status(), 404);
    }
}
