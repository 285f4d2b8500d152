use crate::url::template_path;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use tower::{Layer, Service};

/// Tower layer counting and timing the requests sent to the Kubernetes API.
#[derive(Clone)]
pub struct MetricsLayer {
    request_count: Counter<u64>,
    request_duration: Histogram<f64>,
}

impl MetricsLayer {
    pub fn new(meter: &Meter) -> Self {
        Self {
            request_count: meter
                .u64_counter("kubernetes_client_http_requests_total")
                .with_description("Total number of HTTP requests to the Kubernetes API")
                .build(),
            request_duration: meter
                .f64_histogram("kubernetes_client_http_request_duration_seconds")
                .with_description("Kubernetes API request duration in seconds")
                .with_boundaries(vec![0.05, 0.1, 0.5, 1.0])
                .build(),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    layer: MetricsLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let endpoint = url_escape::encode_path(&template_path(req.uri().path())).to_string();
        let method = req.method().to_string();
        MetricsFuture {
            future: self.inner.call(req),
            method,
            endpoint,
            start: Instant::now(),
            layer: self.layer.clone(),
        }
    }
}

#[pin_project::pin_project]
pub struct MetricsFuture<F> {
    #[pin]
    future: F,
    method: String,
    endpoint: String,
    start: Instant,
    layer: MetricsLayer,
}

impl<F, ResBody, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = this.future.poll(cx);
        if let Poll::Ready(outcome) = &result {
            let status = match outcome {
                Ok(response) => response.status().as_str().to_string(),
                Err(_) => "error".to_string(),
            };
            let endpoint = KeyValue::new("endpoint", this.endpoint.clone());
            let method = KeyValue::new("method", this.method.clone());
            this.layer.request_count.add(
                1,
                &[
                    KeyValue::new("status", status),
                    method.clone(),
                    endpoint.clone(),
                ],
            );
            this.layer
                .request_duration
                .record(this.start.elapsed().as_secs_f64(), &[method, endpoint]);
        }
        result
    }
}
