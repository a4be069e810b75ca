use crate::admission::{AdmissionGate, RequestContext};
use crate::error::AdmissionError;
use crate::rate_limit::store::CounterStore;
use crate::telemetry::{NullSink, TelemetrySink};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that runs an [`AdmissionGate`] check for one operation before
/// the wrapped service sees the request.
///
/// Requests expose their admission context through
/// `AsRef<RequestContext>`; transport adapters typically carry it in an
/// extension or a small wrapper struct.
pub struct AdmissionLayer<S, T = NullSink> {
    gate: Arc<AdmissionGate<S, T>>,
    operation: Arc<str>,
}

impl<S, T> Clone for AdmissionLayer<S, T> {
    fn clone(&self) -> Self {
        Self { gate: self.gate.clone(), operation: self.operation.clone() }
    }
}

impl<S, T> AdmissionLayer<S, T> {
    pub fn new(gate: Arc<AdmissionGate<S, T>>, operation: impl Into<String>) -> Self {
        Self { gate, operation: Arc::from(operation.into()) }
    }
}

impl<Svc, S, T> Layer<Svc> for AdmissionLayer<S, T> {
    type Service = AdmissionService<Svc, S, T>;

    fn layer(&self, service: Svc) -> Self::Service {
        AdmissionService {
            inner: service,
            gate: self.gate.clone(),
            operation: self.operation.clone(),
        }
    }
}

/// Middleware service produced by [`AdmissionLayer`].
pub struct AdmissionService<Svc, S, T = NullSink> {
    inner: Svc,
    gate: Arc<AdmissionGate<S, T>>,
    operation: Arc<str>,
}

impl<Svc: Clone, S, T> Clone for AdmissionService<Svc, S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: self.gate.clone(),
            operation: self.operation.clone(),
        }
    }
}

impl<Svc, S, T, Req> Service<Req> for AdmissionService<Svc, S, T>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Error: Send + 'static,
    S: CounterStore + 'static,
    T: TelemetrySink,
    Req: AsRef<RequestContext> + Send + 'static,
{
    type Response = Svc::Response;
    type Error = AdmissionError<Svc::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Keep the instance that was polled ready; leave a fresh clone behind.
        let fresh = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, fresh);
        let gate = self.gate.clone();
        let operation = self.operation.clone();
        let ctx = req.as_ref().clone();

        async move {
            gate.check(&operation, &ctx).await?;
            inner.call(req).await.map_err(AdmissionError::Inner)
        }
        .boxed()
    }
}
