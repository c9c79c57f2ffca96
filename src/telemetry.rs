use tracing::Span;

/// Parent for a service operation span: the caller's span when there is one
/// (the per-request span under `TraceLayer`), otherwise the service's own span.
pub(crate) fn operation_parent(service: &Span) -> Span {
    let current = Span::current();
    if current.is_none() {
        service.clone()
    } else {
        current
    }
}
