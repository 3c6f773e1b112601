//! Constructor overrides.
//!
//! `init_with` constructors accept an [`InitOptions`] carrying an optional
//! pre-built backend client and an optional logging span. An injected client
//! replaces the one the adapter would build from its credential settings, so
//! the credential key is no longer required. One client may be shared by
//! several adapters through the `Arc`.

use std::sync::Arc;
use tracing::Span;

/// Optional construction-time overrides for an adapter whose backend client
/// implements `C`.
pub struct InitOptions<C: ?Sized> {
    client: Option<Arc<C>>,
    span: Option<Span>,
}

impl<C: ?Sized> Default for InitOptions<C> {
    fn default() -> Self {
        Self {
            client: None,
            span: None,
        }
    }
}

impl<C: ?Sized> InitOptions<C> {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given backend client instead of building one from config.
    #[must_use]
    pub fn with_client(mut self, client: Arc<C>) -> Self {
        self.client = Some(client);
        self
    }

    /// Emits the adapter's diagnostics inside the given span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub(crate) fn into_parts(self) -> (Option<Arc<C>>, Option<Span>) {
        (self.client, self.span)
    }
}
