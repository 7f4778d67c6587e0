use uuid::Uuid;

/// Runtime context for a single AI request
///
/// Carries the caller identity and the endpoint path through the
/// dispatch and usage-recording flows. Authentication happens upstream
/// (the platform gateway validates the JWT); by the time a request
/// reaches this service the caller is reduced to an optional user id.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id assigned to this request, echoed into usage logs
    pub request_id: String,
    /// Authenticated caller, `None` for system-scope calls
    pub user_id: Option<i64>,
    /// Request path as received (e.g. `/api/ai/summary`)
    pub endpoint: String,
}

impl RequestContext {
    /// Create a context for an incoming request
    pub fn new(user_id: Option<i64>, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id,
            endpoint: endpoint.into(),
        }
    }

    /// Create a minimal context for embedded (non-HTTP) use
    pub fn empty() -> Self {
        Self::new(None, "/")
    }
}
