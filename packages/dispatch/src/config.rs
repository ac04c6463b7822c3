use std::time::Duration;

/// Default per-call probability of cross-checking a remote result locally.
pub const DEFAULT_VERIFY_PROBABILITY: f64 = 0.1;

/// How a package reaches the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestForm {
    /// Store the package and send its address and key.
    #[default]
    Reference,
    /// Embed the package in the request.
    Inline,
}

/// Configuration for a [`DispatchClient`](crate::DispatchClient).
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Bound on one dispatch, from the store upload to the endpoint's answer.
    pub timeout: Duration,

    /// Maximum concurrent pipelines in a `map` call.
    pub concurrency: usize,

    /// Probability in `[0, 1]` that a `remote` call is re-executed locally.
    pub verify_probability: f64,

    pub request_form: RequestForm,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            concurrency: 8,
            verify_probability: DEFAULT_VERIFY_PROBABILITY,
            request_form: RequestForm::Reference,
        }
    }
}

impl DispatchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the verification probability. Values outside `[0, 1]` are
    /// clamped; NaN disables verification.
    pub fn with_verify_probability(mut self, probability: f64) -> Self {
        self.verify_probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_request_form(mut self, form: RequestForm) -> Self {
        self.request_form = form;
        self
    }
}
