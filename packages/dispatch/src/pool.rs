//! Endpoint pool and selection strategies.
//!
//! Every dispatch draws one endpoint from the pool. The pool tracks how many
//! requests each endpoint is serving and, when a breaker is configured,
//! temporarily skips endpoints that keep failing:
//!
//! ```text
//!            ┌───────────────┐   candidates   ┌───────────────────┐
//! acquire -> │ breaker filter│ ─────────────> │ SelectionStrategy │ -> Lease
//!            └───────────────┘ (all if none   └───────────────────┘
//!                               are closed)
//! ```
//!
//! A [`Lease`] keeps the endpoint's in-flight count raised until it is
//! dropped, and reports success or failure back to the breaker.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};
use url::Url;

use crate::error::{DispatchError, Result};

/// One compute endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse an endpoint base URL. A trailing slash is added so relative
    /// API paths join below it.
    pub fn parse(url: &str) -> std::result::Result<Self, url::ParseError> {
        let mut url = Url::parse(url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// A selectable endpoint as seen by a [`SelectionStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub endpoint: &'a Endpoint,
    pub in_flight: usize,
}

/// Chooses one endpoint among the candidates for a request.
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// Return an index into `candidates`, which is never empty.
    fn select(&self, candidates: &[Candidate<'_>]) -> usize;
}

/// Uniformly random choice.
#[derive(Debug, Default)]
pub struct Random;

impl SelectionStrategy for Random {
    fn select(&self, candidates: &[Candidate<'_>]) -> usize {
        rand::thread_rng().gen_range(0..candidates.len())
    }
}

/// Cycles through the candidates in order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[Candidate<'_>]) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % candidates.len()
    }
}

/// Picks the candidate with the fewest in-flight requests; ties go to the
/// earliest.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl SelectionStrategy for LeastLoaded {
    fn select(&self, candidates: &[Candidate<'_>]) -> usize {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.in_flight)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Circuit breaker settings.
///
/// After `failure_threshold` consecutive failures an endpoint is skipped for
/// `cool_down`. If every endpoint is open, selection falls back to all of
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl BreakerState {
    fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug)]
struct Slot {
    endpoint: Endpoint,
    in_flight: AtomicUsize,
    breaker: Mutex<BreakerState>,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    strategy: Box<dyn SelectionStrategy>,
    breaker: Option<BreakerConfig>,
}

/// Non-empty set of endpoints. Cheap to clone; clones share load and
/// breaker state.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    inner: Arc<PoolInner>,
}

impl EndpointPool {
    /// Pool with [`Random`] selection and no breaker.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        Self::with_strategy(endpoints, Random)
    }

    pub fn with_strategy(
        endpoints: Vec<Endpoint>,
        strategy: impl SelectionStrategy + 'static,
    ) -> Result<Self> {
        Self::build(endpoints, Box::new(strategy), None)
    }

    /// Pool whose endpoints are skipped for a while after repeated failures.
    pub fn with_strategy_and_breaker(
        endpoints: Vec<Endpoint>,
        strategy: impl SelectionStrategy + 'static,
        breaker: BreakerConfig,
    ) -> Result<Self> {
        Self::build(endpoints, Box::new(strategy), Some(breaker))
    }

    fn build(
        endpoints: Vec<Endpoint>,
        strategy: Box<dyn SelectionStrategy>,
        breaker: Option<BreakerConfig>,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(DispatchError::EmptyPool);
        }
        let slots = endpoints
            .into_iter()
            .map(|endpoint| Slot {
                endpoint,
                in_flight: AtomicUsize::new(0),
                breaker: Mutex::new(BreakerState::default()),
            })
            .collect();
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                strategy,
                breaker,
            }),
        })
    }

    /// Parse each URL into an [`Endpoint`].
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self> {
        let endpoints = urls
            .iter()
            .map(|u| Endpoint::parse(u.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(endpoints)
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.inner.slots.iter().map(|s| &s.endpoint)
    }

    pub fn breaker(&self) -> Option<&BreakerConfig> {
        self.inner.breaker.as_ref()
    }

    /// Requests currently leased against `endpoint`.
    pub fn in_flight(&self, endpoint: &Endpoint) -> usize {
        self.inner
            .slots
            .iter()
            .find(|s| &s.endpoint == endpoint)
            .map(|s| s.in_flight.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Choose an endpoint without leasing it.
    pub fn select(&self) -> Endpoint {
        self.inner.slots[self.pick()].endpoint.clone()
    }

    /// Choose an endpoint and hold it for the duration of one request.
    pub fn acquire(&self) -> Lease {
        let index = self.pick();
        self.inner.slots[index]
            .in_flight
            .fetch_add(1, Ordering::SeqCst);
        Lease {
            inner: Arc::clone(&self.inner),
            index,
        }
    }

    fn pick(&self) -> usize {
        let slots = &self.inner.slots;
        if slots.len() == 1 {
            return 0;
        }

        let now = Instant::now();
        let mut indices: Vec<usize> = match self.inner.breaker {
            Some(_) => (0..slots.len())
                .filter(|&i| !slots[i].breaker.lock().is_open(now))
                .collect(),
            None => Vec::new(),
        };
        if indices.is_empty() {
            indices = (0..slots.len()).collect();
        }

        let candidates: Vec<Candidate<'_>> = indices
            .iter()
            .map(|&i| Candidate {
                endpoint: &slots[i].endpoint,
                in_flight: slots[i].in_flight.load(Ordering::SeqCst),
            })
            .collect();
        let chosen = self.inner.strategy.select(&candidates);
        indices[chosen.min(indices.len() - 1)]
    }
}

/// An endpoint held for one request.
#[derive(Debug)]
pub struct Lease {
    inner: Arc<PoolInner>,
    index: usize,
}

impl Lease {
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.slots[self.index].endpoint
    }

    /// The endpoint answered.
    pub fn succeeded(&self) {
        if self.inner.breaker.is_some() {
            let mut state = self.inner.slots[self.index].breaker.lock();
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    /// The endpoint could not be reached or returned garbage.
    pub fn failed(&self) {
        let Some(config) = &self.inner.breaker else {
            return;
        };
        let slot = &self.inner.slots[self.index];
        let mut state = slot.breaker.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= config.failure_threshold {
            state.open_until = Some(Instant::now() + config.cool_down);
            warn!(
                endpoint = %slot.endpoint,
                failures = state.consecutive_failures,
                "opening circuit breaker"
            );
        } else {
            debug!(
                endpoint = %slot.endpoint,
                failures = state.consecutive_failures,
                "endpoint failure"
            );
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.inner.slots[self.index]
            .in_flight
            .fetch_sub(1, Ordering::SeqCst);
    }
}
