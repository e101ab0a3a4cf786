use crate::backoff::IntervalFunction;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an error is worth retrying.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry bound, backoff and retryability check for one executor.
pub struct RetryPolicy<E> {
    pub(crate) max_retries: usize,
    pub(crate) interval_fn: Arc<dyn IntervalFunction>,
    pub(crate) retry_predicate: Option<RetryPredicate<E>>,
}

impl<E> RetryPolicy<E> {
    pub fn new(max_retries: usize, interval_fn: Arc<dyn IntervalFunction>) -> Self {
        Self {
            max_retries,
            interval_fn,
            retry_predicate: None,
        }
    }

    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Retries not counting the initial attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Every error is retryable unless a predicate says otherwise.
    pub fn should_retry(&self, error: &E) -> bool {
        match &self.retry_predicate {
            Some(predicate) => predicate(error),
            None => true,
        }
    }

    /// True while another retry fits within the bound.
    pub fn has_retries_left(&self, retries_done: usize) -> bool {
        retries_done < self.max_retries
    }

    pub fn next_backoff(&self, retry_index: usize) -> Duration {
        self.interval_fn.next_interval(retry_index)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            interval_fn: Arc::clone(&self.interval_fn),
            retry_predicate: self.retry_predicate.clone(),
        }
    }
}
