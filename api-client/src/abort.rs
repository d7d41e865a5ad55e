//! Deadline and cancellation shared by every step of one exchange.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// When an exchange should be abandoned.
///
/// Created once per request, then carried by the [`Response`](crate::Response)
/// so reading the body is bounded by the same deadline and token as waiting
/// for the headers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Abort {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<CancellationToken>,
}

impl Abort {
    /// Start the clock for `timeout`, if there is one.
    pub(crate) fn new(timeout: Option<Duration>, cancel: Option<CancellationToken>) -> Self {
        Self {
            deadline: timeout.map(|timeout| (Instant::now() + timeout, timeout)),
            cancel,
        }
    }

    /// Run `step`, failing with [`Error::Cancelled`] or [`Error::TimedOut`]
    /// if the token fires or the deadline passes first.
    pub(crate) async fn guard<T, F>(&self, step: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let timed = async {
            match self.deadline {
                Some((deadline, timeout)) => tokio::time::timeout_at(deadline, step)
                    .await
                    .map_err(|_| Error::TimedOut(timeout))?,
                None => step.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = timed => result,
                }
            }
            None => timed.await,
        }
    }
}
