// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Exponential backoff, used anywhere a suspension point (a wait primitive,
//! a reconnect) needs to retry without hammering the collaborator on the
//! other end.

use std::future::Future;
use std::time::Duration;

use tokio_stream::Stream;

/// A retry policy: exponential backoff from `initial_backoff`, doubling
/// each attempt, clamped to `max_backoff`, optionally bounded by
/// `max_tries`.
#[derive(Clone, Copy, Debug)]
pub struct Retry {
    initial_backoff: Duration,
    max_backoff: Duration,
    max_tries: Option<usize>,
}

impl Default for Retry {
    fn default() -> Retry {
        Retry {
            initial_backoff: Duration::from_millis(125),
            max_backoff: Duration::MAX,
            max_tries: None,
        }
    }
}

impl Retry {
    pub fn clamp_backoff(mut self, max_backoff: Duration) -> Retry {
        self.max_backoff = max_backoff;
        self
    }

    pub fn initial_backoff(mut self, initial_backoff: Duration) -> Retry {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn max_tries(mut self, max_tries: usize) -> Retry {
        self.max_tries = Some(max_tries);
        self
    }

    /// Turns this policy into a [`Stream`] of delays: awaiting the `n`th
    /// item from the stream sleeps for the `n`th backoff. Callers loop
    /// `retry.next().await` between attempts, as
    /// `RehydrationTask::step_rehydrate` does.
    pub fn into_retry_stream(self) -> RetryStream {
        RetryStream {
            policy: self,
            next_backoff: self.initial_backoff,
            tries: 0,
        }
    }
}

#[derive(Debug)]
pub struct RetryStream {
    policy: Retry,
    next_backoff: Duration,
    tries: usize,
}

impl Stream for RetryStream {
    type Item = Duration;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(max_tries) = this.policy.max_tries {
            if this.tries >= max_tries {
                return std::task::Poll::Ready(None);
            }
        }
        let delay = this.next_backoff;
        this.tries += 1;
        this.next_backoff = (this.next_backoff * 2).min(this.policy.max_backoff);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        match sleep.poll(cx) {
            std::task::Poll::Ready(()) => std::task::Poll::Ready(Some(delay)),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn retry_stream_doubles_and_clamps() {
        let mut retry = Retry::default()
            .initial_backoff(Duration::from_millis(1))
            .clamp_backoff(Duration::from_millis(4))
            .max_tries(5)
            .into_retry_stream();
        let mut delays = Vec::new();
        while let Some(d) = retry.next().await {
            delays.push(d);
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1),
                Duration::from_millis(2),
                Duration::from_millis(4),
                Duration::from_millis(4),
                Duration::from_millis(4),
            ]
        );
    }
}
