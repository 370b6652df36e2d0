//! Single-flight access-token refresh.
//!
//! Many requests can fail with an expired token at once. Exactly one
//! refresh exchange may be in flight at any time; every other failed
//! request registers a subscriber and waits for the in-flight exchange to
//! hand out the new token. Subscribers are notified in registration order.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

use crate::http::ApiError;
use crate::runtime::{Page, Runtime};

use super::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, REFRESH_TOKEN_PATH};

/// A queued callback waiting for a fresh access token.
type TokenSubscriber = Box<dyn FnOnce(&str) + Send>;

#[derive(Serialize, Debug)]
struct RefreshRequest<'a> {
    refresh_token: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Coordinates the refresh-token exchange across concurrent failures.
///
/// Owns the in-memory access token, the in-flight flag and the pending
/// subscriber queue. Constructed once per client; fresh instances give
/// tests full isolation.
pub struct RefreshCoordinator {
    client: Client,
    base_url: String,
    runtime: Arc<dyn Runtime>,
    access_token: Mutex<Option<String>>,
    refresh_in_flight: AtomicBool,
    subscribers: Mutex<Vec<TokenSubscriber>>,
}

impl RefreshCoordinator {
    /// Creates a coordinator issuing exchange calls through the given
    /// client against the given base URL.
    pub fn new(client: Client, base_url: String, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            client,
            base_url,
            runtime,
            access_token: Mutex::new(None),
            refresh_in_flight: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Sets the in-memory access token.
    pub fn set_access_token(&self, token: &str) {
        *self.access_token.lock().unwrap() = Some(token.to_string());
    }

    /// Returns the in-memory access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.lock().unwrap().clone()
    }

    /// Returns the token to send with the next request: the in-memory
    /// access token if set, else the persisted one. `None` when neither
    /// source has a value; the absence of a token is not an error here.
    pub fn current_token(&self) -> Option<String> {
        self.access_token()
            .or_else(|| self.runtime.credential(ACCESS_TOKEN_KEY))
    }

    /// Handles one expired-token failure: joins the in-flight refresh
    /// exchange (starting it if none is running) and returns the fresh
    /// access token once available, so the caller can rewrite its
    /// `Authorization` header and re-issue the original request.
    ///
    /// When the exchange fails, every waiter gets back its own `original`
    /// error unchanged; the exchange error itself is only logged.
    #[tracing::instrument(skip(self, original))]
    pub async fn acquire_fresh_token(&self, original: ApiError) -> Result<String> {
        let (tx, rx) = oneshot::channel::<String>();
        self.add_subscriber(Box::new(move |token| {
            let _ = tx.send(token.to_string());
        }));

        // Claim the right to perform the exchange; everyone who loses the
        // claim only waits on the subscriber registered above.
        if !self.refresh_in_flight.swap(true, Ordering::SeqCst) {
            // The flag stays set until the queue has been drained, so a
            // request failing mid-settlement enqueues instead of claiming
            // a second exchange. The guard also releases the flag and the
            // queue if this future is dropped at the await below.
            let _guard = InFlightGuard { coordinator: self };

            match self.exchange().await {
                Ok(tokens) => {
                    // A server context has nowhere durable to keep the
                    // rotated tokens; skip persistence there.
                    if !self.runtime.is_server() {
                        self.set_access_token(&tokens.access_token);
                        if let Err(e) = self
                            .runtime
                            .set_credential(ACCESS_TOKEN_KEY, &tokens.access_token)
                        {
                            warn!("Failed to persist access token: {:#}", e);
                        }
                        if let Err(e) = self
                            .runtime
                            .set_credential(REFRESH_TOKEN_KEY, &tokens.refresh_token)
                        {
                            warn!("Failed to persist refresh token: {:#}", e);
                        }
                    }
                    self.notify_subscribers(&tokens.access_token);
                }
                Err(e) => {
                    warn!("Refresh-token exchange failed: {:#}", e);
                    self.runtime.navigate(Page::SignIn);
                    // The guard abandons the queue on the way out; every
                    // waiter surfaces its own original error.
                    return Err(original.into());
                }
            }
        }

        match rx.await {
            Ok(token) => Ok(token),
            // The in-flight exchange failed and dropped the queue; surface
            // this caller's own triggering error.
            Err(_) => Err(original.into()),
        }
    }

    /// Issues the refresh-token exchange. Goes straight to the transport,
    /// bypassing the response classifier: a failure here must never
    /// re-enter the refresh protocol.
    async fn exchange(&self) -> Result<RefreshResponse> {
        let refresh_token = self.runtime.credential(REFRESH_TOKEN_KEY);
        let url = format!("{}{}", self.base_url, REFRESH_TOKEN_PATH);
        debug!("Exchanging refresh token at {}...", url);

        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.as_deref(),
            })
            .send()
            .await
            .context("Failed to send refresh-token exchange")?;

        let response = response
            .error_for_status()
            .context("Refresh-token exchange rejected")?;

        response
            .json::<RefreshResponse>()
            .await
            .context("Failed to parse refresh-token exchange response")
    }

    fn add_subscriber(&self, subscriber: TokenSubscriber) {
        self.subscribers.lock().unwrap().push(subscriber);
    }

    /// Drains the queue and hands every subscriber the new token, in
    /// registration order.
    fn notify_subscribers(&self, token: &str) {
        let drained = mem::take(&mut *self.subscribers.lock().unwrap());
        debug!(
            "Notifying {} pending request(s) with the refreshed token",
            drained.len()
        );
        for subscriber in drained {
            subscriber(token);
        }
    }

    /// Drops every queued subscriber so each waiter observes the failure
    /// instead of hanging on a token that will never arrive.
    fn abandon_subscribers(&self) {
        let drained = mem::take(&mut *self.subscribers.lock().unwrap());
        if !drained.is_empty() {
            warn!(
                "Abandoning {} pending request(s) after an unsettled refresh",
                drained.len()
            );
        }
    }
}

/// Held by the claimant for the duration of the exchange. On drop it
/// abandons whatever is still queued, then clears the in-flight flag, so
/// the queue is never non-empty while the flag is clear and a claimant
/// dropped mid-exchange cannot starve later failures.
struct InFlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.abandon_subscribers();
        self.coordinator
            .refresh_in_flight
            .store(false, Ordering::SeqCst);
    }
}
