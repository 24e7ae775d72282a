use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use tracing::{debug, trace};

use crate::api::{ApiClient, ApiError, Resource};
use crate::domain::{PharmError, Record};
use crate::session::Session;

/// Shared flag telling a worker its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished request hands back to the model.
#[derive(Debug)]
pub enum Payload {
    Rows(Resource, Vec<Record>),
    Fetched(Resource, Record),
    Saved(Resource, Record),
    Deleted(Resource, i64),
    Sections(Vec<Record>),
    Stats(Record),
    Settings(Record),
    LoggedIn(Session),
    User(Record),
    Uploaded(String),
    BackupCreated(Option<String>),
    BackupSaved(PathBuf),
}

/// Reads can be dropped silently, failed writes must be shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Read,
    Write,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub label: String,
    pub intent: Intent,
    pub result: Result<Payload, ApiError>,
}

struct Delivery {
    token: CancelToken,
    outcome: FetchOutcome,
}

/// Runs blocking api calls off the ui thread.
pub struct Fetcher {
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    in_flight: Vec<(CancelToken, Intent)>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Fetcher {
            tx,
            rx,
            in_flight: Vec::new(),
        }
    }

    pub fn spawn<F>(
        &mut self,
        label: &str,
        intent: Intent,
        client: &ApiClient,
        job: F,
    ) -> Result<CancelToken, PharmError>
    where
        F: FnOnce(&ApiClient) -> Result<Payload, ApiError> + Send + 'static,
    {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let tx = self.tx.clone();
        let client = client.clone();
        let label = label.to_string();
        debug!("Starting request {label}");

        thread::Builder::new()
            .name(format!("fetch-{label}"))
            .spawn(move || {
                let result = job(&client);
                if worker_token.is_cancelled() {
                    trace!("Request {label} finished after cancel");
                }
                // The receiver may be gone on shutdown.
                let _ = tx.send(Delivery {
                    token: worker_token,
                    outcome: FetchOutcome {
                        label,
                        intent,
                        result,
                    },
                });
            })?;

        self.in_flight.push((token.clone(), intent));
        Ok(token)
    }

    /// Drop interest in every outstanding read. Writes always report back.
    pub fn cancel_all(&mut self) {
        let (reads, writes): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|(_, intent)| *intent == Intent::Read);
        if !reads.is_empty() {
            debug!("Cancelling {} reads", reads.len());
        }
        for (token, _) in reads {
            token.cancel();
        }
        self.in_flight = writes;
    }

    /// Finished requests that are still wanted.
    pub fn poll(&mut self) -> Vec<FetchOutcome> {
        let delivered: Vec<Delivery> = self.rx.try_iter().collect();
        let mut outcomes = Vec::with_capacity(delivered.len());
        for delivery in delivered {
            self.in_flight
                .retain(|(t, _)| !Arc::ptr_eq(&t.0, &delivery.token.0));
            if delivery.token.is_cancelled() {
                trace!("Discarding cancelled {}", delivery.outcome.label);
            } else {
                outcomes.push(delivery.outcome);
            }
        }
        outcomes
    }

    pub fn busy(&self) -> bool {
        !self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait(fetcher: &mut Fetcher) -> Vec<FetchOutcome> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut all = Vec::new();
        while fetcher.busy() && Instant::now() < deadline {
            all.extend(fetcher.poll());
            thread::sleep(Duration::from_millis(5));
        }
        all
    }

    fn offline_client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9", None).unwrap()
    }

    #[test]
    fn delivers_results() {
        let mut fetcher = Fetcher::new();
        fetcher
            .spawn("stats", Intent::Read, &offline_client(), |_| {
                Ok(Payload::Deleted(Resource::News, 4))
            })
            .unwrap();
        let outcomes = wait(&mut fetcher);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].label, "stats");
        assert!(matches!(
            outcomes[0].result,
            Ok(Payload::Deleted(Resource::News, 4))
        ));
    }

    #[test]
    fn cancelled_results_are_dropped() {
        let mut fetcher = Fetcher::new();
        let token = fetcher
            .spawn("slow", Intent::Read, &offline_client(), |_| {
                thread::sleep(Duration::from_millis(50));
                Ok(Payload::Rows(Resource::Products, Vec::new()))
            })
            .unwrap();
        fetcher.cancel_all();
        assert!(token.is_cancelled());
        assert!(!fetcher.busy());

        thread::sleep(Duration::from_millis(200));
        assert!(fetcher.poll().is_empty());
    }

    #[test]
    fn writes_survive_cancel_all() {
        let mut fetcher = Fetcher::new();
        let read = fetcher
            .spawn("list", Intent::Read, &offline_client(), |_| {
                thread::sleep(Duration::from_millis(50));
                Ok(Payload::Rows(Resource::News, Vec::new()))
            })
            .unwrap();
        let write = fetcher
            .spawn("delete", Intent::Write, &offline_client(), |_| {
                thread::sleep(Duration::from_millis(50));
                Err(ApiError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            })
            .unwrap();
        fetcher.cancel_all();
        assert!(read.is_cancelled());
        assert!(!write.is_cancelled());
        assert!(fetcher.busy());

        let outcomes = wait(&mut fetcher);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].label, "delete");
        assert_eq!(outcomes[0].intent, Intent::Write);
        assert!(outcomes[0].result.is_err());
    }
}
