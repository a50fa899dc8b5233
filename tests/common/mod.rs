#![allow(dead_code)]

use airq_chords::{AirqError, Result, Transport};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use url::Url;

/// Decides whether an attempt on a given address succeeds.
pub type Verdict = Box<dyn Fn(&Url, usize) -> bool + Send + Sync>;

/// Transport that records every attempt and answers from a script.
///
/// The script receives the address and how many times that address has been
/// attempted before.
pub struct ScriptedTransport {
    verdict: Verdict,
    attempts: Mutex<Vec<(Url, bool)>>,
}

impl ScriptedTransport {
    pub fn new(verdict: impl Fn(&Url, usize) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            verdict: Box::new(verdict),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn always_ok() -> Arc<Self> {
        Self::new(|_, _| true)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(|_, _| false)
    }

    /// Every attempt so far, with its outcome.
    pub fn attempts(&self) -> Vec<(Url, bool)> {
        self.attempts.lock().unwrap().clone()
    }

    /// Addresses the endpoint accepted, in order.
    pub fn delivered(&self) -> Vec<Url> {
        self.attempts()
            .into_iter()
            .filter(|(_, ok)| *ok)
            .map(|(uri, _)| uri)
            .collect()
    }

    pub fn attempts_for(&self, needle: &str) -> usize {
        self.attempts()
            .iter()
            .filter(|(uri, _)| uri.as_str().contains(needle))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, uri: &Url) -> Result<()> {
        let mut attempts = self.attempts.lock().unwrap();
        let previous = attempts.iter().filter(|(u, _)| u == uri).count();
        let ok = (self.verdict)(uri, previous);
        attempts.push((uri.clone(), ok));
        if ok {
            Ok(())
        } else {
            Err(AirqError::transport_error("scripted failure"))
        }
    }
}

/// Transport whose requests never complete.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn submit(&self, _uri: &Url) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub fn uri(name: &str) -> Url {
    Url::parse(&format!("http://portal.test/measurements/url_create?instrument_id=1&id={}", name))
        .unwrap()
}
