//! Visitor sessions, tracked by cookie.
//!
//! A visitor counts once: the first `/visitor-count` request without a known
//! session cookie registers a new session and bumps the counter, every later
//! request carrying that cookie only reads it. Sessions live in memory and
//! expire after a period without visits, so a returning visitor is counted
//! again after a long absence or a restart.

use axum::http::{header, HeaderMap, HeaderValue};
use dashmap::DashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sharebox_session";

/// Idle time after which a session is forgotten: 30 minutes.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Outcome of presenting a (possibly missing) session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub token: String,
    /// True if the token was issued by this visit.
    pub is_new: bool,
}

/// Concurrent set of issued session tokens with their last visit.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Instant>,
    idle_timeout: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Look up `presented`, or issue a fresh token if it is missing, unknown
    /// or expired.
    pub fn visit(&self, presented: Option<&str>) -> Visit {
        self.visit_at(presented, Instant::now())
    }

    /// [`SessionRegistry::visit`] with an explicit clock.
    pub fn visit_at(&self, presented: Option<&str>, now: Instant) -> Visit {
        self.sweep_if_due(now);

        if let Some(token) = presented {
            if let Some(mut last_seen) = self.sessions.get_mut(token) {
                if !self.expired(*last_seen, now) {
                    *last_seen = now;
                    return Visit {
                        token: token.to_string(),
                        is_new: false,
                    };
                }
            }
            self.sessions.remove(token);
        }

        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), now);
        tracing::debug!(session_id = %token, "new visitor session");
        Visit {
            token,
            is_new: true,
        }
    }

    /// Drop a token, e.g. when its first visit could not be counted.
    pub fn forget(&self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session idle for longer than the timeout. Returns how
    /// many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, last_seen| !self.expired(*last_seen, now));
        before.saturating_sub(self.sessions.len())
    }

    fn expired(&self, last_seen: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_seen) >= self.idle_timeout
    }

    /// Sweep at most once per timeout period.
    fn sweep_if_due(&self, now: Instant) {
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last_sweep) < self.idle_timeout {
                return;
            }
            *last_sweep = now;
        }
        let removed = self.sweep(now);
        if removed > 0 {
            tracing::debug!("expired {} idle sessions", removed);
        }
    }
}

/// Session token from the request's `Cookie` headers.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value that hands `token` to the browser.
pub fn set_cookie(token: &str) -> Option<HeaderValue> {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token);
    HeaderValue::from_str(&cookie).ok()
}
