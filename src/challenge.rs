// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Challenge generation, lifecycle and replay prevention.
//!
//! A challenge is Pending from creation until it is consumed by a
//! verification or its TTL elapses; both outcomes are terminal. Replay
//! of QR nonces is blocked by a seen-nonce set spanning the configured
//! window. The consume transition runs under one mutex so two racing
//! consumers can never both succeed.

use crate::rand;
use crate::store::{self, Deadline, StoreError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Challenge timestamp format: ISO-8601 UTC, microsecond precision,
/// trailing `Z`. This string participates in the signed canonical bytes,
/// so it is frozen.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Formats a timestamp in the canonical wire form.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a canonical wire timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// Challenges live at microsecond resolution so that formatting the
// stored timestamp reproduces the wire string exactly.
fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_micros(ts.timestamp_micros()).unwrap()
}

/// Challenge lifecycle states. Consumed and Expired are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeState {
    Pending,
    Consumed,
    Expired,
}

/// A server-issued challenge awaiting a signature from the certificate
/// holder.
#[derive(Clone, Debug)]
pub struct Challenge {
    pub challenge_id: String,
    /// Fresh 256-bit nonce, hex-encoded.
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub room_id: String,
    pub door_id: String,
    /// The QR-presented nonce that triggered this challenge.
    pub previous_nonce: String,
    /// Hex serial of the certificate the challenge was issued against.
    pub subject_serial: String,
    pub state: ChallengeState,
}

impl Challenge {
    /// The exact byte sequence the client signs and the verifier hashes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_challenge_bytes(
            &self.nonce,
            self.issued_at,
            &self.room_id,
            &self.door_id,
            &self.previous_nonce,
            &self.challenge_id,
        )
    }
}

/// Builds the canonical challenge serialization: compact JSON with the
/// frozen key order `nonce, timestamp, room_id, door_id, previous_nonce,
/// challenge_id`. The form is written out explicitly rather than derived
/// from a serializer, because any byte-level drift is a wire break.
pub fn canonical_challenge_bytes(
    nonce: &str,
    timestamp: DateTime<Utc>,
    room_id: &str,
    door_id: &str,
    previous_nonce: &str,
    challenge_id: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(256);
    out.push('{');
    push_field(&mut out, "nonce", nonce);
    out.push(',');
    push_field(&mut out, "timestamp", &format_timestamp(timestamp));
    out.push(',');
    push_field(&mut out, "room_id", room_id);
    out.push(',');
    push_field(&mut out, "door_id", door_id);
    out.push(',');
    push_field(&mut out, "previous_nonce", previous_nonce);
    out.push(',');
    push_field(&mut out, "challenge_id", challenge_id);
    out.push('}');
    out.into_bytes()
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push('"');
    out.push_str(key);
    out.push_str("\":");
    // serde_json is used for string escaping only; structure and order
    // are fixed above.
    out.push_str(&serde_json::to_string(value).expect("string escaping cannot fail"));
}

/// Challenge failures.
#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("presented QR nonce was already used within the replay window")]
    ReplayedQr,
    #[error("challenge is unknown")]
    UnknownChallenge,
    #[error("challenge was already consumed")]
    AlreadyConsumed,
    #[error("challenge has expired")]
    ChallengeExpired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct State {
    // nonce -> challenge, live until swept.
    challenges: HashMap<String, Challenge>,
    // nonce -> first-seen time, entries age out at the window boundary.
    seen: HashMap<String, DateTime<Utc>>,
}

/// Issues challenges and enforces nonce uniqueness, TTL and replay
/// rejection.
#[derive(Debug)]
pub struct ChallengeRegistry {
    ttl: Duration,
    nonce_window: Duration,
    inner: Mutex<State>,
}

impl ChallengeRegistry {
    pub fn new(ttl: Duration, nonce_window: Duration) -> Self {
        Self {
            ttl,
            nonce_window,
            inner: Mutex::new(State::default()),
        }
    }

    /// Creates a Pending challenge for a validated subject.
    ///
    /// Rejects immediately when `previous_nonce` was already seen within
    /// the replay window. Both the presented nonce and the fresh one are
    /// recorded as seen before the challenge is returned.
    pub fn generate(
        &self,
        subject_serial: &str,
        room_id: &str,
        door_id: &str,
        previous_nonce: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<Challenge, ChallengeError> {
        let mut state = store::lock(&self.inner, deadline)?;
        if state.seen.contains_key(previous_nonce) {
            return Err(ChallengeError::ReplayedQr);
        }
        state.seen.insert(previous_nonce.to_string(), now);

        // Collisions with a live or seen nonce are astronomically rare;
        // the retry loop exists so uniqueness is a guarantee, not a
        // probability.
        let nonce = loop {
            let candidate = rand::nonce();
            if !state.challenges.contains_key(&candidate) && !state.seen.contains_key(&candidate) {
                break candidate;
            }
        };

        let challenge = Challenge {
            challenge_id: Uuid::new_v4().to_string(),
            nonce: nonce.clone(),
            issued_at: truncate_micros(now),
            room_id: room_id.to_string(),
            door_id: door_id.to_string(),
            previous_nonce: previous_nonce.to_string(),
            subject_serial: subject_serial.to_string(),
            state: ChallengeState::Pending,
        };
        state.seen.insert(nonce.clone(), now);
        state.challenges.insert(nonce, challenge.clone());
        Ok(challenge)
    }

    /// Atomically consumes a Pending challenge: exactly one caller gets
    /// the Consumed record, every other outcome is a classified failure.
    /// A TTL overrun performs the Pending to Expired transition before
    /// reporting it.
    pub fn consume(
        &self,
        nonce: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<Challenge, ChallengeError> {
        let ttl = self.ttl;
        let mut state = store::lock(&self.inner, deadline)?;
        let challenge = state
            .challenges
            .get_mut(nonce)
            .ok_or(ChallengeError::UnknownChallenge)?;

        match challenge.state {
            ChallengeState::Consumed => Err(ChallengeError::AlreadyConsumed),
            ChallengeState::Expired => Err(ChallengeError::ChallengeExpired),
            ChallengeState::Pending => {
                if now - challenge.issued_at > ttl {
                    challenge.state = ChallengeState::Expired;
                    return Err(ChallengeError::ChallengeExpired);
                }
                challenge.state = ChallengeState::Consumed;
                Ok(challenge.clone())
            }
        }
    }

    /// Garbage collection: expires overdue Pending challenges, drops
    /// terminal challenges older than the nonce window and ages out
    /// seen-nonce entries at exactly the window boundary. Returns the
    /// number of entries removed.
    pub fn sweep(&self, now: DateTime<Utc>, deadline: Deadline) -> Result<usize, StoreError> {
        let (ttl, window) = (self.ttl, self.nonce_window);
        let mut state = store::lock(&self.inner, deadline)?;

        for challenge in state.challenges.values_mut() {
            if challenge.state == ChallengeState::Pending && now - challenge.issued_at > ttl {
                challenge.state = ChallengeState::Expired;
            }
        }

        let before = state.challenges.len() + state.seen.len();
        state.challenges.retain(|_, c| {
            c.state == ChallengeState::Pending || now - c.issued_at < window
        });
        state.seen.retain(|_, seen_at| now - *seen_at < window);
        Ok(before - (state.challenges.len() + state.seen.len()))
    }

    /// Looks up a challenge by nonce without touching its state.
    pub fn get(&self, nonce: &str, deadline: Deadline) -> Result<Option<Challenge>, StoreError> {
        let state = store::lock(&self.inner, deadline)?;
        Ok(state.challenges.get(nonce).cloned())
    }
}
