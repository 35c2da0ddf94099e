// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! System configuration. Every option has a default, so a config file
//! (or the calling layer) only names what it overrides.

use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

fn default_ca_dir() -> PathBuf {
    PathBuf::from("data/ca")
}
fn default_certs_dir() -> PathBuf {
    PathBuf::from("data/certs")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/attendance.db")
}
fn default_organization() -> String {
    "College".to_string()
}
fn default_ca_validity_days() -> u32 {
    3650
}
fn default_student_validity_days() -> u32 {
    365
}
fn default_door_validity_days() -> u32 {
    1825
}
fn default_rsa_bits() -> usize {
    2048
}
fn default_challenge_ttl_seconds() -> u64 {
    30
}
fn default_nonce_window_seconds() -> u64 {
    300
}
fn default_crl_validity_days() -> u64 {
    7
}

/// Recognized configuration options.
#[derive(Clone, Debug, Deserialize)]
pub struct SystemConfig {
    /// Directory holding the CA key, CA certificate, registry and CRL.
    #[serde(default = "default_ca_dir")]
    pub ca_dir: PathBuf,
    /// Directory receiving issued end-entity material, one subdirectory
    /// per kind and subject.
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,
    /// SQLite database holding authorizations and attendance records.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Organization baked into every issued subject DN.
    #[serde(default = "default_organization")]
    pub organization: String,
    /// CA certificate lifetime.
    #[serde(default = "default_ca_validity_days")]
    pub ca_validity_days: u32,
    /// Student end-entity lifetime.
    #[serde(default = "default_student_validity_days")]
    pub student_validity_days: u32,
    /// Door end-entity lifetime.
    #[serde(default = "default_door_validity_days")]
    pub door_validity_days: u32,
    /// Key size for all generated keys.
    #[serde(default = "default_rsa_bits")]
    pub rsa_bits: usize,
    /// Max age of a pending challenge.
    #[serde(default = "default_challenge_ttl_seconds")]
    pub challenge_ttl_seconds: u64,
    /// Seen-nonce retention window.
    #[serde(default = "default_nonce_window_seconds")]
    pub nonce_window_seconds: u64,
    /// Offset of the CRL nextUpdate from its thisUpdate.
    #[serde(default = "default_crl_validity_days")]
    pub crl_validity_days: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::for_data_dir("data")
    }
}

impl SystemConfig {
    /// Config rooted at `base`, mirroring the standard deployment layout
    /// (`<base>/ca`, `<base>/certs`, `<base>/attendance.db`).
    pub fn for_data_dir(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        SystemConfig {
            ca_dir: base.join("ca"),
            certs_dir: base.join("certs"),
            db_path: base.join("attendance.db"),
            organization: default_organization(),
            ca_validity_days: default_ca_validity_days(),
            student_validity_days: default_student_validity_days(),
            door_validity_days: default_door_validity_days(),
            rsa_bits: default_rsa_bits(),
            challenge_ttl_seconds: default_challenge_ttl_seconds(),
            nonce_window_seconds: default_nonce_window_seconds(),
            crl_validity_days: default_crl_validity_days(),
        }
    }

    /// Challenge time-to-live as a duration.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::seconds(self.challenge_ttl_seconds as i64)
    }

    /// Seen-nonce retention window as a duration.
    pub fn nonce_window(&self) -> Duration {
        Duration::seconds(self.nonce_window_seconds as i64)
    }

    /// CRL validity as a duration.
    pub fn crl_validity(&self) -> Duration {
        Duration::days(self.crl_validity_days as i64)
    }
}
