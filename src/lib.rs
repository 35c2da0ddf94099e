// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

// Pull in the README as the package doc
#![doc = include_str!("../README.md")]

pub mod access;
pub mod attendance;
pub mod authz;
pub mod ca;
pub mod challenge;
pub mod config;
pub mod pem;
pub mod rand;
pub mod registry;
pub mod revocation;
pub mod rsa;
pub mod signature;
pub mod store;
pub mod validator;
pub mod x509;

pub use access::{
    AccessError, ChallengeRequest, ChallengeResponse, Core, CoreError, VerifyRequest,
    VerifyResponse,
};
pub use config::SystemConfig;
