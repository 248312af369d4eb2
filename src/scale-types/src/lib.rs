// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The data model for the replica right-sizing controller.
//!
//! This crate is intentionally free of any I/O: it defines the shapes that
//! the rule engine in `scale-core` reasons about (clusters, nodes, rules,
//! predicates) plus the process [`config::Config`]. Persistence, discovery,
//! and the cloud/DNS/probe collaborators live behind traits in
//! `scale-core`; this crate only describes what they traffic in.

pub mod config;
pub mod model;

pub use config::Config;
pub use model::*;
