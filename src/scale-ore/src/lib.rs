// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Small utilities shared across the controller, in the spirit of an
//! "extension of the standard library" crate: retry backoff and tracing
//! setup. Kept dependency-light on purpose.

pub mod retry;
pub mod tracing_setup;
