// Copyright 2026 enecoQ Fetch Contributors
// SPDX-License-Identifier: Apache-2.0

//! enecoQ power-data fetcher library.
//!
//! Retrieves electricity usage, cost and CO2-emission figures for a
//! household account by driving the portal's authenticated UI through a
//! headless browser. The browser sits behind the `driver` capability
//! traits, so the whole pipeline also runs against the in-memory fake.

pub mod auth;
pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod retry;
