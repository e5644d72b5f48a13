// ABOUTME: Command modules for warden-cli
// ABOUTME: Registry inspection and client secret tooling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod registry;
pub mod secrets;
