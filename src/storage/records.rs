// ABOUTME: Record trait implementations binding each persisted model to its keys and filters
// ABOUTME: Token-like rows are keyed by digest; device codes also expose the user code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;
use warden_core::models::{AccessToken, AuthorizationCode, ClientRecord, DeviceCode, RefreshToken};

use super::{Record, RecordFilter};

fn matches_common(
    filter: &RecordFilter,
    client_id: &str,
    user_id: Option<&str>,
    active: impl FnOnce(DateTime<Utc>) -> bool,
) -> bool {
    filter.client_id.as_deref().is_none_or(|wanted| wanted == client_id)
        && filter
            .user_id
            .as_ref()
            .is_none_or(|wanted| wanted.as_deref() == user_id)
        && filter.active_at.is_none_or(active)
}

impl Record for ClientRecord {
    const KIND: &'static str = "client";

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.client_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.stamp.created_at
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.refresh_token_id.is_none()
            && filter.alternate_key.is_none()
            && matches_common(filter, &self.client_id, Some(&self.owner_id), |now| {
                self.enabled && !self.is_expired(now)
            })
    }
}

impl Record for AccessToken {
    const KIND: &'static str = "access_token";

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.token_digest
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.stamp.created_at
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.alternate_key.is_none()
            && filter
                .refresh_token_id
                .is_none_or(|wanted| self.refresh_token_id == Some(wanted))
            && matches_common(filter, &self.client_id, self.user_id.as_deref(), |now| {
                self.is_active(now)
            })
    }
}

impl Record for RefreshToken {
    const KIND: &'static str = "refresh_token";

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.token_digest
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.stamp.created_at
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.alternate_key.is_none()
            && filter.refresh_token_id.is_none()
            && matches_common(filter, &self.client_id, self.user_id.as_deref(), |now| {
                self.is_active(now)
            })
    }
}

impl Record for AuthorizationCode {
    const KIND: &'static str = "authorization_code";

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.code_digest
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.stamp.created_at
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.alternate_key.is_none()
            && filter.refresh_token_id.is_none()
            && matches_common(filter, &self.client_id, Some(&self.user_id), |now| {
                self.is_redeemable(now)
            })
    }
}

impl Record for DeviceCode {
    const KIND: &'static str = "device_code";

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> &str {
        &self.device_code_digest
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.stamp.created_at
    }

    fn matches(&self, filter: &RecordFilter) -> bool {
        filter.refresh_token_id.is_none()
            && filter
                .alternate_key
                .as_deref()
                .is_none_or(|wanted| wanted == self.user_code)
            && matches_common(filter, &self.client_id, self.user_id.as_deref(), |now| {
                self.consumed_at.is_none() && !self.is_expired(now)
            })
    }
}
