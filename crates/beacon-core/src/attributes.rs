// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector-advertised tuning attributes with explicit presence tracking.
//!
//! Every attribute carries its own "sent by the collector" bit. Values of
//! attributes that were not sent come from the preset a builder was started
//! from and must not be mistaken for collector input; use
//! [`ResponseAttributes::is_attribute_set`] or the `*_if_set` accessors when
//! the distinction matters.

use std::fmt;

/// Attributes a collector response may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseAttribute {
    MaxBeaconSize,
    MaxSessionDuration,
    MaxEventsPerSession,
    SessionTimeout,
    SendInterval,
    VisitStoreVersion,
    IsCapture,
    IsCaptureCrashes,
    IsCaptureErrors,
    Multiplicity,
    ServerId,
    Timestamp,
    MonitorName,
}

impl ResponseAttribute {
    pub const ALL: [ResponseAttribute; 13] = [
        ResponseAttribute::MaxBeaconSize,
        ResponseAttribute::MaxSessionDuration,
        ResponseAttribute::MaxEventsPerSession,
        ResponseAttribute::SessionTimeout,
        ResponseAttribute::SendInterval,
        ResponseAttribute::VisitStoreVersion,
        ResponseAttribute::IsCapture,
        ResponseAttribute::IsCaptureCrashes,
        ResponseAttribute::IsCaptureErrors,
        ResponseAttribute::Multiplicity,
        ResponseAttribute::ServerId,
        ResponseAttribute::Timestamp,
        ResponseAttribute::MonitorName,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for ResponseAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseAttribute::MaxBeaconSize => "max-beacon-size",
            ResponseAttribute::MaxSessionDuration => "max-session-duration",
            ResponseAttribute::MaxEventsPerSession => "max-events-per-session",
            ResponseAttribute::SessionTimeout => "session-timeout",
            ResponseAttribute::SendInterval => "send-interval",
            ResponseAttribute::VisitStoreVersion => "visit-store-version",
            ResponseAttribute::IsCapture => "capture",
            ResponseAttribute::IsCaptureCrashes => "capture-crashes",
            ResponseAttribute::IsCaptureErrors => "capture-errors",
            ResponseAttribute::Multiplicity => "multiplicity",
            ResponseAttribute::ServerId => "server-id",
            ResponseAttribute::Timestamp => "timestamp",
            ResponseAttribute::MonitorName => "monitor-name",
        };
        f.write_str(name)
    }
}

/// Compact set of [`ResponseAttribute`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeSet(u16);

impl AttributeSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, attribute: ResponseAttribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    pub fn insert(&mut self, attribute: ResponseAttribute) {
        self.0 |= attribute.bit();
    }

    pub fn union(self, other: AttributeSet) -> AttributeSet {
        AttributeSet(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ResponseAttribute> + '_ {
        ResponseAttribute::ALL
            .into_iter()
            .filter(move |attribute| self.contains(*attribute))
    }
}

/// Immutable set of tuning parameters received from the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAttributes {
    set_attributes: AttributeSet,
    max_beacon_size_in_bytes: i32,
    max_session_duration_in_millis: i32,
    max_events_per_session: i32,
    session_timeout_in_millis: i32,
    send_interval_in_millis: i32,
    visit_store_version: i32,
    capture: bool,
    capture_crashes: bool,
    capture_errors: bool,
    multiplicity: i32,
    server_id: i32,
    timestamp_in_millis: i64,
    monitor_name: Option<String>,
}

/// Preset used by the legacy key-value protocol: `-1` marks "unspecified".
const KEY_VALUE_DEFAULTS: ResponseAttributes = ResponseAttributes {
    set_attributes: AttributeSet::empty(),
    max_beacon_size_in_bytes: -1,
    max_session_duration_in_millis: -1,
    max_events_per_session: -1,
    session_timeout_in_millis: -1,
    send_interval_in_millis: -1,
    visit_store_version: 1,
    capture: true,
    capture_crashes: true,
    capture_errors: true,
    multiplicity: 1,
    server_id: -1,
    timestamp_in_millis: 0,
    monitor_name: None,
};

const JSON_DEFAULTS: ResponseAttributes = ResponseAttributes {
    set_attributes: AttributeSet::empty(),
    max_beacon_size_in_bytes: 150 * 1024,
    max_session_duration_in_millis: 360 * 60 * 1000,
    max_events_per_session: 200,
    session_timeout_in_millis: 600 * 1000,
    send_interval_in_millis: 120 * 1000,
    visit_store_version: 1,
    capture: true,
    capture_crashes: true,
    capture_errors: true,
    multiplicity: 1,
    server_id: 1,
    timestamp_in_millis: 0,
    monitor_name: None,
};

const UNDEFINED_DEFAULTS: ResponseAttributes = ResponseAttributes {
    set_attributes: AttributeSet::empty(),
    max_beacon_size_in_bytes: -1,
    max_session_duration_in_millis: -1,
    max_events_per_session: -1,
    session_timeout_in_millis: -1,
    send_interval_in_millis: -1,
    visit_store_version: -1,
    capture: true,
    capture_crashes: true,
    capture_errors: true,
    multiplicity: 1,
    server_id: -1,
    timestamp_in_millis: 0,
    monitor_name: None,
};

impl ResponseAttributes {
    /// Builder seeded with the legacy key-value protocol defaults.
    pub fn with_key_value_defaults() -> ResponseAttributesBuilder {
        ResponseAttributesBuilder::from_defaults(&KEY_VALUE_DEFAULTS)
    }

    /// Builder seeded with the structured (JSON) protocol defaults.
    pub fn with_json_defaults() -> ResponseAttributesBuilder {
        ResponseAttributesBuilder::from_defaults(&JSON_DEFAULTS)
    }

    /// Builder where nothing is defined; the pre-handshake baseline.
    pub fn with_undefined_defaults() -> ResponseAttributesBuilder {
        ResponseAttributesBuilder::from_defaults(&UNDEFINED_DEFAULTS)
    }

    /// Shorthand for `with_undefined_defaults().build()`.
    pub fn undefined() -> Self {
        UNDEFINED_DEFAULTS.clone()
    }

    /// Whether the collector sent `attribute`.
    pub fn is_attribute_set(&self, attribute: ResponseAttribute) -> bool {
        self.set_attributes.contains(attribute)
    }

    /// Every attribute the collector sent.
    pub fn set_attributes(&self) -> AttributeSet {
        self.set_attributes
    }

    /// Largest beacon the collector accepts; `-1` when unspecified.
    pub fn max_beacon_size_in_bytes(&self) -> i32 {
        self.max_beacon_size_in_bytes
    }

    pub fn max_session_duration_in_millis(&self) -> i32 {
        self.max_session_duration_in_millis
    }

    pub fn max_events_per_session(&self) -> i32 {
        self.max_events_per_session
    }

    pub fn session_timeout_in_millis(&self) -> i32 {
        self.session_timeout_in_millis
    }

    /// Flush interval; `-1` when unspecified.
    pub fn send_interval_in_millis(&self) -> i32 {
        self.send_interval_in_millis
    }

    pub fn visit_store_version(&self) -> i32 {
        self.visit_store_version
    }

    pub fn is_capture(&self) -> bool {
        self.capture
    }

    pub fn is_capture_crashes(&self) -> bool {
        self.capture_crashes
    }

    pub fn is_capture_errors(&self) -> bool {
        self.capture_errors
    }

    pub fn multiplicity(&self) -> i32 {
        self.multiplicity
    }

    /// Server id to address; `-1` when unspecified.
    pub fn server_id(&self) -> i32 {
        self.server_id
    }

    /// Collector timestamp in milliseconds since the epoch.
    pub fn timestamp_in_millis(&self) -> i64 {
        self.timestamp_in_millis
    }

    /// Monitor name, if any value is known.
    pub fn monitor_name(&self) -> Option<&str> {
        self.monitor_name.as_deref()
    }

    pub fn server_id_if_set(&self) -> Option<i32> {
        self.value_if_set(ResponseAttribute::ServerId, self.server_id)
    }

    pub fn send_interval_if_set(&self) -> Option<i32> {
        self.value_if_set(ResponseAttribute::SendInterval, self.send_interval_in_millis)
    }

    pub fn max_beacon_size_if_set(&self) -> Option<i32> {
        self.value_if_set(ResponseAttribute::MaxBeaconSize, self.max_beacon_size_in_bytes)
    }

    pub fn monitor_name_if_set(&self) -> Option<&str> {
        if self.is_attribute_set(ResponseAttribute::MonitorName) {
            self.monitor_name.as_deref()
        } else {
            None
        }
    }

    fn value_if_set<T>(&self, attribute: ResponseAttribute, value: T) -> Option<T> {
        self.is_attribute_set(attribute).then_some(value)
    }

    /// Right-biased merge: every attribute `overlay` marks as set replaces the
    /// value held by `self`; everything else is kept as-is, presence included.
    pub fn merge(&self, overlay: &ResponseAttributes) -> ResponseAttributes {
        let mut builder = ResponseAttributesBuilder::from_defaults(self);

        for attribute in overlay.set_attributes.iter() {
            builder = match attribute {
                ResponseAttribute::MaxBeaconSize => {
                    builder.with_max_beacon_size_in_bytes(overlay.max_beacon_size_in_bytes)
                }
                ResponseAttribute::MaxSessionDuration => builder
                    .with_max_session_duration_in_millis(overlay.max_session_duration_in_millis),
                ResponseAttribute::MaxEventsPerSession => {
                    builder.with_max_events_per_session(overlay.max_events_per_session)
                }
                ResponseAttribute::SessionTimeout => {
                    builder.with_session_timeout_in_millis(overlay.session_timeout_in_millis)
                }
                ResponseAttribute::SendInterval => {
                    builder.with_send_interval_in_millis(overlay.send_interval_in_millis)
                }
                ResponseAttribute::VisitStoreVersion => {
                    builder.with_visit_store_version(overlay.visit_store_version)
                }
                ResponseAttribute::IsCapture => builder.with_capture(overlay.capture),
                ResponseAttribute::IsCaptureCrashes => {
                    builder.with_capture_crashes(overlay.capture_crashes)
                }
                ResponseAttribute::IsCaptureErrors => {
                    builder.with_capture_errors(overlay.capture_errors)
                }
                ResponseAttribute::Multiplicity => builder.with_multiplicity(overlay.multiplicity),
                ResponseAttribute::ServerId => builder.with_server_id(overlay.server_id),
                ResponseAttribute::Timestamp => {
                    builder.with_timestamp_in_millis(overlay.timestamp_in_millis)
                }
                ResponseAttribute::MonitorName => match overlay.monitor_name.as_deref() {
                    Some(name) => builder.with_monitor_name(name),
                    None => builder,
                },
            };
        }

        builder.build()
    }
}

impl Default for ResponseAttributes {
    fn default() -> Self {
        Self::undefined()
    }
}

/// Builder for [`ResponseAttributes`]; every `with_*` call marks its attribute as set.
#[derive(Debug, Clone)]
pub struct ResponseAttributesBuilder {
    attributes: ResponseAttributes,
}

impl ResponseAttributesBuilder {
    fn from_defaults(defaults: &ResponseAttributes) -> Self {
        Self {
            attributes: defaults.clone(),
        }
    }

    fn mark(mut self, attribute: ResponseAttribute) -> Self {
        self.attributes.set_attributes.insert(attribute);
        self
    }

    pub fn with_max_beacon_size_in_bytes(mut self, value: i32) -> Self {
        self.attributes.max_beacon_size_in_bytes = value;
        self.mark(ResponseAttribute::MaxBeaconSize)
    }

    pub fn with_max_session_duration_in_millis(mut self, value: i32) -> Self {
        self.attributes.max_session_duration_in_millis = value;
        self.mark(ResponseAttribute::MaxSessionDuration)
    }

    pub fn with_max_events_per_session(mut self, value: i32) -> Self {
        self.attributes.max_events_per_session = value;
        self.mark(ResponseAttribute::MaxEventsPerSession)
    }

    pub fn with_session_timeout_in_millis(mut self, value: i32) -> Self {
        self.attributes.session_timeout_in_millis = value;
        self.mark(ResponseAttribute::SessionTimeout)
    }

    pub fn with_send_interval_in_millis(mut self, value: i32) -> Self {
        self.attributes.send_interval_in_millis = value;
        self.mark(ResponseAttribute::SendInterval)
    }

    pub fn with_visit_store_version(mut self, value: i32) -> Self {
        self.attributes.visit_store_version = value;
        self.mark(ResponseAttribute::VisitStoreVersion)
    }

    pub fn with_capture(mut self, value: bool) -> Self {
        self.attributes.capture = value;
        self.mark(ResponseAttribute::IsCapture)
    }

    pub fn with_capture_crashes(mut self, value: bool) -> Self {
        self.attributes.capture_crashes = value;
        self.mark(ResponseAttribute::IsCaptureCrashes)
    }

    pub fn with_capture_errors(mut self, value: bool) -> Self {
        self.attributes.capture_errors = value;
        self.mark(ResponseAttribute::IsCaptureErrors)
    }

    pub fn with_multiplicity(mut self, value: i32) -> Self {
        self.attributes.multiplicity = value;
        self.mark(ResponseAttribute::Multiplicity)
    }

    pub fn with_server_id(mut self, value: i32) -> Self {
        self.attributes.server_id = value;
        self.mark(ResponseAttribute::ServerId)
    }

    pub fn with_timestamp_in_millis(mut self, value: i64) -> Self {
        self.attributes.timestamp_in_millis = value;
        self.mark(ResponseAttribute::Timestamp)
    }

    pub fn with_monitor_name(mut self, value: impl Into<String>) -> Self {
        self.attributes.monitor_name = Some(value.into());
        self.mark(ResponseAttribute::MonitorName)
    }

    pub fn build(self) -> ResponseAttributes {
        self.attributes
    }
}
