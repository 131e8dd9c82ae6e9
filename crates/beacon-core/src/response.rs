// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of collector replies.
//!
//! A reply is either the legacy `key=value&key=value` body or a structured
//! JSON document. Both decode into [`ResponseAttributes`]; the wrapping
//! [`StatusResponse`] keeps the HTTP status and the retry-after delay.
//!
//! Numeric values follow 32-bit signed arithmetic: literals are truncated to
//! `i32` and unit conversions wrap on overflow.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use thiserror::Error;

use crate::attributes::{ResponseAttributes, ResponseAttributesBuilder};

pub const RESPONSE_KEY_CAPTURE: &str = "cp";
pub const RESPONSE_KEY_SEND_INTERVAL: &str = "si";
pub const RESPONSE_KEY_MONITOR_NAME: &str = "bn";
pub const RESPONSE_KEY_SERVER_ID: &str = "id";
pub const RESPONSE_KEY_MAX_BEACON_SIZE: &str = "bl";
pub const RESPONSE_KEY_CAPTURE_ERRORS: &str = "er";
pub const RESPONSE_KEY_CAPTURE_CRASHES: &str = "cr";
pub const RESPONSE_KEY_MULTIPLICITY: &str = "mp";
pub const RESPONSE_KEY_TIMESTAMP: &str = "ts";

/// Delay used when the collector does not advertise a usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(10 * 60 * 1000);

/// Status code the collector uses to throttle clients.
pub const TOO_MANY_REQUESTS: u16 = 429;

const MILLIS_PER_SECOND: i32 = 1000;
const MILLIS_PER_MINUTE: i32 = 60 * 1000;
const BYTES_PER_KIB: i32 = 1024;

/// Malformed collector replies.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("invalid response; even number of tokens expected")]
    InvalidTokenCount,
    #[error("invalid numeric value {value:?} for key {key:?}")]
    InvalidNumber {
        key: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid structured response: {0}")]
    Json(#[from] serde_json::Error),
}

/// One `key=value` token pair of a legacy body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Decoded collector reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    status_code: u16,
    retry_after: Duration,
    attributes: ResponseAttributes,
}

impl StatusResponse {
    pub fn new(status_code: u16, retry_after: Duration, attributes: ResponseAttributes) -> Self {
        Self {
            status_code,
            retry_after,
            attributes,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Status codes of 400 and above are the collector's signal to stop capturing.
    pub fn is_erroneous(&self) -> bool {
        self.status_code >= 400
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.status_code == TOO_MANY_REQUESTS
    }

    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    pub fn attributes(&self) -> &ResponseAttributes {
        &self.attributes
    }
}

/// Decodes a collector reply, selecting the wire format from the body.
///
/// Bodies of erroneous replies are not decoded; such replies carry no attributes.
pub fn parse_response(
    status_code: u16,
    body: &str,
    headers: &HeaderMap,
) -> Result<StatusResponse, ResponseError> {
    let retry_after = parse_retry_after(headers);
    let attributes = if status_code >= 400 {
        ResponseAttributes::undefined()
    } else if is_structured(body) {
        parse_json_body(body)?
    } else {
        parse_key_value_body(body)?
    };
    Ok(StatusResponse::new(status_code, retry_after, attributes))
}

fn is_structured(body: &str) -> bool {
    body.trim_start().starts_with('{')
}

/// Reads the single-valued `Retry-After` header, in seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Duration {
    let mut values = headers.get_all(RETRY_AFTER).iter();
    let (Some(value), None) = (values.next(), values.next()) else {
        return DEFAULT_RETRY_AFTER;
    };

    match value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(seconds) => Duration::from_millis(seconds.saturating_mul(1000)),
        None => DEFAULT_RETRY_AFTER,
    }
}

/// Splits a legacy body into key/value pairs.
pub fn parse_key_value_pairs(body: &str) -> Result<Vec<KeyValuePair<'_>>, ResponseError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }

    body.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, rest) = segment
                .split_once('=')
                .ok_or(ResponseError::InvalidTokenCount)?;
            // Repeated separators collapse, so `cp==1` reads as `cp=1`.
            let mut values = rest.split('=').filter(|token| !token.is_empty());
            match (values.next(), values.next()) {
                (Some(value), None) => Ok(KeyValuePair { key, value }),
                (None, None) => Ok(KeyValuePair { key, value: "" }),
                _ => Err(ResponseError::InvalidTokenCount),
            }
        })
        .collect()
}

fn parse_key_value_body(body: &str) -> Result<ResponseAttributes, ResponseError> {
    let mut builder = ResponseAttributes::with_key_value_defaults();

    for KeyValuePair { key, value } in parse_key_value_pairs(body)? {
        builder = match key {
            RESPONSE_KEY_CAPTURE => builder.with_capture(parse_i32(key, value)? == 1),
            RESPONSE_KEY_SEND_INTERVAL => builder
                .with_send_interval_in_millis(parse_i32(key, value)?.wrapping_mul(MILLIS_PER_SECOND)),
            RESPONSE_KEY_MONITOR_NAME => builder.with_monitor_name(value),
            RESPONSE_KEY_SERVER_ID => builder.with_server_id(parse_i32(key, value)?),
            RESPONSE_KEY_MAX_BEACON_SIZE => builder
                .with_max_beacon_size_in_bytes(parse_i32(key, value)?.wrapping_mul(BYTES_PER_KIB)),
            RESPONSE_KEY_CAPTURE_ERRORS => builder.with_capture_errors(parse_i32(key, value)? != 0),
            RESPONSE_KEY_CAPTURE_CRASHES => {
                builder.with_capture_crashes(parse_i32(key, value)? != 0)
            }
            RESPONSE_KEY_MULTIPLICITY => builder.with_multiplicity(parse_i32(key, value)?),
            RESPONSE_KEY_TIMESTAMP => builder.with_timestamp_in_millis(parse_i64(key, value)?),
            _ => builder,
        };
    }

    Ok(builder.build())
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ResponseError> {
    value
        .parse::<i64>()
        .map_err(|source| ResponseError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
            source,
        })
}

/// Literals outside the 32-bit range are rejected; only unit conversions wrap.
fn parse_i32(key: &str, value: &str) -> Result<i32, ResponseError> {
    value
        .parse::<i32>()
        .map_err(|source| ResponseError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
            source,
        })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonResponse {
    agent_config: Option<JsonAgentConfig>,
    app_config: Option<JsonAppConfig>,
    dynamic_config: Option<JsonDynamicConfig>,
    timestamp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAgentConfig {
    max_beacon_size_in_kb: Option<i32>,
    max_session_duration_in_min: Option<i32>,
    max_events_per_session: Option<i32>,
    session_timeout_in_sec: Option<i32>,
    send_interval_in_sec: Option<i32>,
    visit_store_version: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAppConfig {
    capture: Option<i32>,
    capture_crashes: Option<i32>,
    capture_errors: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonDynamicConfig {
    multiplicity: Option<i32>,
    server_id: Option<i32>,
}

fn parse_json_body(body: &str) -> Result<ResponseAttributes, ResponseError> {
    let document: JsonResponse = serde_json::from_str(body)?;
    let mut builder = ResponseAttributes::with_json_defaults();

    if let Some(agent) = document.agent_config {
        builder = apply_agent_config(builder, agent);
    }
    if let Some(app) = document.app_config {
        if let Some(capture) = app.capture {
            builder = builder.with_capture(capture == 1);
        }
        if let Some(crashes) = app.capture_crashes {
            builder = builder.with_capture_crashes(crashes != 0);
        }
        if let Some(errors) = app.capture_errors {
            builder = builder.with_capture_errors(errors != 0);
        }
    }
    if let Some(dynamic) = document.dynamic_config {
        if let Some(multiplicity) = dynamic.multiplicity {
            builder = builder.with_multiplicity(multiplicity);
        }
        if let Some(server_id) = dynamic.server_id {
            builder = builder.with_server_id(server_id);
        }
    }
    if let Some(timestamp) = document.timestamp {
        builder = builder.with_timestamp_in_millis(timestamp);
    }

    Ok(builder.build())
}

fn apply_agent_config(
    mut builder: ResponseAttributesBuilder,
    agent: JsonAgentConfig,
) -> ResponseAttributesBuilder {
    if let Some(kib) = agent.max_beacon_size_in_kb {
        builder = builder.with_max_beacon_size_in_bytes(kib.wrapping_mul(BYTES_PER_KIB));
    }
    if let Some(minutes) = agent.max_session_duration_in_min {
        builder =
            builder.with_max_session_duration_in_millis(minutes.wrapping_mul(MILLIS_PER_MINUTE));
    }
    if let Some(events) = agent.max_events_per_session {
        builder = builder.with_max_events_per_session(events);
    }
    if let Some(seconds) = agent.session_timeout_in_sec {
        builder = builder.with_session_timeout_in_millis(seconds.wrapping_mul(MILLIS_PER_SECOND));
    }
    if let Some(seconds) = agent.send_interval_in_sec {
        builder = builder.with_send_interval_in_millis(seconds.wrapping_mul(MILLIS_PER_SECOND));
    }
    if let Some(version) = agent.visit_store_version {
        builder = builder.with_visit_store_version(version);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ResponseAttribute;
    use proptest::prelude::*;
    use reqwest::header::HeaderValue;

    fn parse(body: &str) -> Result<StatusResponse, ResponseError> {
        parse_response(200, body, &HeaderMap::new())
    }

    fn attributes(body: &str) -> ResponseAttributes {
        parse(body).expect("body should parse").attributes().clone()
    }

    /// Ensures every status from 400 upwards is erroneous.
    #[test]
    fn erroneous_from_400_upwards() {
        let headers = HeaderMap::new();
        assert!(parse_response(400, "", &headers).unwrap().is_erroneous());
        assert!(parse_response(401, "", &headers).unwrap().is_erroneous());
        assert!(!parse_response(399, "", &headers).unwrap().is_erroneous());
        assert_eq!(parse_response(418, "", &headers).unwrap().status_code(), 418);
    }

    /// Confirms error pages are not fed to the body parsers.
    #[test]
    fn erroneous_bodies_are_not_decoded() {
        let response = parse_response(503, "<html>unavailable</html>", &HeaderMap::new())
            .expect("error pages are not parsed");
        assert!(response.is_erroneous());
        assert!(response.attributes().set_attributes().is_empty());
    }

    /// Ensures a missing `Retry-After` falls back to ten minutes.
    #[test]
    fn retry_after_defaults_when_header_missing() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), DEFAULT_RETRY_AFTER);
        assert_eq!(DEFAULT_RETRY_AFTER, Duration::from_millis(600_000));
    }

    /// Confirms repeated `Retry-After` headers are ignored.
    #[test]
    fn retry_after_defaults_when_header_has_multiple_values() {
        let mut headers = HeaderMap::new();
        headers.append(RETRY_AFTER, HeaderValue::from_static("100"));
        headers.append(RETRY_AFTER, HeaderValue::from_static("200"));
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);
    }

    /// Confirms a non-numeric `Retry-After` is ignored.
    #[test]
    fn retry_after_defaults_when_value_is_not_numeric() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("a"));
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);
    }

    /// Verifies `Retry-After` seconds are converted to milliseconds.
    #[test]
    fn retry_after_is_converted_to_millis() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1234"));
        assert_eq!(parse_retry_after(&headers), Duration::from_millis(1_234_000));

        let response = parse_response(429, "", &headers).unwrap();
        assert!(response.is_too_many_requests());
        assert_eq!(response.retry_after(), Duration::from_millis(1_234_000));
    }

    #[test]
    fn key_value_pairs_of_empty_body() {
        assert!(parse_key_value_pairs("").unwrap().is_empty());
    }

    /// Ensures pairs are split in order and empty values are kept.
    #[test]
    fn key_value_pairs_are_split() {
        let pairs = parse_key_value_pairs("key=value&other=").unwrap();
        assert_eq!(
            pairs,
            vec![
                KeyValuePair {
                    key: "key",
                    value: "value"
                },
                KeyValuePair {
                    key: "other",
                    value: ""
                },
            ]
        );
    }

    /// Confirms a segment without `=` is a token-count error.
    #[test]
    fn missing_separator_is_rejected() {
        let err = parse_key_value_pairs("key_value").unwrap_err();
        assert!(matches!(err, ResponseError::InvalidTokenCount));
        assert_eq!(
            err.to_string(),
            "invalid response; even number of tokens expected"
        );
    }

    /// Ensures bodies with an odd token count are rejected.
    #[test]
    fn odd_number_of_tokens_is_rejected() {
        assert!(matches!(
            parse("cp=100&cr"),
            Err(ResponseError::InvalidTokenCount)
        ));
        assert!(matches!(parse("cp&100"), Err(ResponseError::InvalidTokenCount)));
        assert!(matches!(parse("a=b=c"), Err(ResponseError::InvalidTokenCount)));
    }

    /// Verifies absent keys keep the key-value defaults and stay unset.
    #[test]
    fn absent_keys_fall_back_to_key_value_defaults() {
        let attributes = attributes("");
        assert!(attributes.is_capture());
        assert!(attributes.is_capture_crashes());
        assert!(attributes.is_capture_errors());
        assert_eq!(attributes.multiplicity(), 1);
        assert_eq!(attributes.send_interval_in_millis(), -1);
        assert_eq!(attributes.server_id(), -1);
        assert_eq!(attributes.max_beacon_size_in_bytes(), -1);
        assert!(attributes.monitor_name().is_none());
        assert!(attributes.set_attributes().is_empty());
    }

    /// Confirms capture is on only for the literal `1`.
    #[test]
    fn capture_is_on_only_for_exactly_one() {
        assert!(attributes("cp=1").is_capture());
        assert!(!attributes("cp=2").is_capture());
        assert!(!attributes("cp=0").is_capture());
        assert!(!attributes("cp=-2").is_capture());
        assert!(attributes("cp=1").is_attribute_set(ResponseAttribute::IsCapture));
    }

    /// Ensures empty or non-numeric values fail for every integer key.
    #[test]
    fn empty_or_non_numeric_integers_are_rejected() {
        for key in ["cp", "si", "id", "bl", "er", "cr", "mp"] {
            assert!(
                matches!(
                    parse(&format!("{key}=")),
                    Err(ResponseError::InvalidNumber { .. })
                ),
                "empty {key}"
            );
            assert!(
                matches!(
                    parse(&format!("{key}=a")),
                    Err(ResponseError::InvalidNumber { .. })
                ),
                "non-numeric {key}"
            );
        }
    }

    /// Confirms literals too large for any integer type are rejected.
    #[test]
    fn literals_beyond_64_bits_are_rejected() {
        assert!(matches!(
            parse("id=99999999999999999999"),
            Err(ResponseError::InvalidNumber { .. })
        ));
    }

    /// Ensures every 32-bit key rejects literals of 2^31 and beyond.
    #[test]
    fn literals_beyond_32_bits_are_rejected() {
        for key in ["cp", "si", "id", "bl", "er", "cr", "mp"] {
            assert!(
                matches!(
                    parse(&format!("{key}=2147483648")),
                    Err(ResponseError::InvalidNumber { .. })
                ),
                "{key}"
            );
        }
        assert_eq!(attributes("id=2147483647").server_id(), i32::MAX);
        assert_eq!(attributes("id=-2147483648").server_id(), i32::MIN);
    }

    /// Confirms empty segments and repeated separators are skipped.
    #[test]
    fn empty_tokens_are_ignored() {
        let parsed = attributes("cp=1&si=5&");
        assert!(parsed.is_capture());
        assert_eq!(parsed.send_interval_in_millis(), 5000);
        assert_eq!(attributes("&&mp=3").multiplicity(), 3);
        assert_eq!(attributes("id==7").server_id(), 7);
        assert_eq!(attributes("bn=").monitor_name(), Some(""));
        assert_eq!(parse_key_value_pairs("&").unwrap(), Vec::new());
        assert!(matches!(
            parse("id=1=2"),
            Err(ResponseError::InvalidTokenCount)
        ));
    }

    /// Verifies send interval seconds are converted to milliseconds.
    #[test]
    fn send_interval_is_converted_to_millis() {
        assert_eq!(attributes("si=1").send_interval_in_millis(), 1000);
        assert_eq!(attributes("si=1200").send_interval_in_millis(), 1_200_000);
        assert_eq!(attributes("si=0").send_interval_in_millis(), 0);
        assert_eq!(attributes("si=-1").send_interval_in_millis(), -1000);
        assert_eq!(attributes("si=-42").send_interval_in_millis(), -42000);
    }

    /// Ensures the seconds-to-millis conversion wraps at 32 bits.
    #[test]
    fn send_interval_conversion_wraps() {
        assert_eq!(
            attributes("si=2147484").send_interval_in_millis(),
            -2147483296
        );
        assert_eq!(
            attributes("si=-2147485").send_interval_in_millis(),
            2147482296
        );
    }

    /// Confirms monitor names are used verbatim, including empty ones.
    #[test]
    fn monitor_name_is_taken_verbatim() {
        assert_eq!(attributes("bn=").monitor_name(), Some(""));
        assert_eq!(attributes("bn=foobar").monitor_name(), Some("foobar"));
        assert_eq!(attributes("bn=1234").monitor_name(), Some("1234"));
    }

    #[test]
    fn server_id_is_parsed() {
        assert_eq!(attributes("id=1234").server_id_if_set(), Some(1234));
    }

    /// Verifies beacon size KiB are converted to bytes.
    #[test]
    fn max_beacon_size_is_converted_to_bytes() {
        assert_eq!(attributes("bl=1").max_beacon_size_in_bytes(), 1024);
        assert_eq!(attributes("bl=1200").max_beacon_size_in_bytes(), 1200 * 1024);
        assert_eq!(attributes("bl=0").max_beacon_size_in_bytes(), 0);
        assert_eq!(attributes("bl=-1").max_beacon_size_in_bytes(), -1024);
        assert_eq!(attributes("bl=-42").max_beacon_size_in_bytes(), -42 * 1024);
    }

    /// Ensures the KiB-to-bytes conversion wraps at 32 bits.
    #[test]
    fn max_beacon_size_conversion_wraps() {
        assert_eq!(attributes("bl=2097152").max_beacon_size_in_bytes(), i32::MIN);
        assert_eq!(
            attributes("bl=-2097153").max_beacon_size_in_bytes(),
            2147482624
        );
    }

    /// Confirms error and crash capture are off only for `0`.
    #[test]
    fn capture_errors_and_crashes_are_off_only_for_zero() {
        for value in ["2", "1", "-2"] {
            assert!(attributes(&format!("er={value}")).is_capture_errors());
            assert!(attributes(&format!("cr={value}")).is_capture_crashes());
        }
        assert!(!attributes("er=0").is_capture_errors());
        assert!(!attributes("cr=0").is_capture_crashes());
    }

    #[test]
    fn multiplicity_is_parsed() {
        assert_eq!(attributes("mp=3").multiplicity(), 3);
        assert_eq!(attributes("mp=0").multiplicity(), 0);
        assert_eq!(attributes("mp=-5").multiplicity(), -5);
    }

    /// Ensures unknown keys such as `type` are skipped.
    #[test]
    fn unknown_keys_are_ignored() {
        let attributes = attributes("type=m&si=120&bn=dynaTraceMonitor&id=1");
        assert_eq!(attributes.send_interval_if_set(), Some(120_000));
        assert_eq!(attributes.monitor_name_if_set(), Some("dynaTraceMonitor"));
        assert_eq!(attributes.server_id_if_set(), Some(1));
        assert!(!attributes.is_attribute_set(ResponseAttribute::IsCapture));
        assert!(!attributes.is_attribute_set(ResponseAttribute::MaxBeaconSize));
    }

    /// Verifies timestamps keep their full 64-bit range.
    #[test]
    fn timestamp_uses_64_bits() {
        assert_eq!(
            attributes("ts=1700000000000").timestamp_in_millis(),
            1_700_000_000_000
        );
    }

    /// Ensures every recognised JSON field is decoded with unit conversions.
    #[test]
    fn json_body_is_decoded() {
        let body = r#"{
            "agentConfig": {
                "maxBeaconSizeInKb": 10,
                "maxSessionDurationInMin": 2,
                "maxEventsPerSession": 50,
                "sessionTimeoutInSec": 30,
                "sendIntervalInSec": 60,
                "visitStoreVersion": 2
            },
            "appConfig": {"capture": 0, "captureCrashes": 0, "captureErrors": 3},
            "dynamicConfig": {"multiplicity": 4, "serverId": 9, "status": "ok"},
            "timestamp": 1234
        }"#;
        let attributes = attributes(body);
        assert_eq!(attributes.max_beacon_size_in_bytes(), 10 * 1024);
        assert_eq!(attributes.max_session_duration_in_millis(), 2 * 60 * 1000);
        assert_eq!(attributes.max_events_per_session(), 50);
        assert_eq!(attributes.session_timeout_in_millis(), 30_000);
        assert_eq!(attributes.send_interval_in_millis(), 60_000);
        assert_eq!(attributes.visit_store_version(), 2);
        assert!(!attributes.is_capture());
        assert!(!attributes.is_capture_crashes());
        assert!(attributes.is_capture_errors());
        assert_eq!(attributes.multiplicity(), 4);
        assert_eq!(attributes.server_id(), 9);
        assert_eq!(attributes.timestamp_in_millis(), 1234);
    }

    /// Confirms absent JSON fields keep the JSON defaults and stay unset.
    #[test]
    fn json_absent_fields_keep_json_defaults_unset() {
        let attributes = attributes(r#"{"appConfig": {"capture": 1}}"#);
        assert!(attributes.is_capture());
        assert!(attributes.is_attribute_set(ResponseAttribute::IsCapture));
        assert!(!attributes.is_attribute_set(ResponseAttribute::SendInterval));
        assert_eq!(attributes.send_interval_in_millis(), 120_000);
    }

    /// Ensures type mismatches and out-of-range JSON numbers are rejected.
    #[test]
    fn json_type_mismatch_is_rejected() {
        assert!(matches!(
            parse(r#"{"agentConfig": {"sendIntervalInSec": "sixty"}}"#),
            Err(ResponseError::Json(_))
        ));
        assert!(matches!(
            parse(r#"{"dynamicConfig": {"serverId": 2147483648}}"#),
            Err(ResponseError::Json(_))
        ));
        assert!(matches!(parse("{not json"), Err(ResponseError::Json(_))));
    }

    /// Verifies JSON unit conversions wrap like the key-value format.
    #[test]
    fn json_conversions_wrap() {
        let attributes = attributes(r#"{"agentConfig": {"sendIntervalInSec": 2147484}}"#);
        assert_eq!(attributes.send_interval_in_millis(), -2147483296);
    }

    proptest! {
        /// Ensures any body with one key lacking a value is rejected.
        #[test]
        fn odd_token_counts_always_fail(
            keys in proptest::collection::vec("[a-z]{1,3}", 1..6),
            broken in 0usize..6,
        ) {
            let broken = broken % keys.len();
            let body = keys
                .iter()
                .enumerate()
                .map(|(idx, key)| if idx == broken { key.clone() } else { format!("{key}=1") })
                .collect::<Vec<_>>()
                .join("&");
            prop_assert!(matches!(parse(&body), Err(ResponseError::InvalidTokenCount)));
        }
    }
}
