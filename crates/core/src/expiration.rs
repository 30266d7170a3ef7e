use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::epoch::{expiry_for_duration, EpochError, NetworkInfo};

pub const SYSTEM_ATTRIBUTE_PREFIX: &str = "__NEOFS__";
pub const EXPIRATION_EPOCH_ATTR: &str = "__NEOFS__EXPIRATION_EPOCH";
pub const EXPIRATION_DURATION_ATTR: &str = "__NEOFS__EXPIRATION_DURATION";
pub const EXPIRATION_TIMESTAMP_ATTR: &str = "__NEOFS__EXPIRATION_TIMESTAMP";
pub const EXPIRATION_RFC3339_ATTR: &str = "__NEOFS__EXPIRATION_RFC3339";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExpirationError {
    #[error("couldn't parse value {value:?} of header {header}")]
    Unparseable { header: &'static str, value: String },
    #[error("value {value:?} of header {header} must be in the future")]
    NotInFuture { header: &'static str, value: String },
    #[error("value {value:?} of header {header} must be positive")]
    NotPositive { header: &'static str, value: String },
    #[error(transparent)]
    Epoch(#[from] EpochError),
}

/// Rewrites human-readable expiration attributes into the expiration epoch
/// attribute understood by the network. Attributes are applied in the order
/// RFC 3339, unix timestamp, duration; an explicit epoch attribute supplied
/// by the caller takes precedence over all of them.
pub fn prepare_expiration_headers(
    headers: &mut HashMap<String, String>,
    info: &NetworkInfo,
    now: SystemTime,
) -> Result<(), ExpirationError> {
    let explicit_epoch = headers
        .get(EXPIRATION_EPOCH_ATTR)
        .filter(|value| !value.is_empty())
        .cloned();

    if let Some(value) = headers.remove(EXPIRATION_RFC3339_ATTR) {
        let parsed = chrono::DateTime::parse_from_rfc3339(&value).map_err(|_| {
            ExpirationError::Unparseable {
                header: EXPIRATION_RFC3339_ATTR,
                value: value.clone(),
            }
        })?;
        let remaining = SystemTime::from(parsed).duration_since(now).map_err(|_| {
            ExpirationError::NotInFuture {
                header: EXPIRATION_RFC3339_ATTR,
                value: value.clone(),
            }
        })?;
        set_expiration_epoch(headers, info, remaining)?;
    }

    if let Some(value) = headers.remove(EXPIRATION_TIMESTAMP_ATTR) {
        let seconds: i64 = value.parse().map_err(|_| ExpirationError::Unparseable {
            header: EXPIRATION_TIMESTAMP_ATTR,
            value: value.clone(),
        })?;
        let not_in_future = || ExpirationError::NotInFuture {
            header: EXPIRATION_TIMESTAMP_ATTR,
            value: value.clone(),
        };
        let seconds = u64::try_from(seconds).map_err(|_| not_in_future())?;
        let remaining = (UNIX_EPOCH + Duration::from_secs(seconds))
            .duration_since(now)
            .map_err(|_| not_in_future())?;
        set_expiration_epoch(headers, info, remaining)?;
    }

    if let Some(value) = headers.remove(EXPIRATION_DURATION_ATTR) {
        let duration =
            humantime::parse_duration(&value).map_err(|_| ExpirationError::Unparseable {
                header: EXPIRATION_DURATION_ATTR,
                value: value.clone(),
            })?;
        if duration.is_zero() {
            return Err(ExpirationError::NotPositive {
                header: EXPIRATION_DURATION_ATTR,
                value,
            });
        }
        set_expiration_epoch(headers, info, duration)?;
    }

    if let Some(epoch) = explicit_epoch {
        headers.insert(EXPIRATION_EPOCH_ATTR.to_owned(), epoch);
    }

    Ok(())
}

fn set_expiration_epoch(
    headers: &mut HashMap<String, String>,
    info: &NetworkInfo,
    remaining: Duration,
) -> Result<(), ExpirationError> {
    let epoch = expiry_for_duration(info, remaining)?;
    headers.insert(EXPIRATION_EPOCH_ATTR.to_owned(), epoch.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn info() -> NetworkInfo {
        NetworkInfo {
            current_epoch: 100,
            ms_per_block: 1_000,
            epoch_duration_blocks: Some(60),
        }
    }

    fn now() -> SystemTime {
        // 2024-01-01T00:00:00Z
        UNIX_EPOCH + Duration::from_secs(1_704_067_200)
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn duration_header_becomes_epoch() {
        let mut map = headers(&[(EXPIRATION_DURATION_ATTR, "2h 30m"), ("FileName", "a.gif")]);
        prepare_expiration_headers(&mut map, &info(), now()).expect("prepare");

        assert_eq!(map.get(EXPIRATION_EPOCH_ATTR).map(String::as_str), Some("250"));
        assert!(!map.contains_key(EXPIRATION_DURATION_ATTR));
        assert_eq!(map.get("FileName").map(String::as_str), Some("a.gif"));
    }

    #[test]
    fn timestamp_header_becomes_epoch() {
        let target = 1_704_067_200 + 10 * 60;
        let mut map = headers(&[(EXPIRATION_TIMESTAMP_ATTR, &target.to_string())]);
        prepare_expiration_headers(&mut map, &info(), now()).expect("prepare");

        assert_eq!(map.get(EXPIRATION_EPOCH_ATTR).map(String::as_str), Some("110"));
        assert!(!map.contains_key(EXPIRATION_TIMESTAMP_ATTR));
    }

    #[test]
    fn rfc3339_header_becomes_epoch() {
        let mut map = headers(&[(EXPIRATION_RFC3339_ATTR, "2024-01-01T01:00:00Z")]);
        prepare_expiration_headers(&mut map, &info(), now()).expect("prepare");

        assert_eq!(map.get(EXPIRATION_EPOCH_ATTR).map(String::as_str), Some("160"));
        assert!(!map.contains_key(EXPIRATION_RFC3339_ATTR));
    }

    #[test]
    fn explicit_epoch_wins() {
        let mut map = headers(&[
            (EXPIRATION_EPOCH_ATTR, "4242"),
            (EXPIRATION_DURATION_ATTR, "1h"),
        ]);
        prepare_expiration_headers(&mut map, &info(), now()).expect("prepare");

        assert_eq!(map.get(EXPIRATION_EPOCH_ATTR).map(String::as_str), Some("4242"));
        assert!(!map.contains_key(EXPIRATION_DURATION_ATTR));
    }

    #[test]
    fn past_values_are_rejected() {
        let mut map = headers(&[(EXPIRATION_RFC3339_ATTR, "2023-12-31T23:00:00Z")]);
        let error = prepare_expiration_headers(&mut map, &info(), now()).expect_err("past");
        assert!(matches!(error, ExpirationError::NotInFuture { header, .. } if header == EXPIRATION_RFC3339_ATTR));

        let mut map = headers(&[(EXPIRATION_TIMESTAMP_ATTR, "-5")]);
        let error = prepare_expiration_headers(&mut map, &info(), now()).expect_err("negative");
        assert!(matches!(error, ExpirationError::NotInFuture { header, .. } if header == EXPIRATION_TIMESTAMP_ATTR));
    }

    #[test]
    fn unparseable_values_name_the_header() {
        for (header, value) in [
            (EXPIRATION_RFC3339_ATTR, "yesterday"),
            (EXPIRATION_TIMESTAMP_ATTR, "soon"),
            (EXPIRATION_DURATION_ATTR, "forever"),
        ] {
            let mut map = headers(&[(header, value)]);
            let error = prepare_expiration_headers(&mut map, &info(), now()).expect_err("bad");
            assert!(error.to_string().contains(header), "{error}");
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut map = headers(&[(EXPIRATION_DURATION_ATTR, "0s")]);
        let error = prepare_expiration_headers(&mut map, &info(), now()).expect_err("zero");
        assert!(matches!(error, ExpirationError::NotPositive { .. }));
    }

    #[test]
    fn missing_epoch_parameter_propagates() {
        let info = NetworkInfo {
            epoch_duration_blocks: None,
            ..info()
        };
        let mut map = headers(&[(EXPIRATION_DURATION_ATTR, "1h")]);
        let error = prepare_expiration_headers(&mut map, &info, now()).expect_err("no param");
        assert_eq!(error, ExpirationError::Epoch(EpochError::MissingEpochDuration));
    }
}
