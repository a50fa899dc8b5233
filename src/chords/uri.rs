//! Submission address construction for the CHORDS `url_create` endpoint.

use crate::chords::transform::WireRecord;
use crate::error::{AirqError, Result};
use url::Url;

const CREATE_PATH: &str = "measurements/url_create";

/// Build the submission address for a wire record.
///
/// The record is encoded as query parameters:
/// `instrument_id`, every `vars` entry, `key`, `email`/`api_key`, and a bare
/// `test` flag.
pub fn build_uri(host: &str, record: &WireRecord) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(AirqError::config_error("portal host is empty"));
    }
    let base = if host.contains("://") {
        format!("{}/{}", host, CREATE_PATH)
    } else {
        format!("http://{}/{}", host, CREATE_PATH)
    };

    let mut url = Url::parse(&base)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("instrument_id", &record.inst_id);
        for (name, value) in &record.vars {
            query.append_pair(name, &value.to_string());
        }
        if let Some(skey) = &record.skey {
            query.append_pair("key", skey);
        }
        if let (Some(email), Some(api_key)) = (&record.api_email, &record.api_key) {
            query.append_pair("email", email);
            query.append_pair("api_key", api_key);
        }
        if record.test {
            query.append_key_only("test");
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::record::FieldValue;
    use std::collections::BTreeMap;

    fn record() -> WireRecord {
        let mut vars = BTreeMap::new();
        vars.insert("at".to_string(), FieldValue::Text("2024-03-01T12:00:00Z".into()));
        vars.insert("rh".to_string(), FieldValue::Float(40.2));
        WireRecord {
            vars,
            inst_id: "1".into(),
            test: false,
            skey: None,
            api_email: None,
            api_key: None,
        }
    }

    #[test]
    fn test_plain_host() {
        let url = build_uri("chords_host.com", &record()).unwrap();
        assert_eq!(
            url.as_str(),
            "http://chords_host.com/measurements/url_create?instrument_id=1&at=2024-03-01T12%3A00%3A00Z&rh=40.2"
        );
    }

    #[test]
    fn test_scheme_and_credentials_kept() {
        let mut record = record();
        record.test = true;
        record.skey = Some("secret key".into());
        record.api_email = Some("ops@example.org".into());
        record.api_key = Some("abc".into());

        let url = build_uri("https://portal.example.org/", &record).unwrap();
        assert_eq!(url.scheme(), "https");
        let query = url.query().unwrap();
        assert!(query.contains("key=secret+key"));
        assert!(query.contains("email=ops%40example.org&api_key=abc"));
        assert!(query.ends_with("&test"));
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(matches!(build_uri("  ", &record()), Err(AirqError::Config(_))));
    }
}
