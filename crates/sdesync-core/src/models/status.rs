//! Sync status codes stamped on cache entries and rendered nodes

use once_cell::sync::Lazy;
use regex::Regex;
use crate::error::SdeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason used when an upstream code cannot be mapped to anything specific
pub const GENERIC_UPSTREAM_REASON: &str = "upstream-error";

/// Codes accepted from operators, besides `500-<reason>`
pub const KNOWN_CODES: &[&str] = &[
    "200-ok",
    "201-nodatasource",
    "404-missing-cache-value",
    "404-missing-cache-element",
    "404-missing-sdecachefile",
    "404-notfoundinmappingservice",
    "new",
    "drift",
];

/// `5xx` or `5xx-reason` as sent by the mapping service
static UPSTREAM_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^5\d\d(?:-([a-z0-9][a-z0-9_-]*))?$").expect("valid regex"));

/// Closed set of statuses describing how trustworthy a fact value is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncStatus {
    /// `200-ok`: value resolved and applied
    Ok,
    /// `201-nodatasource`: fact intentionally unmanaged, value left as-is
    NoDataSource,
    /// `404-missing-cache-value`: entry exists but has no value for the language
    MissingCacheValue,
    /// `404-missing-cache-element`: fact id absent from the document cache
    MissingCacheElement,
    /// `404-missing-sdecachefile`: document has no cache file
    MissingCacheFile,
    /// `404-notfoundinmappingservice`: bulk response had no entry for the id
    NotFoundInMappingService,
    /// `new`: introduced locally, never synced
    New,
    /// `drift`: structure differs from the external source
    Drift,
    /// `500-<reason>`: upstream resolution error
    UpstreamError(String),
}

impl SyncStatus {
    pub fn code(&self) -> String {
        match self {
            SyncStatus::Ok => "200-ok".to_string(),
            SyncStatus::NoDataSource => "201-nodatasource".to_string(),
            SyncStatus::MissingCacheValue => "404-missing-cache-value".to_string(),
            SyncStatus::MissingCacheElement => "404-missing-cache-element".to_string(),
            SyncStatus::MissingCacheFile => "404-missing-sdecachefile".to_string(),
            SyncStatus::NotFoundInMappingService => "404-notfoundinmappingservice".to_string(),
            SyncStatus::New => "new".to_string(),
            SyncStatus::Drift => "drift".to_string(),
            SyncStatus::UpstreamError(reason) => format!("500-{}", reason),
        }
    }

    /// Parse a known code or `5xx[-reason]`, `None` for anything else
    pub fn parse_code(code: &str) -> Option<Self> {
        let status = match code.trim() {
            "200-ok" => SyncStatus::Ok,
            "201-nodatasource" => SyncStatus::NoDataSource,
            "404-missing-cache-value" => SyncStatus::MissingCacheValue,
            "404-missing-cache-element" => SyncStatus::MissingCacheElement,
            "404-missing-sdecachefile" => SyncStatus::MissingCacheFile,
            "404-notfoundinmappingservice" => SyncStatus::NotFoundInMappingService,
            "new" => SyncStatus::New,
            "drift" => SyncStatus::Drift,
            other if UPSTREAM_CODE.is_match(other) => Self::upstream(other),
            _ => return None,
        };
        Some(status)
    }

    /// Parse a stored status code; unknown codes become a generic upstream error
    pub fn from_code(code: &str) -> Self {
        Self::parse_code(code).unwrap_or_else(|| Self::upstream(code))
    }

    /// Translate a result code from the bulk lookup response
    pub fn from_remote_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        match code.as_str() {
            "200" | "ok" | "200-ok" => SyncStatus::Ok,
            "201" | "nodatasource" | "201-nodatasource" => SyncStatus::NoDataSource,
            "404" | "notfound" | "404-notfoundinmappingservice" => {
                SyncStatus::NotFoundInMappingService
            }
            other => Self::upstream(other),
        }
    }

    fn upstream(code: &str) -> Self {
        let reason = UPSTREAM_CODE
            .captures(code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| GENERIC_UPSTREAM_REASON.to_string());
        SyncStatus::UpstreamError(reason)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SyncStatus::Ok)
    }

    /// 404-class and 500-class statuses
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncStatus::MissingCacheValue
                | SyncStatus::MissingCacheElement
                | SyncStatus::MissingCacheFile
                | SyncStatus::NotFoundInMappingService
                | SyncStatus::UpstreamError(_)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Strict parsing for operator input: typos are rejected, not stored as errors
impl FromStr for SyncStatus {
    type Err = SdeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::parse_code(code).ok_or_else(|| SdeError::UnknownStatus {
            code: code.to_string(),
            expected: format!("{} or 500-<reason>", KNOWN_CODES.join(", ")),
        })
    }
}

impl From<String> for SyncStatus {
    fn from(code: String) -> Self {
        SyncStatus::from_code(&code)
    }
}

impl From<SyncStatus> for String {
    fn from(status: SyncStatus) -> Self {
        status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_strings() {
        for status in [
            SyncStatus::Ok,
            SyncStatus::NoDataSource,
            SyncStatus::MissingCacheFile,
            SyncStatus::New,
            SyncStatus::UpstreamError("timeout".into()),
        ] {
            assert_eq!(SyncStatus::from_code(&status.code()), status);
        }
    }

    #[test]
    fn test_unknown_stored_code_is_generic_upstream_error() {
        assert_eq!(
            SyncStatus::from_code("302-moved"),
            SyncStatus::UpstreamError(GENERIC_UPSTREAM_REASON.into())
        );
    }

    #[test]
    fn test_strict_parse_rejects_typos() {
        assert_eq!("200-ok".parse::<SyncStatus>().unwrap(), SyncStatus::Ok);
        assert_eq!(
            "500-timeout".parse::<SyncStatus>().unwrap(),
            SyncStatus::UpstreamError("timeout".into())
        );
        for code in KNOWN_CODES {
            assert_eq!(SyncStatus::parse_code(code).unwrap().code(), *code);
        }

        for typo in ["200-okk", "ok", "", "500-", "404-missing"] {
            assert!(SyncStatus::parse_code(typo).is_none(), "{:?} accepted", typo);
            let err = typo.parse::<SyncStatus>().unwrap_err();
            assert!(matches!(err, SdeError::UnknownStatus { .. }));
            assert!(err.to_string().contains("201-nodatasource"));
        }
    }

    #[test]
    fn test_remote_code_mapping() {
        assert_eq!(SyncStatus::from_remote_code("200"), SyncStatus::Ok);
        assert_eq!(SyncStatus::from_remote_code("OK"), SyncStatus::Ok);
        assert_eq!(
            SyncStatus::from_remote_code("nodatasource"),
            SyncStatus::NoDataSource
        );
        assert_eq!(
            SyncStatus::from_remote_code("404"),
            SyncStatus::NotFoundInMappingService
        );
        assert_eq!(
            SyncStatus::from_remote_code("500-connection-refused"),
            SyncStatus::UpstreamError("connection-refused".into())
        );
        assert_eq!(
            SyncStatus::from_remote_code("503"),
            SyncStatus::UpstreamError(GENERIC_UPSTREAM_REASON.into())
        );
        assert_eq!(
            SyncStatus::from_remote_code("weird"),
            SyncStatus::UpstreamError(GENERIC_UPSTREAM_REASON.into())
        );
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&SyncStatus::MissingCacheElement).unwrap();
        assert_eq!(json, "\"404-missing-cache-element\"");
        let parsed: SyncStatus = serde_json::from_str("\"500-parse\"").unwrap();
        assert_eq!(parsed, SyncStatus::UpstreamError("parse".into()));
    }
}
