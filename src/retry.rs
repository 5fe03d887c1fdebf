//! One-shot credential retry around the extraction tool.
//!
//! When the first attempt fails with diagnostics that look like an access
//! refusal, the same invocation is repeated once with browser cookies
//! attached. Whatever the second attempt returns is final.

use crate::error::ExtractionError;
use crate::invoker::Extractor;
use once_cell::sync::Lazy;
use regex::Regex;

static ACCESS_DENIED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)403|forbidden|permission|denied").expect("static regex is valid"));

/// Case-insensitive match for the access-denied markers.
pub fn is_access_denied(diagnostics: &str) -> bool {
    ACCESS_DENIED_REGEX.is_match(diagnostics)
}

/// Runs the extraction, retrying once with `credential_profile` on an
/// access-denied failure. With no profile configured the first outcome is final.
pub async fn extract_with_retry(
    extractor: &Extractor,
    url: &str,
    credential_profile: Option<&str>,
) -> Result<String, ExtractionError> {
    let first = extractor.dump_json(url, None).await;

    let err = match first {
        Ok(json) => return Ok(json),
        Err(err) => err,
    };

    let profile = match credential_profile {
        Some(profile) if err.is_access_denied() => profile,
        _ => {
            tracing::error!("Extraction failed for {}: {}", url, err);
            return Err(err);
        }
    };

    tracing::warn!(
        "Access denied for {} ({}), retrying once with cookies from browser profile '{}'",
        url,
        err,
        profile
    );

    match extractor.dump_json(url, Some(profile)).await {
        Ok(json) => {
            tracing::info!("Retry with browser cookies succeeded for {}", url);
            Ok(json)
        }
        Err(retry_err) => {
            tracing::error!("Retry with browser cookies failed for {}: {}", url, retry_err);
            Err(retry_err)
        }
    }
}
