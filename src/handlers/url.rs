use crate::errors::MediatorError;
use url::{Origin, Url};

/// Resolves `url` against `origin` and returns `origin + pathname`.
///
/// Relative URLs are resolved against the origin. The result must belong to
/// `origin`; query and fragment are dropped.
pub fn normalize_url(url: &str, origin: &Origin) -> Result<String, MediatorError> {
    let invalid = |reason: String| MediatorError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    if !origin.is_tuple() {
        return Err(invalid("expected origin is opaque".to_string()));
    }
    let expected = origin.ascii_serialization();
    let base = Url::parse(&expected).map_err(|e| invalid(e.to_string()))?;
    let parsed = base.join(url).map_err(|e| invalid(e.to_string()))?;

    if parsed.origin() != *origin {
        return Err(invalid(format!(
            "origin {} does not match {}",
            parsed.origin().ascii_serialization(),
            expected
        )));
    }

    Ok(format!("{}{}", expected, parsed.path()))
}
