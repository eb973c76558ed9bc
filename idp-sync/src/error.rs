pub use errors::{CacheError, IdentityError, IdentityResult, ProviderError, StorageError};

use idp_core::ProviderResult;

/// Turns a provider "no such identity" failure into an empty result.
pub(crate) fn absent_as_none<T>(result: ProviderResult<T>) -> IdentityResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into())
    }
}

/// Maps a malformed attribute bag to a validation error.
pub(crate) fn invalid_attributes(e: &serde_json::Error) -> IdentityError {
    IdentityError::validation("attributes", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_as_none() {
        let found: ProviderResult<u32> = Ok(7);
        assert_eq!(absent_as_none(found).unwrap(), Some(7));

        let missing: ProviderResult<u32> = Err(ProviderError::user_not_found("u1"));
        assert_eq!(absent_as_none(missing).unwrap(), None);

        let failed: ProviderResult<u32> = Err(ProviderError::new("INTERNAL_ERROR", "boom"));
        let err = absent_as_none(failed).unwrap_err();
        assert_eq!(err.code(), Some("INTERNAL_ERROR"));
    }
}
