use crate::error::ApiError;

pub const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

/// Page size for a listing; `None` means [`DEFAULT_LIMIT`].
pub fn resolve_limit(limit: Option<usize>) -> Result<usize, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    Ok(limit)
}
