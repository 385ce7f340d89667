//! Client query parsing and normalization to the index dimension.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("parameter 'query' is missing")]
    Missing,
    #[error("invalid feature value {token:?} at position {position}")]
    Parse { token: String, position: usize },
    #[error("too many feature values: got {len}, index dimension is {dimension}")]
    DimensionExceeded { len: usize, dimension: usize },
}

/// Parse whitespace-separated decimal feature values.
///
/// Blank input is [`QueryError::Missing`]; any token that is not a finite
/// number is [`QueryError::Parse`].
pub fn parse_query(text: &str) -> Result<Vec<f32>, QueryError> {
    let mut values = Vec::new();
    for (position, token) in text.split_whitespace().enumerate() {
        let value = token
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| QueryError::Parse {
                token: token.to_string(),
                position,
            })?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(QueryError::Missing);
    }
    Ok(values)
}

/// Fit a feature vector to `dimension`: shorter vectors are zero-padded on
/// the right, longer ones are rejected.
pub fn normalize(mut values: Vec<f32>, dimension: usize) -> Result<Vec<f32>, QueryError> {
    if values.len() > dimension {
        return Err(QueryError::DimensionExceeded {
            len: values.len(),
            dimension,
        });
    }
    values.resize(dimension, 0.0);
    Ok(values)
}
