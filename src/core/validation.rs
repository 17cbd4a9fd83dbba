//! Validation of decoded configuration models.

use crate::error::ValidationError;

/// Checks a decoded configuration model before it is published.
///
/// Pair it with [`TypedConfig::validated`](crate::watch::TypedConfig::validated):
/// a model that fails validation is rejected like a malformed payload, and the
/// previously published model stays in place.
///
/// # Examples
///
/// ```rust
/// use hotswap_daemon::core::Validate;
/// use hotswap_daemon::error::ValidationError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct Routes {
///     listen_port: u16,
///     upstreams: Vec<String>,
/// }
///
/// impl Validate for Routes {
///     fn validate(&self) -> Result<(), ValidationError> {
///         let mut errors = Vec::new();
///         if self.listen_port == 0 {
///             errors.push(ValidationError::invalid_field("listen_port", "must be non-zero"));
///         }
///         if self.upstreams.is_empty() {
///             errors.push(ValidationError::invalid_field("upstreams", "at least one upstream"));
///         }
///
///         match errors.len() {
///             0 => Ok(()),
///             1 => Err(errors.remove(0)),
///             _ => Err(ValidationError::Multiple(errors)),
///         }
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the model.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing what is wrong.
    fn validate(&self) -> Result<(), ValidationError>;
}
