//! Backing-store error types.
//!
//! Store errors carry a well-known code plus a message. Transaction
//! cancellations additionally carry one [`CancellationReason`] per request
//! item, in request order.

use std::fmt;

use crate::types::CancellationReason;

/// Well-known store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum StoreErrorCode {
    /// Table not found.
    ResourceNotFoundException,
    /// Table already exists.
    ResourceInUseException,
    /// Condition check failed.
    ConditionalCheckFailedException,
    /// Transaction canceled; see the cancellation reasons.
    TransactionCanceledException,
    /// Transaction conflicts with another in-flight transaction.
    TransactionConflictException,
    /// Same client token reused with a different request payload.
    IdempotentParameterMismatchException,
    /// Validation error.
    #[default]
    ValidationException,
    /// Internal server error.
    InternalServerError,
}

impl StoreErrorCode {
    /// Returns the short error code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ResourceInUseException => "ResourceInUseException",
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
            Self::TransactionCanceledException => "TransactionCanceledException",
            Self::TransactionConflictException => "TransactionConflictException",
            Self::IdempotentParameterMismatchException => "IdempotentParameterMismatchException",
            Self::ValidationException => "ValidationException",
            Self::InternalServerError => "InternalServerError",
        }
    }

    /// Returns the code used inside a cancellation reason for this error.
    #[must_use]
    pub fn cancellation_code(&self) -> &'static str {
        match self {
            Self::ConditionalCheckFailedException => "ConditionalCheckFailed",
            Self::TransactionConflictException => "TransactionConflict",
            Self::ValidationException => "ValidationError",
            _ => self.as_str(),
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by the backing store.
#[derive(Debug)]
pub struct StoreError {
    /// The error code.
    pub code: StoreErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// Per-item reasons, only set for `TransactionCanceledException`.
    pub cancellation_reasons: Vec<CancellationReason>,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreError({}): {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl StoreError {
    /// Create a new `StoreError` from an error code.
    #[must_use]
    pub fn new(code: StoreErrorCode) -> Self {
        Self::with_message(code, code.as_str())
    }

    /// Create a new `StoreError` with a custom message.
    #[must_use]
    pub fn with_message(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cancellation_reasons: Vec::new(),
            source: None,
        }
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Table or resource not found.
    #[must_use]
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ResourceNotFoundException, message)
    }

    /// Table already exists.
    #[must_use]
    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ResourceInUseException, message)
    }

    /// Condition expression evaluated to false.
    #[must_use]
    pub fn conditional_check_failed(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ConditionalCheckFailedException, message)
    }

    /// Transaction canceled, with one reason per request item.
    #[must_use]
    pub fn transaction_canceled(reasons: Vec<CancellationReason>) -> Self {
        let codes: Vec<&str> = reasons.iter().map(|r| r.code.as_str()).collect();
        let mut err = Self::with_message(
            StoreErrorCode::TransactionCanceledException,
            format!(
                "Transaction cancelled, please refer cancellation reasons for specific reasons [{}]",
                codes.join(", ")
            ),
        );
        err.cancellation_reasons = reasons;
        err
    }

    /// Client token reused with a different payload.
    #[must_use]
    pub fn idempotent_parameter_mismatch(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::IdempotentParameterMismatchException, message)
    }

    /// Validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::ValidationException, message)
    }

    /// Internal server error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(StoreErrorCode::InternalServerError, message)
    }
}

/// Create a `StoreError` from an error code.
///
/// # Examples
///
/// ```
/// use docstack_model::store_error;
/// use docstack_model::error::StoreErrorCode;
///
/// let err = store_error!(ValidationException);
/// assert_eq!(err.code, StoreErrorCode::ValidationException);
///
/// let err = store_error!(ResourceNotFoundException, "Table not found");
/// assert_eq!(err.message, "Table not found");
/// ```
#[macro_export]
macro_rules! store_error {
    ($code:ident) => {
        $crate::error::StoreError::new($crate::error::StoreErrorCode::$code)
    };
    ($code:ident, $msg:expr) => {
        $crate::error::StoreError::with_message($crate::error::StoreErrorCode::$code, $msg)
    };
}
