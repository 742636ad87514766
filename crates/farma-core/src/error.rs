//! # Error Types
//!
//! Domain-specific error types for farma-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  farma-core errors (this file)                                         │
//! │  └── CoreError                                                          │
//! │      ├── MalformedDocument       - not well-formed XML                 │
//! │      └── InvalidInvoiceStructure - XML, but not a usable NFe           │
//! │                                                                         │
//! │  farma-db errors (separate crate)                                      │
//! │  └── DbError          - ConstraintViolation, TransactionAborted, ...   │
//! │                                                                         │
//! │  farma-ingest errors (app)                                             │
//! │  └── IngestError      - any of the above + originating file path       │
//! │                                                                         │
//! │  Flow: CoreError → FileError → per-file failure entry in BatchReport   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while turning XML text into an invoice record.
///
/// Both variants are fatal for the file being processed and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The input is not well-formed XML.
    ///
    /// ## When This Occurs
    /// - Mismatched or unclosed tags
    /// - Invalid entity references or attribute syntax
    /// - No root element, or more than one
    #[error("Malformed XML document: {reason}")]
    MalformedDocument { reason: String },

    /// The XML parsed, but it is not an NFe we can ingest.
    ///
    /// ## When This Occurs
    /// - Neither `nfeProc/NFe/infNFe` nor `NFe/infNFe` exists
    /// - A required field (CNPJ, number, access key, ...) is missing
    /// - The invoice has no `det` line items
    /// - A numeric field does not parse
    #[error("Invalid invoice structure: {reason}")]
    InvalidInvoiceStructure { reason: String },
}

impl CoreError {
    /// Creates a `MalformedDocument` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedDocument {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidInvoiceStructure` error.
    pub fn invalid_structure(reason: impl Into<String>) -> Self {
        CoreError::InvalidInvoiceStructure {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidInvoiceStructure` error for a missing field path.
    pub fn missing_field(path: &str) -> Self {
        CoreError::invalid_structure(format!("missing required field {path}"))
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::malformed("unexpected end of file");
        assert_eq!(
            err.to_string(),
            "Malformed XML document: unexpected end of file"
        );

        let err = CoreError::missing_field("emit/CNPJ");
        assert_eq!(
            err.to_string(),
            "Invalid invoice structure: missing required field emit/CNPJ"
        );
    }
}
