//! Error types for butterfly-probe
//!
//! Setup-time failures (configuration, binding availability, exhausted
//! generation) surface through [`Error`]. Per-request transport failures never
//! do: the dispatcher folds them into an absent distance.

use std::fmt;

use strsim::damerau_levenshtein;

/// Algorithms understood by OSRM-compatible engines
pub const KNOWN_ALGORITHMS: &[&str] = &["CH", "CoreCH", "MLD"];

/// Suggest the closest known algorithm name for a misspelled one
///
/// Returns `None` for exact (case-insensitive) matches and for inputs too far
/// from every known name to be a plausible typo.
pub fn suggest_algorithm(input: &str) -> Option<String> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    // About a third of the word length, minimum 1
    let max_distance = (input.len() / 3).max(1);

    for candidate in KNOWN_ALGORITHMS {
        let candidate_lower = candidate.to_lowercase();
        let distance = damerau_levenshtein(&input_lower, &candidate_lower);
        if distance == 0 {
            return None;
        }

        if distance <= max_distance && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Main error type for butterfly-probe operations
#[derive(Debug)]
pub enum Error {
    /// Bounding box failed parsing or validation
    InvalidBbox(String),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// Native transport requested but the routing binding cannot be loaded
    BindingUnavailable(String),

    /// Native engine construction failed inside a worker
    EngineInit(String),

    /// Operation not provided by the selected transport
    UnsupportedOperation(String),

    /// No acceptable pair found within the retry ceiling
    GenerationExhausted { attempts: u64 },

    /// Malformed line in a locations file
    Parse { line: usize, message: String },

    /// HTTP-specific error
    HttpError(String),

    /// Network connectivity issues
    NetworkError(String),

    /// Routing engine answered, but the answer could not be used
    RoutingError(String),

    /// File I/O error
    IoError(std::io::Error),

    /// A worker thread panicked
    WorkerPanicked,
}

impl Error {
    /// Whether this error belongs to the configuration class (user error,
    /// reported before any worker starts)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidBbox(_)
                | Error::InvalidInput(_)
                | Error::BindingUnavailable(_)
                | Error::UnsupportedOperation(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidBbox(msg) => {
                write!(f, "Bbox invalid: {msg}")
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::BindingUnavailable(msg) => {
                write!(f, "OSRM native bindings are not available: {msg}")
            }
            Error::EngineInit(msg) => {
                write!(f, "Failed to initialize routing engine: {msg}")
            }
            Error::UnsupportedOperation(msg) => {
                write!(f, "Unsupported operation: {msg}")
            }
            Error::GenerationExhausted { attempts } => {
                write!(
                    f,
                    "No location pair satisfied the distance limits after {attempts} attempts; \
                     widen the bounding box or relax the limits"
                )
            }
            Error::Parse { line, message } => {
                write!(f, "Line {line}: {message}")
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {msg}")
            }
            Error::NetworkError(msg) => {
                write!(f, "Network error: {msg}")
            }
            Error::RoutingError(msg) => {
                write!(f, "Routing error: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            Error::WorkerPanicked => {
                write!(f, "A worker thread panicked")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

/// Convenience result type for butterfly-probe operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_algorithm_typos() {
        assert_eq!(suggest_algorithm("MDL"), Some("MLD".to_string()));
        assert_eq!(suggest_algorithm("corech"), None);
        assert_eq!(suggest_algorithm("CoreC"), Some("CoreCH".to_string()));
    }

    #[test]
    fn test_suggest_algorithm_exact_match() {
        assert_eq!(suggest_algorithm("MLD"), None);
        assert_eq!(suggest_algorithm("mld"), None);
        assert_eq!(suggest_algorithm("ch"), None);
    }

    #[test]
    fn test_suggest_algorithm_no_match() {
        assert_eq!(suggest_algorithm("dijkstra-with-landmarks"), None);
    }

    #[test]
    fn test_configuration_class() {
        assert!(Error::InvalidBbox("x".into()).is_configuration());
        assert!(Error::BindingUnavailable("x".into()).is_configuration());
        assert!(!Error::GenerationExhausted { attempts: 3 }.is_configuration());
        assert!(!Error::NetworkError("x".into()).is_configuration());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::GenerationExhausted { attempts: 42 };
        assert!(err.to_string().contains("42 attempts"));

        let err = Error::Parse { line: 3, message: "expected ')'".into() };
        assert_eq!(err.to_string(), "Line 3: expected ')'");
    }
}
