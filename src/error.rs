use thiserror::Error;

/// Errors raised while building the feature table or synthesizing frames.
#[derive(Error, Debug)]
pub enum VizError {
    /// Extractor output with the wrong shape: length mismatches, unordered
    /// timestamps, empty series.
    #[error("invalid {what}: {detail}")]
    InputShape { what: &'static str, detail: String },

    /// `context` names the offending mapping or utility.
    #[error("{context} references unknown column '{column}'")]
    UnknownColumn { context: String, column: String },

    #[error("{context} references unknown transform '{name}'")]
    UnknownTransform { context: String, name: String },

    #[error("invalid mapping for '{transform}': {detail}")]
    InvalidMapping { transform: String, detail: String },

    #[error("invalid option {option}: {detail}")]
    InvalidOption { option: &'static str, detail: String },

    #[error("transform '{transform}' (mapping #{mapping}) failed at row {row}")]
    Transform {
        row: usize,
        mapping: usize,
        transform: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("frame sink failed at row {row}")]
    Sink {
        row: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl VizError {
    pub fn shape(what: &'static str, detail: impl Into<String>) -> Self {
        Self::InputShape { what, detail: detail.into() }
    }

    pub fn option(option: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidOption { option, detail: detail.into() }
    }
}

pub type VizResult<T> = Result<T, VizError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn wrapped_failures_print_their_cause_once() {
        let err = VizError::Sink { row: 7, source: anyhow::anyhow!("broken pipe") };
        assert_eq!(err.to_string(), "frame sink failed at row 7");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("broken pipe"));

        let chained = format!("{:#}", anyhow::Error::from(VizError::Transform {
            row: 2,
            mapping: 1,
            transform: "gaussian_blur".into(),
            source: anyhow::anyhow!("bad kernel"),
        }));
        assert_eq!(chained.matches("bad kernel").count(), 1);
    }
}
