use crate::error::{VizError, VizResult};

/// Bounds for one transform parameter. `min > max` is allowed and inverts the response.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    /// `min + (max - min) * feature`. The feature is expected in [0, 1] and is not clamped.
    pub fn interpolate(&self, feature: f64) -> f64 {
        self.min + (self.max - self.min) * feature
    }
}

/// Binds one feature column to one named transform and its parameter ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct ModifierMapping {
    pub transform: String,
    pub column: String,
    pub ranges: Vec<ParamRange>,
}

impl ModifierMapping {
    pub fn new<S: Into<String>>(
        transform: impl Into<String>,
        column: impl Into<String>,
        ranges: impl IntoIterator<Item = (S, (f64, f64))>,
    ) -> VizResult<Self> {
        let ranges = ranges
            .into_iter()
            .map(|(name, (min, max))| ParamRange { name: name.into(), min, max })
            .collect();
        let mapping = Self {
            transform: transform.into(),
            column: column.into(),
            ranges,
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Build from loosely-typed bounds (e.g. config arrays); each must hold exactly two values.
    pub fn from_bounds(
        transform: &str,
        column: &str,
        bounds: impl IntoIterator<Item = (String, Vec<f64>)>,
    ) -> VizResult<Self> {
        let mut pairs = Vec::new();
        for (name, values) in bounds {
            match values.as_slice() {
                [min, max] => pairs.push((name, (*min, *max))),
                other => {
                    return Err(VizError::InvalidMapping {
                        transform: transform.to_string(),
                        detail: format!(
                            "parameter '{}' needs [min, max], got {} value(s)",
                            name,
                            other.len()
                        ),
                    })
                }
            }
        }
        Self::new(transform, column, pairs)
    }

    fn validate(&self) -> VizResult<()> {
        let invalid = |detail: String| VizError::InvalidMapping {
            transform: self.transform.clone(),
            detail,
        };
        if self.ranges.is_empty() {
            return Err(invalid("no parameter ranges".into()));
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if !(range.min.is_finite() && range.max.is_finite()) {
                return Err(invalid(format!("parameter '{}' has a non-finite bound", range.name)));
            }
            if self.ranges[..i].iter().any(|r| r.name == range.name) {
                return Err(invalid(format!("parameter '{}' is bound twice", range.name)));
            }
        }
        Ok(())
    }
}
