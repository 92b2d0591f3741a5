use image::RgbImage;
use indicatif::ProgressBar;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::mapping::{ModifierMapping, ParamRange};
use super::transforms::{Params, TransformRegistry, TransformSpec};
use crate::error::{VizError, VizResult};
use crate::series::table::FeatureTable;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// A mapping with its column and transform looked up.
struct ResolvedMapping {
    column: usize,
    spec: TransformSpec,
    /// Parameter slot in the transform's declaration order, and its range
    bindings: Vec<(usize, ParamRange)>,
    label: String,
}

/// Renders one frame per feature-table row by running the mapping chain over a
/// fresh copy of the base image.
///
/// Rows are rendered in parallel within a batch and handed to the sink in strict
/// row order. Randomised transforms draw from a generator keyed on (seed, row),
/// so output does not depend on scheduling.
pub struct FrameSynthesizer<'a> {
    base: &'a RgbImage,
    table: &'a FeatureTable,
    chain: Vec<ResolvedMapping>,
    seed: u64,
    batch_size: usize,
}

impl<'a> FrameSynthesizer<'a> {
    /// Resolve every mapping up front; the first unknown column, transform or
    /// parameter fails the whole run.
    pub fn new(
        base: &'a RgbImage,
        table: &'a FeatureTable,
        mappings: &[ModifierMapping],
        registry: &TransformRegistry,
        seed: u64,
    ) -> VizResult<Self> {
        let mut chain = Vec::with_capacity(mappings.len());
        for (i, mapping) in mappings.iter().enumerate() {
            let label = format!("mapping #{} ({} <- '{}')", i, mapping.transform, mapping.column);

            let spec = *registry.get(&mapping.transform).ok_or_else(|| VizError::UnknownTransform {
                context: label.clone(),
                name: mapping.transform.clone(),
            })?;
            let column = table.position(&mapping.column).ok_or_else(|| VizError::UnknownColumn {
                context: label.clone(),
                column: mapping.column.clone(),
            })?;

            let mut bindings = Vec::with_capacity(mapping.ranges.len());
            for range in &mapping.ranges {
                let slot = spec.param_slot(&range.name).ok_or_else(|| VizError::InvalidMapping {
                    transform: mapping.transform.clone(),
                    detail: format!(
                        "{} has no parameter '{}' (expected one of: {})",
                        label,
                        range.name,
                        spec.params.iter().map(|p| p.name).collect::<Vec<_>>().join(", ")
                    ),
                })?;
                bindings.push((slot, range.clone()));
            }

            log::debug!("Resolved {} -> column {}, {} parameter(s)", label, column, bindings.len());
            chain.push(ResolvedMapping { column, spec, bindings, label });
        }

        Ok(Self {
            base,
            table,
            chain,
            seed,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn frame_count(&self) -> usize {
        self.table.len()
    }

    /// Parameter values for every mapping at `row`, in declaration order.
    /// Unbound parameters keep the transform defaults; a NaN feature reads as 0.
    pub fn params_at(&self, row: usize) -> Vec<Vec<f64>> {
        self.chain
            .iter()
            .map(|m| {
                let feature = self.table.value(m.column, row);
                let feature = if feature.is_nan() { 0.0 } else { feature };
                let mut values = m.spec.defaults();
                for (slot, range) in &m.bindings {
                    values[*slot] = range.interpolate(feature);
                }
                values
            })
            .collect()
    }

    /// Compose the chain left to right over a copy of the base image.
    pub fn render_row(&self, row: usize) -> VizResult<RgbImage> {
        let mut frame = self.base.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(row as u64);

        for (i, (mapping, values)) in self.chain.iter().zip(self.params_at(row)).enumerate() {
            if self.table.value(mapping.column, row).is_nan() {
                log::warn!("{}: feature is NaN at row {}, using parameter minimum", mapping.label, row);
            }
            let params = Params::new(mapping.spec.params, &values);
            (mapping.spec.apply)(&mut frame, &params, &mut rng).map_err(|source| VizError::Transform {
                row,
                mapping: i,
                transform: mapping.spec.name.to_string(),
                source,
            })?;
        }
        Ok(frame)
    }

    /// Render every row and hand frames to `sink` in ascending row order.
    ///
    /// Stops at the first failure; frames already handed over stay with the sink,
    /// nothing after the failing batch is rendered.
    pub fn run<F>(&self, mut sink: F, progress: Option<&ProgressBar>) -> VizResult<()>
    where
        F: FnMut(usize, RgbImage) -> anyhow::Result<()>,
    {
        let total = self.frame_count();
        let mut start = 0;
        while start < total {
            let end = (start + self.batch_size).min(total);
            let frames: Vec<VizResult<RgbImage>> = (start..end)
                .into_par_iter()
                .map(|row| self.render_row(row))
                .collect();

            for (row, frame) in (start..end).zip(frames) {
                sink(row, frame?).map_err(|source| VizError::Sink { row, source })?;
                if let Some(pb) = progress {
                    pb.set_position(row as u64 + 1);
                }
            }
            start = end;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn render_all(&self) -> VizResult<Vec<RgbImage>> {
        let mut frames = Vec::with_capacity(self.frame_count());
        self.run(
            |_, frame| {
                frames.push(frame);
                Ok(())
            },
            None,
        )?;
        Ok(frames)
    }
}
