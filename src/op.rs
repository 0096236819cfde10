//! Batched rasterization operation.

use std::{collections::HashSet, time::Duration};

use rasterize_pools::ResourcePool;
use tracing::{debug, debug_span, info, warn};

use crate::{
    config::{OutputResolution, RasterizeConfig},
    errors::RasterizeError,
    rasterizer::{Rasterizer, RasterizerBackend, RasterizerError, RasterizerManager, PIXEL_CHANNELS},
    tensor::{DType, Tensor, TensorData, TensorShape},
    variable::{BoundVariable, VariableKind, VariableSpec},
};

/// Pool of rasterizers built by backend `B`.
pub type RasterizerPool<B> = ResourcePool<RasterizerManager<B>>;

/// Operation rendering one image per batch element of its shader variables.
///
/// Each call takes the number of points to draw and one tensor per declared variable. A `mat`
/// variable of shape `[..batch, rows, cols]` is bound as a uniform matrix, a `buffer` variable
/// of shape `[..batch, len]` is uploaded as a shader storage buffer. All variables must share
/// the same batch dimensions. The output has shape `[..batch, height, width, 4]`.
///
/// The operation may be called from many threads at once; each call borrows its own
/// rasterizer from an internal pool.
pub struct RasterizeOp<B: RasterizerBackend> {
    /// Declared variables, in input order.
    variables: Vec<VariableSpec>,
    /// Size of rendered images.
    resolution: OutputResolution,
    /// How long to wait for a free rasterizer.
    acquire_timeout: Option<Duration>,
    /// Rasterizer pool.
    pool: RasterizerPool<B>,
}

impl<B: RasterizerBackend> RasterizeOp<B> {
    /// Create operation from configuration.
    ///
    /// No rasterizer is created until the first call.
    ///
    /// # Errors
    ///
    /// Returns `Err` if variable declarations are inconsistent, or if output resolution is
    /// empty.
    pub fn new(config: &RasterizeConfig, backend: B) -> Result<Self, RasterizeError> {
        let names = &config.variable_names;
        let kinds = &config.variable_kinds;
        if names.len() != kinds.len() {
            return Err(RasterizeError::KindCountMismatch {
                names: names.len(),
                kinds: kinds.len(),
            });
        }
        let mut seen = HashSet::with_capacity(names.len());
        let variables = names
            .iter()
            .zip(kinds)
            .map(|(name, kind)| {
                if !seen.insert(name.as_str()) {
                    return Err(RasterizeError::DuplicateVariable { name: name.clone() });
                }
                let kind = kind
                    .parse::<VariableKind>()
                    .map_err(|kind| RasterizeError::UnknownKind {
                        name: name.clone(),
                        kind,
                    })?;
                Ok(VariableSpec {
                    name: name.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let resolution = config.output_resolution;
        if resolution.width == 0 || resolution.height == 0 {
            return Err(RasterizeError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }
        let manager = RasterizerManager::new(backend, config.rasterizer_settings());
        let mut pool = ResourcePool::builder(manager)
            .max_size_opt(config.pool.max_size)
            .probe_interval(config.pool.probe_interval);
        if let Some(label) = &config.pool.label {
            pool = pool.label(label.clone());
        }
        info!(
            width = resolution.width,
            height = resolution.height,
            variables = variables.len(),
            "rasterize operation configured"
        );
        Ok(Self {
            variables,
            resolution,
            acquire_timeout: config.pool.acquire_timeout,
            pool: pool.build(),
        })
    }

    /// Declared variables, in input order.
    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// Rasterizer pool used by this operation.
    pub fn pool(&self) -> &RasterizerPool<B> {
        &self.pool
    }

    /// Number of values in a single rendered image.
    pub fn image_size(&self) -> usize {
        self.resolution.width * self.resolution.height * PIXEL_CHANNELS
    }

    /// Output shape for a given batch shape.
    pub fn output_shape(&self, batch_shape: &TensorShape) -> TensorShape {
        let image = TensorShape::from([self.resolution.height, self.resolution.width, PIXEL_CHANNELS]);
        let mut shape = batch_shape.clone();
        shape.append_shape(&image);
        shape
    }

    /// Check input values against declared variables.
    ///
    /// Returns the common batch shape.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the number of values is wrong, if a value has an unsupported type or
    /// too few dimensions, or if batch shapes of variables differ.
    pub fn validate_variables(&self, values: &[Tensor]) -> Result<TensorShape, RasterizeError> {
        self.bind_variables(values).map(|(batch_shape, _)| batch_shape)
    }

    /// Render all batch elements.
    ///
    /// Either the whole batch is rendered, or an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Err` if inputs are invalid, if no rasterizer could be acquired, or if the
    /// rasterizer failed on any batch element.
    pub fn compute(&self, num_points: &Tensor, values: &[Tensor]) -> Result<Tensor, RasterizeError> {
        let (batch_shape, variables) = self.bind_variables(values)?;
        let num_points = parse_num_points(num_points)?;
        let batch_size = batch_shape.num_elements();
        let _span = debug_span!("rasterize", batch = %batch_shape, num_points).entered();
        let image_size = self.image_size();
        let mut output = vec![0.0_f32; batch_size * image_size];
        if batch_size > 0 {
            let mut rasterizer = match self.acquire_timeout {
                Some(timeout) => self.pool.get_timeout(timeout)?,
                None => self.pool.get()?,
            };
            for (element, image) in output.chunks_exact_mut(image_size).enumerate() {
                let rendered = render_element(&mut *rasterizer, &variables, element, num_points, image);
                if let Err(source) = rendered {
                    if source.is_fatal() {
                        warn!(element, error = %source, "rasterizer unusable, discarding");
                        rasterizer.discard();
                    }
                    return Err(RasterizeError::Render { element, source });
                }
            }
        }
        debug!(batch_size, "batch rendered");
        Ok(Tensor::new(
            self.output_shape(&batch_shape),
            TensorData::Float(output),
        )?)
    }

    fn bind_variables<'a>(
        &'a self,
        values: &'a [Tensor],
    ) -> Result<(TensorShape, Vec<BoundVariable<'a>>), RasterizeError> {
        if values.len() != self.variables.len() {
            return Err(RasterizeError::ValueCountMismatch {
                expected: self.variables.len(),
                actual: values.len(),
            });
        }
        let mut batch_shape: Option<TensorShape> = None;
        let mut bound = Vec::with_capacity(values.len());
        for (spec, value) in self.variables.iter().zip(values) {
            let (variable, variable_batch) = BoundVariable::bind(spec, value)?;
            match &batch_shape {
                None => batch_shape = Some(variable_batch),
                Some(expected) if *expected != variable_batch => {
                    return Err(RasterizeError::IncompatibleBatchShape {
                        name: spec.name.clone(),
                        batch_shape: variable_batch,
                        expected: expected.clone(),
                    });
                }
                Some(_) => {}
            }
            bound.push(variable);
        }
        Ok((batch_shape.unwrap_or_default(), bound))
    }
}

impl<B: RasterizerBackend> std::fmt::Debug for RasterizeOp<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterizeOp")
            .field("variables", &self.variables)
            .field("resolution", &self.resolution)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Upload variables of one batch element and render it.
fn render_element<R>(
    rasterizer: &mut R,
    variables: &[BoundVariable<'_>],
    element: usize,
    num_points: u32,
    image: &mut [f32],
) -> Result<(), RasterizerError>
where
    R: Rasterizer + ?Sized,
{
    for variable in variables {
        variable.upload(rasterizer, element)?;
    }
    rasterizer.render(num_points, image)
}

/// Extract point count from a scalar int32 tensor.
fn parse_num_points(num_points: &Tensor) -> Result<u32, RasterizeError> {
    let invalid = || RasterizeError::InvalidNumPoints {
        shape: num_points.shape().clone(),
        dtype: num_points.dtype(),
    };
    if num_points.shape().rank() != 0 || num_points.dtype() != DType::Int32 {
        return Err(invalid());
    }
    match num_points.data() {
        TensorData::Int32(v) => v
            .first()
            .and_then(|&n| u32::try_from(n).ok())
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
