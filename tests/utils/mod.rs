use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use rasterize::{Rasterizer, RasterizerBackend, RasterizerError, RasterizerSettings};

/// Call recorded by [`FakeRasterizer`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Matrix {
        rasterizer: usize,
        name: String,
        columns: usize,
        rows: usize,
        transpose: bool,
        values: Vec<f32>,
    },
    Buffer {
        rasterizer: usize,
        name: String,
        values: Vec<f32>,
    },
    Render {
        rasterizer: usize,
        num_points: u32,
    },
}

impl Call {
    pub fn rasterizer(&self) -> usize {
        match self {
            Self::Matrix { rasterizer, .. }
            | Self::Buffer { rasterizer, .. }
            | Self::Render { rasterizer, .. } => *rasterizer,
        }
    }
}

/// How a rasterizer should fail on a given render call.
#[derive(Clone, Copy, Debug)]
pub enum RenderFailure {
    Graphics,
    ContextLost,
}

/// Backend producing recording rasterizers.
#[derive(Default)]
pub struct FakeBackend {
    /// Recorded calls of all rasterizers.
    pub calls: Arc<Mutex<Vec<Call>>>,
    /// Variable names known to the "compiled" shader program.
    pub known: Vec<String>,
    /// Number of created rasterizers.
    pub created: AtomicUsize,
    /// Fail next creation.
    pub fail_create: AtomicBool,
    /// Fail the n-th render call (0-based, counted across all rasterizers).
    pub fail_render: Option<(usize, RenderFailure)>,
    /// Render calls made so far.
    pub renders: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn failing_render(mut self, call: usize, failure: RenderFailure) -> Self {
        self.fail_render = Some((call, failure));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl RasterizerBackend for FakeBackend {
    type Rasterizer = FakeRasterizer;

    fn create(&self, settings: &RasterizerSettings) -> Result<FakeRasterizer, RasterizerError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(RasterizerError::ShaderCompilation(
                "0:1: syntax error".into(),
            ));
        }
        Ok(FakeRasterizer {
            id: self.created.fetch_add(1, Ordering::SeqCst),
            settings: settings.clone(),
            known: self.known.clone(),
            calls: self.calls.clone(),
            renders: self.renders.clone(),
            fail_render: self.fail_render,
            last_buffer: None,
        })
    }
}

/// Rasterizer recording all calls.
///
/// Renders every pixel as `[first value of last buffer, green clear, blue clear, num_points]`.
pub struct FakeRasterizer {
    id: usize,
    settings: RasterizerSettings,
    known: Vec<String>,
    calls: Arc<Mutex<Vec<Call>>>,
    renders: Arc<AtomicUsize>,
    fail_render: Option<(usize, RenderFailure)>,
    last_buffer: Option<f32>,
}

impl FakeRasterizer {
    fn check_name(&self, name: &str) -> Result<(), RasterizerError> {
        if self.known.iter().any(|known| known == name) {
            Ok(())
        } else {
            Err(RasterizerError::UnknownVariable(name.into()))
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn set_uniform_matrix(
        &mut self,
        name: &str,
        num_columns: usize,
        num_rows: usize,
        transpose: bool,
        matrix: &[f32],
    ) -> Result<(), RasterizerError> {
        self.check_name(name)?;
        self.calls.lock().push(Call::Matrix {
            rasterizer: self.id,
            name: name.into(),
            columns: num_columns,
            rows: num_rows,
            transpose,
            values: matrix.to_vec(),
        });
        Ok(())
    }

    fn set_shader_storage_buffer(&mut self, name: &str, data: &[f32]) -> Result<(), RasterizerError> {
        self.check_name(name)?;
        self.last_buffer = data.first().copied();
        self.calls.lock().push(Call::Buffer {
            rasterizer: self.id,
            name: name.into(),
            values: data.to_vec(),
        });
        Ok(())
    }

    fn render(&mut self, num_points: u32, result: &mut [f32]) -> Result<(), RasterizerError> {
        self.settings.check_output(result)?;
        let call = self.renders.fetch_add(1, Ordering::SeqCst);
        match self.fail_render {
            Some((n, RenderFailure::Graphics)) if n == call => {
                return Err(RasterizerError::Graphics("GL_OUT_OF_MEMORY".into()));
            }
            Some((n, RenderFailure::ContextLost)) if n == call => {
                return Err(RasterizerError::ContextLost("GL_CONTEXT_LOST".into()));
            }
            _ => {}
        }
        self.calls.lock().push(Call::Render {
            rasterizer: self.id,
            num_points,
        });
        let pixel = [
            self.last_buffer.unwrap_or(self.settings.clear.red),
            self.settings.clear.green,
            self.settings.clear.blue,
            num_points as f32,
        ];
        for chunk in result.chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(&pixel);
        }
        Ok(())
    }
}
