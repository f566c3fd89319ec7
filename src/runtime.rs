//! Inference runtime adapter.
//!
//! Wraps the ONNX runtime behind the `InferenceSession`/`SessionLoader`
//! traits so the pipeline stages never see the inference library directly
//! and tests can substitute scripted sessions.

use crate::error::{HearkenError, Result};
use ndarray::{ArrayD, IxDyn};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A tensor crossing the adapter boundary. Only f32 and i64 appear in the
/// model contracts.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32 { shape: Vec<usize>, data: Vec<f32> },
    I64 { shape: Vec<usize>, data: Vec<i64> },
}

impl TensorData {
    pub fn f32(shape: Vec<usize>, data: Vec<f32>) -> Self {
        TensorData::F32 { shape, data }
    }

    pub fn i64(shape: Vec<usize>, data: Vec<i64>) -> Self {
        TensorData::I64 { shape, data }
    }

    /// Scalar f32 convenience constructor for test scripts.
    pub fn scalar(value: f32) -> Self {
        TensorData::F32 {
            shape: vec![1],
            data: vec![value],
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TensorData::F32 { data, .. } => Some(data),
            TensorData::I64 { .. } => None,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::F32 { shape, .. } => shape,
            TensorData::I64 { shape, .. } => shape,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32 { data, .. } => data.len(),
            TensorData::I64 { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded model ready to run forward passes.
///
/// Inputs are named tensors; outputs come back as (name, tensor) pairs in
/// the model's declared output order.
pub trait InferenceSession: Send {
    fn run(&mut self, inputs: &[(&str, TensorData)]) -> Result<Vec<(String, TensorData)>>;
}

/// Creates sessions from model files.
///
/// This is the seam the supervisor uses at init(); tests inject a
/// `ScriptedLoader` here.
pub trait SessionLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceSession>>;
}

/// Production loader backed by ONNX Runtime.
///
/// Sessions are single-threaded (intra=1, inter=1) with full graph
/// optimization; the pipeline provides its own parallelism.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtLoader;

impl SessionLoader for OrtLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(1))
            .and_then(|builder| builder.with_inter_threads(1))
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| HearkenError::ModelLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|o| o.name.clone())
            .collect();

        Ok(Box::new(OrtSession {
            session,
            output_names,
        }))
    }
}

/// An ONNX Runtime session behind the adapter trait.
pub struct OrtSession {
    session: Session,
    output_names: Vec<String>,
}

impl OrtSession {
    fn f32_tensor(tensor: &TensorData) -> Result<Tensor<f32>> {
        match tensor {
            TensorData::F32 { shape, data } => {
                let array = ArrayD::from_shape_vec(IxDyn(shape), data.clone())
                    .map_err(|e| inference_error(&e.to_string()))?;
                Tensor::from_array(array).map_err(|e| inference_error(&e.to_string()))
            }
            TensorData::I64 { .. } => Err(inference_error("expected f32 tensor, got i64")),
        }
    }

    fn i64_tensor(tensor: &TensorData) -> Result<Tensor<i64>> {
        match tensor {
            TensorData::I64 { shape, data } => {
                let array = ArrayD::from_shape_vec(IxDyn(shape), data.clone())
                    .map_err(|e| inference_error(&e.to_string()))?;
                Tensor::from_array(array).map_err(|e| inference_error(&e.to_string()))
            }
            TensorData::F32 { .. } => Err(inference_error("expected i64 tensor, got f32")),
        }
    }
}

fn inference_error(message: &str) -> HearkenError {
    HearkenError::Inference {
        message: message.to_string(),
    }
}

/// Copy every session output into `TensorData`, pairing by output order.
fn extract_outputs<O>(output_names: &[String], outputs: &O) -> Result<Vec<(String, TensorData)>>
where
    O: std::ops::Index<usize, Output = ort::value::DynValue>,
{
    let mut result = Vec::with_capacity(output_names.len());

    for (index, name) in output_names.iter().enumerate() {
        let f32_view: std::result::Result<ndarray::ArrayViewD<'_, f32>, _> =
            outputs[index].try_extract_array();
        if let Ok(view) = f32_view {
            result.push((
                name.clone(),
                TensorData::F32 {
                    shape: view.shape().to_vec(),
                    data: view.iter().copied().collect(),
                },
            ));
            continue;
        }

        let i64_view: ndarray::ArrayViewD<'_, i64> = outputs[index]
            .try_extract_array()
            .map_err(|e| inference_error(&e.to_string()))?;
        result.push((
            name.clone(),
            TensorData::I64 {
                shape: i64_view.shape().to_vec(),
                data: i64_view.iter().copied().collect(),
            },
        ));
    }

    Ok(result)
}

impl InferenceSession for OrtSession {
    fn run(&mut self, inputs: &[(&str, TensorData)]) -> Result<Vec<(String, TensorData)>> {
        match inputs {
            // Single-input models (mel, embedding, wake word) bind positionally.
            [(_, tensor)] => {
                let input = Self::f32_tensor(tensor)?;
                let outputs = self
                    .session
                    .run(ort::inputs![input])
                    .map_err(|e| inference_error(&e.to_string()))?;
                extract_outputs(&self.output_names, &outputs)
            }
            // The VAD model takes (input, state, sr) bound by name.
            [(n0, t0 @ TensorData::F32 { .. }), (n1, t1 @ TensorData::F32 { .. }), (n2, t2 @ TensorData::I64 { .. })] =>
            {
                let input = Self::f32_tensor(t0)?;
                let state = Self::f32_tensor(t1)?;
                let sr = Self::i64_tensor(t2)?;
                let outputs = self
                    .session
                    .run(ort::inputs![*n0 => input, *n1 => state, *n2 => sr])
                    .map_err(|e| inference_error(&e.to_string()))?;
                extract_outputs(&self.output_names, &outputs)
            }
            _ => Err(inference_error(
                "unsupported input arity for this session adapter",
            )),
        }
    }
}

/// Scripted session for tests: a closure produces each call's outputs.
pub struct ScriptedSession {
    script: Box<dyn FnMut(&[(&str, TensorData)]) -> Result<Vec<(String, TensorData)>> + Send>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSession {
    /// Session that returns the same outputs on every call.
    pub fn fixed(outputs: Vec<(String, TensorData)>) -> Self {
        Self::from_fn(move |_| Ok(outputs.clone()))
    }

    /// Session driven by an arbitrary closure over the call inputs.
    pub fn from_fn<F>(script: F) -> Self
    where
        F: FnMut(&[(&str, TensorData)]) -> Result<Vec<(String, TensorData)>> + Send + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Session that fails every call with an inference error.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::from_fn(move |_| Err(inference_error(&message)))
    }

    /// Shared call counter, cloneable before the session moves into a stage.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl InferenceSession for ScriptedSession {
    fn run(&mut self, inputs: &[(&str, TensorData)]) -> Result<Vec<(String, TensorData)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(inputs)
    }
}

type SessionFactory = Box<dyn Fn() -> Box<dyn InferenceSession> + Send + Sync>;

/// Loader that resolves model file stems to scripted session factories.
#[derive(Default)]
pub struct ScriptedLoader {
    factories: std::collections::HashMap<String, SessionFactory>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for models whose file stem matches `stem`.
    pub fn with_model<F>(mut self, stem: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn InferenceSession> + Send + Sync + 'static,
    {
        self.factories.insert(stem.to_string(), Box::new(factory));
        self
    }
}

impl SessionLoader for ScriptedLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceSession>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        match self.factories.get(&stem) {
            Some(factory) => Ok(factory()),
            None => Err(HearkenError::ModelLoad {
                path: path.display().to_string(),
                message: "no scripted session registered".to_string(),
            }),
        }
    }
}
