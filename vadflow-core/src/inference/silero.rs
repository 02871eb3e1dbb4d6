//! Silero VAD neural model.
//!
//! Wraps the official Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad>.
//!
//! Supports both the v3/v4 LSTM interface (separate `h`/`c` tensors) and the
//! v5 GRU interface (single `state` tensor). v5 additionally expects the
//! tail of the previous window (64 samples at 16 kHz, 32 at 8 kHz) prepended
//! to every input.
//!
//! ## Model I/O (v4 LSTM)
//!
//! | Name     | Shape      | DType | Direction |
//! |----------|------------|-------|-----------|
//! | `input`  | `[1, 512]` | f32   | in        |
//! | `sr`     | `[1]`      | i64   | in        |
//! | `h`      | `[2,1,64]` | f32   | in/out    |
//! | `c`      | `[2,1,64]` | f32   | in/out    |
//! | `output` | `[1, 1]`   | f32   | out       |
//! | `hn`     | `[2,1,64]` | f32   | out       |
//! | `cn`     | `[2,1,64]` | f32   | out       |
//!
//! ## Model I/O (v5 GRU)
//!
//! | Name     | Shape           | DType | Direction |
//! |----------|-----------------|-------|-----------|
//! | `input`  | `[1, 64 + 512]` | f32   | in        |
//! | `sr`     | `[1]`           | i64   | in        |
//! | `state`  | `[2,1,128]`     | f32   | in/out    |
//! | `output` | `[1, 1]`        | f32   | out       |
//! | `stateN` | `[2,1,128]`     | f32   | out       |

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::SessionInputValue;
use ort::value::Value;
use tracing::{info, warn};

use super::VadModel;
use crate::error::{Result, VadError};

/// v3/v4 LSTM state size: 2 layers × 1 batch × 64 units = 128 floats (each of h and c).
const LSTM_SIZE: usize = 128;
/// v5 GRU state size: 2 layers × 1 batch × 128 units = 256 floats.
const GRU_STATE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SileroIoMode {
    /// v3/v4 LSTM: separate `h` [2,1,64] and `c` [2,1,64] state tensors.
    StatefulLstm,
    /// v5 GRU: single `state` [2,1,128] tensor, output `stateN`.
    StatefulGru,
    /// No state passing (stateless fallback).
    Stateless,
}

/// Neural VAD using the Silero VAD ONNX model (v3/v4 LSTM or v5 GRU).
pub struct SileroModel {
    session: ort::session::Session,
    io_mode: SileroIoMode,
    sample_rate: u32,
    window: usize,
    context_size: usize,
    input_name: String,
    sr_name: Option<String>,
    output_name: String,
    // v3/v4 LSTM state names
    h_name: Option<String>,
    c_name: Option<String>,
    hn_name: Option<String>,
    cn_name: Option<String>,
    // v5 GRU state names
    state_name: Option<String>,
    state_out_name: Option<String>,
    // state buffers
    h: Vec<f32>,       // [2, 1, 64] row-major (LSTM h)
    c: Vec<f32>,       // [2, 1, 64] row-major (LSTM c)
    state: Vec<f32>,   // [2, 1, 128] row-major (GRU state)
    context: Vec<f32>, // tail of the previous window (GRU only)
}

impl SileroModel {
    /// Load the Silero VAD ONNX model from `path` for windows at `sample_rate`.
    ///
    /// # Errors
    /// - `VadError::InvalidOptions` unless `sample_rate` is 8000 or 16000.
    /// - `VadError::ModelNotFound` / `VadError::OnnxSession` on load failure.
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let (window, context_size) = match sample_rate {
            16_000 => (512, 64),
            8_000 => (256, 32),
            other => {
                return Err(VadError::InvalidOptions(format!(
                    "Silero VAD supports 8000 or 16000 Hz, got {other}"
                )))
            }
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(VadError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        info!(?path, sample_rate, window, "loading Silero VAD model");

        let session = SessionBuilder::new()
            .map_err(|e| VadError::OnnxSession(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| VadError::OnnxSession(e.to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let input_name = resolve_name(&input_names, &["input", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| VadError::OnnxSession("Silero model has no inputs".into()))?;
        let sr_name = resolve_name(&input_names, &["sr", "sample_rate"]);

        let h_name = resolve_name(&input_names, &["h", "state_h"]);
        let c_name = resolve_name(&input_names, &["c", "state_c"]);
        let state_name = resolve_name(&input_names, &["state", "h_0", "hidden"]);

        let output_name = resolve_name(&output_names, &["output", "speech_prob", "prob"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| VadError::OnnxSession("Silero model has no outputs".into()))?;
        let hn_name = resolve_name(&output_names, &["hn", "state_hn", "h_out"]);
        let cn_name = resolve_name(&output_names, &["cn", "state_cn", "c_out"]);
        let state_out_name =
            resolve_name(&output_names, &["stateN", "state_out", "h_0_out", "hn_out"]);

        let io_mode =
            if h_name.is_some() && c_name.is_some() && hn_name.is_some() && cn_name.is_some() {
                SileroIoMode::StatefulLstm
            } else if state_name.is_some() {
                SileroIoMode::StatefulGru
            } else {
                SileroIoMode::Stateless
            };

        info!(
            inputs = ?input_names,
            outputs = ?output_names,
            io_mode = ?io_mode,
            "Silero VAD ready"
        );

        Ok(Self {
            session,
            io_mode,
            sample_rate,
            window,
            context_size,
            input_name,
            sr_name,
            output_name,
            h_name,
            c_name,
            hn_name,
            cn_name,
            state_name,
            state_out_name,
            h: vec![0.0; LSTM_SIZE],
            c: vec![0.0; LSTM_SIZE],
            state: vec![0.0; GRU_STATE_SIZE],
            context: vec![0.0; context_size],
        })
    }

    /// Default path for the Silero VAD model file.
    pub fn default_model_path() -> PathBuf {
        default_models_dir().join("silero_vad.onnx")
    }

    fn model_input(&self, window: &[f32]) -> Vec<f32> {
        if self.io_mode != SileroIoMode::StatefulGru {
            return window.to_vec();
        }
        let mut input = Vec::with_capacity(self.context_size + window.len());
        input.extend_from_slice(&self.context);
        input.extend_from_slice(window);
        input
    }
}

/// Platform data directory for model files.
pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("vadflow").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vadflow")
            .join("models")
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

fn onnx_err(e: impl std::fmt::Display) -> VadError {
    VadError::OnnxSession(e.to_string())
}

impl VadModel for SileroModel {
    fn window_size_samples(&self) -> usize {
        self.window
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Run one window through the model; update recurrent state; return speech probability.
    fn predict(&mut self, window: &[f32]) -> Result<f32> {
        debug_assert_eq!(window.len(), self.window);

        let input = self.model_input(window);
        let input_arr = Array2::<f32>::from_shape_vec((1, input.len()), input).map_err(onnx_err)?;
        let input_val = Value::from_array(input_arr).map_err(onnx_err)?;

        let mut input_values: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        if let Some(sr_name) = &self.sr_name {
            let sr_arr = Array1::<i64>::from_elem(1, self.sample_rate as i64);
            let sr_val = Value::from_array(sr_arr).map_err(onnx_err)?;
            input_values.push((sr_name.clone(), sr_val.into()));
        }

        match self.io_mode {
            SileroIoMode::StatefulLstm => {
                let h_arr =
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone()).map_err(onnx_err)?;
                let c_arr =
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone()).map_err(onnx_err)?;
                let h_val = Value::from_array(h_arr).map_err(onnx_err)?;
                let c_val = Value::from_array(c_arr).map_err(onnx_err)?;
                if let Some(h_name) = &self.h_name {
                    input_values.push((h_name.clone(), h_val.into()));
                }
                if let Some(c_name) = &self.c_name {
                    input_values.push((c_name.clone(), c_val.into()));
                }
            }
            SileroIoMode::StatefulGru => {
                let state_arr = Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                    .map_err(onnx_err)?;
                if let Some(state_name) = &self.state_name {
                    input_values.push((
                        state_name.clone(),
                        Value::from_array(state_arr).map_err(onnx_err)?.into(),
                    ));
                }
            }
            SileroIoMode::Stateless => {}
        }

        let outputs = self.session.run(input_values).map_err(onnx_err)?;

        // Speech probability scalar from output [1, 1] (or closest available scalar output)
        let prob_output = outputs
            .get(self.output_name.as_str())
            .unwrap_or(&outputs[0]);
        let (_, prob_data) = prob_output.try_extract_tensor::<f32>().map_err(onnx_err)?;
        let prob = prob_data.first().copied().unwrap_or(0.0);

        let mut next_mode = self.io_mode;
        match self.io_mode {
            SileroIoMode::StatefulLstm => match (self.hn_name.as_ref(), self.cn_name.as_ref()) {
                (Some(hn_name), Some(cn_name)) => {
                    if let (Some(hn_out), Some(cn_out)) =
                        (outputs.get(hn_name.as_str()), outputs.get(cn_name.as_str()))
                    {
                        let (_, hn_data) = hn_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                        let (_, cn_data) = cn_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                        self.h = hn_data.to_vec();
                        self.c = cn_data.to_vec();
                    } else {
                        warn!("Silero LSTM state outputs missing; switching to stateless");
                        next_mode = SileroIoMode::Stateless;
                    }
                }
                _ => next_mode = SileroIoMode::Stateless,
            },
            SileroIoMode::StatefulGru => {
                if let Some(state_out_name) = &self.state_out_name {
                    if let Some(state_out) = outputs.get(state_out_name.as_str()) {
                        let (_, state_data) =
                            state_out.try_extract_tensor::<f32>().map_err(onnx_err)?;
                        self.state = state_data.to_vec();
                    } else {
                        warn!("Silero GRU state output missing; switching to stateless");
                        next_mode = SileroIoMode::Stateless;
                    }
                }
                let tail = window.len().saturating_sub(self.context_size);
                self.context.clear();
                self.context.extend_from_slice(&window[tail..]);
            }
            SileroIoMode::Stateless => {}
        }
        drop(outputs);
        self.io_mode = next_mode;

        Ok(prob)
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
        self.context.iter_mut().for_each(|v| *v = 0.0);
    }
}
