use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::*;

use crate::preprocess::InputSize;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A face pose ONNX graph prepared for execution.
#[derive(Debug)]
pub struct PoseModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl PoseModel {
    /// Load and optimize the ONNX graph for a fixed input size.
    ///
    /// Falls back to a decluttered (unoptimized) plan when optimization fails.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, input_size, true) {
            Ok(model) => {
                debug!(
                    "pose model {} optimized ({}x{})",
                    path.display(),
                    input_size.width,
                    input_size.height
                );
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "pose model {} failed optimized load ({}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, input_size, false).with_context(|| {
                    format!(
                        "fallback to decluttered pose graph failed after optimize error: {optimize_msg}"
                    )
                })?
            }
        };

        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Run the graph and return its first output.
    pub fn run(&self, input: Tensor) -> Result<Tensor> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("pose model execution failed: {e}"))?;

        outputs
            .into_iter()
            .next()
            .map(|value| value.into_tensor())
            .ok_or_else(|| anyhow::anyhow!("pose model produced no outputs"))
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }
}

fn load_runnable_model(path: &Path, input_size: InputSize, optimized: bool) -> Result<RunnableModel> {
    let shape = [
        1usize,
        3,
        input_size.height as usize,
        input_size.width as usize,
    ];
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(shape).into())
        .map_err(|e| anyhow::anyhow!("unable to pin pose model input shape: {e}"))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize pose graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make pose graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check pose graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter pose graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make pose graph runnable: {e}"))
    }
}
