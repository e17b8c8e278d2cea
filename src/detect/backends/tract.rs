#![cfg(feature = "backend-tract")]

//! tract-onnx detector backend.
//!
//! Wraps an SSD-style pretrained ONNX detector. The graph contract is the
//! common post-processed export shape: three outputs ordered boxes
//! `[1, N, 4]` (normalized `[ymin, xmin, ymax, xmax]`), classes `[1, N]`
//! (1-based COCO indices) and scores `[1, N]`. Frames are resampled to the
//! model input size in-memory; no network I/O, no disk writes beyond the
//! initial model load.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::RawFrame;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// COCO class labels, indexed by the 1-based class ids SSD exports emit.
/// Empty slots are ids the dataset skips.
const COCO_LABELS: [&str; 90] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "",
    "backpack",
    "umbrella",
    "",
    "",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "",
    "dining table",
    "",
    "",
    "toilet",
    "",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Map a 1-based COCO class id to its label.
fn coco_label(class_id: usize) -> Option<&'static str> {
    match COCO_LABELS.get(class_id.checked_sub(1)?) {
        Some(label) if !label.is_empty() => Some(label),
        _ => None,
    }
}

/// Tract-based detector backend.
pub struct TractBackend {
    model_path: PathBuf,
    model: Option<RunnableModel>,
    input_width: u32,
    input_height: u32,
    score_threshold: f32,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            input_width,
            input_height,
            score_threshold: 0.5,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    fn load_model(&self) -> Result<RunnableModel> {
        tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    self.model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.input_height as usize, self.input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    /// Resample the frame to the model input size and lay it out as NCHW
    /// f32 in 0..=1.
    fn build_input(&self, frame: &RawFrame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame pixel buffer did not match its dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );

        let width = self.input_width as usize;
        let height = self.input_height as usize;
        let pixels = resized.into_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn parse_outputs(&self, outputs: TVec<TValue>, frame: &RawFrame) -> Result<Vec<Detection>> {
        let boxes = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no box output"))?
            .to_array_view::<f32>()
            .context("box output tensor was not f32")?;
        let classes = outputs
            .get(1)
            .ok_or_else(|| anyhow!("model produced no class output"))?
            .to_array_view::<f32>()
            .context("class output tensor was not f32")?;
        let scores = outputs
            .get(2)
            .ok_or_else(|| anyhow!("model produced no score output"))?
            .to_array_view::<f32>()
            .context("score output tensor was not f32")?;

        let boxes = boxes.to_shape((boxes.len() / 4, 4)).context("box shape")?;
        let classes: Vec<usize> = classes.iter().map(|c| *c as usize).collect();
        let frame_w = frame.width() as f32;
        let frame_h = frame.height() as f32;

        let mut detections = Vec::new();
        for (i, score) in scores.iter().enumerate() {
            if *score < self.score_threshold {
                continue;
            }
            let Some(&class_id) = classes.get(i) else {
                continue;
            };
            let Some(label) = coco_label(class_id) else {
                continue;
            };
            let (ymin, xmin, ymax, xmax) = (boxes[(i, 0)], boxes[(i, 1)], boxes[(i, 2)], boxes[(i, 3)]);
            let x = (xmin * frame_w).clamp(0.0, frame_w);
            let y = (ymin * frame_h).clamp(0.0, frame_h);
            let width = ((xmax - xmin) * frame_w).max(0.0);
            let height = ((ymax - ymin) * frame_h).max(0.0);
            detections.push(Detection::new(
                BoundingBox::new(x, y, width, height),
                label,
                *score,
            ));
        }

        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(self.load_model()?);
        }
        Ok(())
    }

    fn detect(&mut self, frame: &RawFrame) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend not warmed up"))?;
        let input = self.build_input(frame)?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.parse_outputs(outputs, frame)
    }
}
