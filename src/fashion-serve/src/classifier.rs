use std::path::Path;

use image::DynamicImage;
use log::{debug, warn};
use serde::Serialize;

use crate::labels::{self, NUM_CLASSES};
use crate::preprocess::{self, NormalizedTensor};
use crate::{DebugSnapshots, Error, Model, Result, Timer};

/// Everything a request needs to classify an image. Built once at startup and
/// shared read-only afterwards.
pub struct FashionClassifier {
    /// Loaded model
    model: Box<dyn Model>,

    /// Where to keep the resized input of each request, if anywhere
    snapshots: Option<DebugSnapshots>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    /// Class name at the arg-max of `probabilities`
    predicted_class: String,

    /// Highest probability
    confidence: f32,

    /// One entry per class, index-aligned with `labels::CLASS_NAMES`
    probabilities: Vec<f32>,

    #[serde(skip)]
    class_index: usize,
}

impl Prediction {
    /// Check the model output and pick the most likely class. Ties go to the
    /// lowest index.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self> {
        if probabilities.len() != NUM_CLASSES {
            return Err(Error::InvalidOutput(format!(
                "expected {} probabilities, got {}",
                NUM_CLASSES,
                probabilities.len()
            )));
        }

        if let Some(bad) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::InvalidOutput(format!(
                "probability {} outside [0, 1]",
                bad
            )));
        }

        let (class_index, confidence) = probabilities.iter().enumerate().fold(
            (0, probabilities[0]),
            |best, (i, p)| if *p > best.1 { (i, *p) } else { best },
        );

        let predicted_class = labels::class_name(class_index)
            .ok_or_else(|| Error::InvalidOutput(format!("no class at index {}", class_index)))?
            .to_owned();

        Ok(Prediction {
            predicted_class,
            confidence,
            probabilities,
            class_index,
        })
    }

    pub fn predicted_class(&self) -> &str {
        &self.predicted_class
    }

    pub fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }
}

impl FashionClassifier {
    pub fn new(model: Box<dyn Model>) -> Self {
        FashionClassifier {
            model,
            snapshots: None,
        }
    }

    /// Load a TensorFlow SavedModel from `export_dir`.
    #[cfg(feature = "tensorflow")]
    pub fn load(export_dir: &Path) -> Result<Self> {
        let model = crate::SavedModel::load(export_dir)?;

        Ok(FashionClassifier::new(Box::new(model)))
    }

    /// Without TensorFlow there is no backend to load `export_dir` with.
    #[cfg(not(feature = "tensorflow"))]
    pub fn load(export_dir: &Path) -> Result<Self> {
        Err(Error::ModelLoad(format!(
            "cannot load {}: built without TensorFlow support",
            export_dir.display()
        )))
    }

    pub fn with_debug_snapshots(mut self, snapshots: DebugSnapshots) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Run the model on an already normalized tensor.
    pub fn run(&self, input: &NormalizedTensor) -> Result<Prediction> {
        let output = self.model.forward(input)?;
        debug!("Raw predictions: {:?}", output);

        Prediction::from_probabilities(output)
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Prediction> {
        let mut t = Timer::new_start("Resizing image");

        let canonical = preprocess::to_canonical(image);

        if let Some(snapshots) = &self.snapshots {
            if let Err(e) = snapshots.save(&canonical) {
                warn!("Could not save debug snapshot: {}", e);
            }
        }

        let input = NormalizedTensor::from_luma(&canonical)?;
        let (lo, hi) = input.range();
        debug!("Normalized values min/max: {:.4} / {:.4}", lo, hi);

        t.stop();

        self.run(&input)
    }

    pub fn classify_from_raw(&self, data: &[u8]) -> Result<Prediction> {
        let mut t = Timer::new_start("Load image from memory");

        let image = preprocess::decode(data)?;

        t.stop();

        self.classify(&image)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use image::{ImageOutputFormat, Luma, Rgb, RgbImage};

    use super::*;
    use crate::labels::CLASS_NAMES;
    use crate::model::fake::FixedModel;

    fn shoe_png() -> Vec<u8> {
        // Dark background with a bright sole and heel.
        let image = RgbImage::from_fn(64, 64, |x, y| {
            if (y > 44 && y < 56 && x > 6 && x < 58) || (y > 20 && y <= 44 && x > 36 && x < 56) {
                Rgb([230, 220, 210])
            } else {
                Rgb([10, 10, 10])
            }
        });

        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn softmax(logits: &[f32]) -> Vec<f32> {
        let exp: Vec<f32> = logits.iter().map(|l| l.exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.iter().map(|e| e / sum).collect()
    }

    #[test]
    fn prediction_reports_argmax() {
        let probs = softmax(&[0.1, 0.2, 0.0, 0.3, 0.1, 1.5, 0.2, 2.5, 0.4, 2.0]);
        let prediction = Prediction::from_probabilities(probs.clone()).unwrap();

        assert_eq!(prediction.predicted_class(), "Sneaker");
        assert_eq!(prediction.class_index(), 7);
        assert_eq!(prediction.confidence(), probs[7]);
        assert_eq!(prediction.probabilities(), probs.as_slice());
        assert!(probs.iter().all(|p| *p <= prediction.confidence()));
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let prediction = Prediction::from_probabilities(vec![0.1; NUM_CLASSES]).unwrap();

        assert_eq!(prediction.class_index(), 0);
        assert_eq!(prediction.predicted_class(), CLASS_NAMES[0]);
    }

    #[test]
    fn malformed_outputs_are_rejected() {
        let mut too_large = vec![0.0; NUM_CLASSES];
        too_large[3] = 1.5;
        let mut not_a_number = vec![0.0; NUM_CLASSES];
        not_a_number[0] = f32::NAN;
        let negative = vec![-0.1; NUM_CLASSES];

        for output in vec![vec![0.5; 9], vec![0.1; 11], vec![], too_large, not_a_number, negative] {
            match Prediction::from_probabilities(output) {
                Err(Error::InvalidOutput(_)) => {}
                other => panic!("expected invalid output, got {:?}", other),
            }
        }
    }

    #[test]
    fn serializes_response_fields_only() {
        let mut probs = vec![0.0; NUM_CLASSES];
        probs[1] = 1.0;
        let prediction = Prediction::from_probabilities(probs).unwrap();

        let json = serde_json::to_value(&prediction).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(json["predicted_class"], "Trouser");
        assert_eq!(json["confidence"], 1.0);
        assert_eq!(json["probabilities"].as_array().unwrap().len(), NUM_CLASSES);
    }

    #[test]
    fn classifies_rgb_shoe_image() {
        let model = Arc::new(FixedModel::new(softmax(&[
            0.0, -1.0, 0.0, -0.5, 0.0, 1.0, 0.0, 2.0, 0.5, 3.0,
        ])));
        let classifier = FashionClassifier::new(Box::new(model.clone()));

        let prediction = classifier.classify_from_raw(&shoe_png()).unwrap();

        assert!(CLASS_NAMES.contains(&prediction.predicted_class()));
        assert_eq!(prediction.predicted_class(), "Ankle boot");
        assert!(prediction.confidence() > 0.0 && prediction.confidence() < 1.0);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn decode_failure_skips_the_model() {
        let model = Arc::new(FixedModel::new(vec![0.1; NUM_CLASSES]));
        let classifier = FashionClassifier::new(Box::new(model.clone()));

        assert!(matches!(
            classifier.classify_from_raw(&[0u8, 1, 2, 3]),
            Err(Error::Image(_))
        ));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn snapshots_are_written_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let classifier = FashionClassifier::new(Box::new(FixedModel::new(vec![0.1; NUM_CLASSES])))
            .with_debug_snapshots(DebugSnapshots::new(tmp.path()).unwrap());

        classifier.classify_from_raw(&shoe_png()).unwrap();
        classifier.classify_from_raw(&shoe_png()).unwrap();

        let written: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(written.len(), 2);

        let saved = image::open(written[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(saved.to_luma8().dimensions(), (28, 28));
        assert!(saved.to_luma8().pixels().any(|p| *p != Luma([10])));
    }

    fn assert_model_load_error(result: Result<FashionClassifier>) {
        match result {
            Err(Error::ModelLoad(_)) => {}
            Err(e) => panic!("expected model load error, got {}", e),
            Ok(_) => panic!("expected model load error, got a classifier"),
        }
    }

    #[test]
    fn missing_model_directory_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();

        assert_model_load_error(FashionClassifier::load(&tmp.path().join("no_such_model")));
    }

    #[cfg(feature = "tensorflow")]
    #[test]
    fn directory_without_saved_model_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();

        assert_model_load_error(FashionClassifier::load(tmp.path()));
    }

    #[cfg(feature = "tensorflow")]
    #[test]
    fn corrupt_saved_model_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("saved_model.pb"), b"not a protobuf").unwrap();

        assert_model_load_error(FashionClassifier::load(tmp.path()));
    }
}
