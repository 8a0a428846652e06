//! Re-check a loaded model against a known sample from the reference dataset.

use log::info;

use crate::dataset::Dataset;
use crate::labels::{self, CLASS_NAMES};
use crate::{Error, FashionClassifier, NormalizedTensor, Prediction, Result};

#[derive(Debug)]
pub struct Validation {
    /// Position of the sample in the dataset
    pub sample_index: usize,

    /// Ground-truth class index
    pub true_class: usize,

    pub prediction: Prediction,
}

impl Validation {
    pub fn true_class_name(&self) -> &'static str {
        CLASS_NAMES[self.true_class]
    }

    pub fn is_correct(&self) -> bool {
        self.prediction.class_index() == self.true_class
    }
}

/// Classify the first sample labeled `class_name`.
///
/// Dataset pixels are already canonical 28×28 grayscale, so only the
/// normalization step applies. Returns `None` if no sample has that label.
pub fn validate(
    classifier: &FashionClassifier,
    dataset: &Dataset,
    class_name: &str,
) -> Result<Option<Validation>> {
    let target = labels::class_index(class_name)
        .ok_or_else(|| Error::UnknownClass(class_name.to_owned()))?;

    let sample_index = match dataset.first_of_class(target) {
        Some(i) => i,
        None => return Ok(None),
    };

    let pixels = dataset
        .image(sample_index)
        .ok_or_else(|| Error::Dataset(format!("no image for sample {}", sample_index)))?;

    info!(
        "Using sample {} (true class: {})",
        sample_index, CLASS_NAMES[target]
    );

    let input = NormalizedTensor::from_pixels(pixels)?;
    let prediction = classifier.run(&input)?;

    Ok(Some(Validation {
        sample_index,
        true_class: target,
        prediction,
    }))
}
