use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;

use fashion_serve::dataset::{Dataset, Split};
use fashion_serve::labels::{self, CLASS_NAMES};
use fashion_serve::{validate, FashionClassifier};

use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "fashion-validate",
    about = "Check a Fashion-MNIST model against a known sample of the reference dataset"
)]
struct CmdArgs {
    #[structopt(help = "Export directory of TensorFlow SavedModel")]
    model_dir: String,

    #[structopt(help = "Directory holding the uncompressed Fashion-MNIST IDX files")]
    dataset_dir: String,

    #[structopt(
        long,
        default_value = "Ankle boot",
        parse(try_from_str = parse_class),
        help = "Class of the sample to classify"
    )]
    class: usize,

    #[structopt(long, default_value = "test", help = "Dataset split: test or train")]
    split: Split,
}

fn parse_class(name: &str) -> Result<usize, String> {
    labels::class_index(name)
        .ok_or_else(|| format!("unknown class '{}', expected one of {:?}", name, CLASS_NAMES))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let model_dir = PathBuf::from(args.model_dir);
    let dataset_dir = PathBuf::from(args.dataset_dir);

    let classifier = FashionClassifier::load(&model_dir)?;
    info!("Model '{}' loaded", model_dir.display());

    let dataset = Dataset::load(&dataset_dir, args.split)?;

    let class_name = CLASS_NAMES[args.class];

    let validation = match validate::validate(&classifier, &dataset, class_name)? {
        Some(validation) => validation,
        None => {
            println!("No '{}' sample found in the dataset.", class_name);
            return Ok(());
        }
    };

    let prediction = &validation.prediction;
    info!("{}", serde_json::to_string(prediction)?);

    println!("Sample index:    {}", validation.sample_index);
    println!("True class:      {}", validation.true_class_name());
    println!("Predicted class: {}", prediction.predicted_class());
    println!("Confidence:      {:.4}", prediction.confidence());
    println!("Probabilities:   {:?}", prediction.probabilities());

    if validation.is_correct() {
        println!("-> The model classified this sample correctly.");
    } else {
        println!(
            "-> MISMATCH: expected {}, got {}",
            validation.true_class_name(),
            prediction.predicted_class()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_defaults_to_ankle_boot() {
        let args = CmdArgs::from_iter_safe(&["fashion-validate", "model", "data"]).unwrap();

        assert_eq!(CLASS_NAMES[args.class], "Ankle boot");
        assert_eq!(args.split, Split::Test);
    }

    #[test]
    fn known_class_is_accepted() {
        let args = CmdArgs::from_iter_safe(&[
            "fashion-validate",
            "model",
            "data",
            "--class",
            "Sneaker",
            "--split",
            "train",
        ])
        .unwrap();

        assert_eq!(args.class, 7);
        assert_eq!(args.split, Split::Train);
    }

    #[test]
    fn unknown_class_is_rejected_before_loading_anything() {
        let err = CmdArgs::from_iter_safe(&["fashion-validate", "model", "data", "--class", "Hat"])
            .unwrap_err();

        assert!(err.message.contains("unknown class 'Hat'"));
    }
}
