use std::sync::Arc;

use crate::{NormalizedTensor, Result};

/// A loaded classifier: maps one normalized image to per-class scores.
///
/// Implementations are shared read-only between requests, hence `Send + Sync`.
pub trait Model: Send + Sync {
    fn forward(&self, input: &NormalizedTensor) -> Result<Vec<f32>>;
}

impl<M: Model + ?Sized> Model for Arc<M> {
    fn forward(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
        (**self).forward(input)
    }
}

#[cfg(feature = "tensorflow")]
pub use self::saved_model::SavedModel;

#[cfg(feature = "tensorflow")]
mod saved_model {
    use std::path::Path;

    use log::debug;
    use tensorflow::{
        Graph, Operation, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Tensor,
        DEFAULT_SERVING_SIGNATURE_DEF_KEY,
    };

    use super::Model;
    use crate::{Error, NormalizedTensor, Result, Timer};

    /// TensorFlow SavedModel exported with a single-input, single-output
    /// serving signature.
    pub struct SavedModel {
        /// TensorFlow model graph
        graph: Graph,

        /// TensorFlow session
        session: Session,

        /// Operation fed with the image tensor
        input: String,

        /// Operation producing the class probabilities, and its output index
        output: (String, i32),
    }

    impl SavedModel {
        pub fn load(export_dir: &Path) -> Result<Self> {
            let mut t = Timer::new_start("Loading session");

            if !export_dir.is_dir() {
                return Err(Error::ModelLoad(format!(
                    "{} is not a SavedModel directory",
                    export_dir.display()
                )));
            }

            let mut graph = Graph::new();
            let bundle =
                SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)
                    .map_err(|e| Error::ModelLoad(e.to_string()))?;

            let signature = bundle
                .meta_graph_def()
                .get_signature(DEFAULT_SERVING_SIGNATURE_DEF_KEY)
                .map_err(|e| Error::ModelLoad(e.to_string()))?;

            if signature.inputs().len() != 1 || signature.outputs().len() != 1 {
                return Err(Error::ModelLoad(format!(
                    "expected one input and one output in '{}', found {} and {}",
                    DEFAULT_SERVING_SIGNATURE_DEF_KEY,
                    signature.inputs().len(),
                    signature.outputs().len()
                )));
            }

            // Both maps hold exactly one entry at this point.
            let (input, output) = match (
                signature.inputs().values().next(),
                signature.outputs().values().next(),
            ) {
                (Some(i), Some(o)) => (
                    i.name().name.clone(),
                    (o.name().name.clone(), o.name().index),
                ),
                _ => return Err(Error::ModelLoad("empty serving signature".to_owned())),
            };

            // Fail now rather than on the first request.
            graph
                .operation_by_name_required(&input)
                .and_then(|_| graph.operation_by_name_required(&output.0))
                .map_err(|e| Error::ModelLoad(e.to_string()))?;

            debug!("Serving signature: input '{}', output '{}:{}'", input, output.0, output.1);

            t.stop();

            Ok(SavedModel {
                graph,
                session: bundle.session,
                input,
                output,
            })
        }

        fn operation(&self, name: &str) -> Result<Operation> {
            Ok(self.graph.operation_by_name_required(name)?)
        }
    }

    impl Model for SavedModel {
        fn forward(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
            let mut t = Timer::new_start("Running session");

            let tensor = Tensor::new(&input.shape()).with_values(input.as_slice())?;

            let mut args = SessionRunArgs::new();
            args.add_feed(&self.operation(&self.input)?, 0, &tensor);
            let result = args.request_fetch(&self.operation(&self.output.0)?, self.output.1);

            self.session.run(&mut args)?;
            let output: Tensor<f32> = args.fetch(result)?;

            t.stop();

            Ok(output.to_vec())
        }
    }
}
