use super::ScoreBackend;
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

pub struct OrtBackend {
    session: Session,
    input_name: String,
    input_size: Option<(u32, u32)>,
}

impl ScoreBackend for OrtBackend {
    fn load_model(path: &str) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("Model {} declares no inputs", path))?;
        let input_name = input.name.clone();

        // NHWC [1, h, w, 3]; negative dims mean dynamic, fall back to the
        // configured size.
        let input_size = input
            .input_type
            .tensor_dimensions()
            .filter(|dims| dims.len() == 4 && dims[1] > 0 && dims[2] > 0)
            .map(|dims| (dims[2] as u32, dims[1] as u32));

        tracing::info!("Model loaded from {} (input size {:?})", path, input_size);
        Ok(Self {
            session,
            input_name,
            input_size,
        })
    }

    fn score(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(input.view())?
        ])?;

        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.into_owned())
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }
}
