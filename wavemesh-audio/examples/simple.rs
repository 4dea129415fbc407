use wavemesh_audio::{source::ScriptedSource, AnalysisConfig, Mode, Pipeline, DEFAULT_SAMPLE_RATE};

fn main() {
    let mut pipeline = Pipeline::new(AnalysisConfig::default()).unwrap();
    let output = pipeline.output();

    pipeline
        .start(
            ScriptedSource::new(DEFAULT_SAMPLE_RATE, [vec![0.5; 128]]),
            Mode::Spectrum,
        )
        .unwrap();

    while output.read().is_none() {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    pipeline.stop();
}
