use std::num::NonZeroUsize;

use wavemesh_audio::{
    source::ScriptedSource, AnalysisConfig, AnalysisResult, Mode, Pipeline, DEFAULT_SAMPLE_RATE,
};

fn main() {
    let config = AnalysisConfig {
        num_bands: NonZeroUsize::new(50).unwrap(),
        ..AnalysisConfig::default()
    };

    let mut pipeline = Pipeline::new(config).unwrap();
    let output = pipeline.output();

    pipeline
        .start(
            ScriptedSource::new(DEFAULT_SAMPLE_RATE, [vec![0.25; 128], vec![0.5; 128]]),
            Mode::Spectrum,
        )
        .unwrap();

    let result = loop {
        if let Some(result) = output.read() {
            break result;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    };

    let AnalysisResult::Spectrum { bands, .. } = result.as_ref() else {
        unreachable!();
    };
    assert_eq!(bands.len(), 50);

    pipeline.stop();
}
