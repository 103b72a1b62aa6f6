//! One-shot classification of a pre-recorded WAV file.
//!
//! Runs the same conditioning, transform, and classifier adapter as the live
//! pipeline against a file instead of the microphone. No window assembly and
//! no duplicate-suppression gate — the file is one window.

use std::path::Path;

use tracing::info;

use crate::{
    audio::wav,
    engine::EngineConfig,
    error::Result,
    features::{self, Spectrogram},
    inference::{self, Classification, ClassifierHandle},
};

/// Outcome of classifying a file.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// The waveform never exceeded the silence threshold; nothing was
    /// classified. A defined outcome, not an error.
    TooSilent,
    /// A label was produced.
    Detected(Classification),
}

/// Load `path` and classify its contents as a single analysis window.
///
/// The file's declared sample rate is trusted (a mismatch with the pipeline
/// rate is logged, not corrected). Inputs of any length are accepted: the
/// conditioning crop and pad bring them to the canonical length.
///
/// # Errors
/// `HarkError::WavLoad` for malformed files; classifier errors pass through.
pub fn classify_wav(
    path: &Path,
    config: &EngineConfig,
    classifier: &ClassifierHandle,
) -> Result<FileOutcome> {
    let audio = wav::load_mono_i16(path, config.sample_rate)?;
    info!(
        path = %path.display(),
        samples = audio.samples.len(),
        sample_rate = audio.sample_rate,
        "classifying file"
    );

    let spectrogram = Spectrogram::new();
    let Some(feature_matrix) =
        features::extract(&audio.samples, &config.features, &spectrogram)
    else {
        return Ok(FileOutcome::TooSilent);
    };

    let result = inference::classify(&feature_matrix, classifier)?;
    Ok(FileOutcome::Detected(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::StubClassifier;
    use std::path::PathBuf;

    fn temp_wav(name: &str, samples: &[i16]) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("hark-oneshot-{}-{name}", std::process::id()));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn loud_file_is_classified() {
        let samples: Vec<i16> = (0..16_000)
            .map(|i| if i % 2 == 0 { 9_000 } else { -9_000 })
            .collect();
        let path = temp_wav("loud.wav", &samples);

        let handle = ClassifierHandle::new(StubClassifier::favoring(6));
        let outcome =
            classify_wav(&path, &EngineConfig::default(), &handle).expect("classify");
        match outcome {
            FileOutcome::Detected(c) => {
                assert_eq!(c.label, "down");
                assert_eq!(c.display_label(), "DOWN");
            }
            FileOutcome::TooSilent => panic!("loud file reported as silent"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn quiet_file_is_too_silent() {
        let samples: Vec<i16> = (0..16_000)
            .map(|i| if i % 2 == 0 { 1_000 } else { -1_000 })
            .collect();
        let path = temp_wav("quiet.wav", &samples);

        let handle = ClassifierHandle::new(StubClassifier::favoring(0));
        let outcome =
            classify_wav(&path, &EngineConfig::default(), &handle).expect("classify");
        assert!(matches!(outcome, FileOutcome::TooSilent));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn short_file_still_classifies() {
        let mut samples = vec![0i16; 3_000];
        samples[1_500] = 20_000;
        samples[1_501] = -20_000;
        let path = temp_wav("short.wav", &samples);

        let handle = ClassifierHandle::new(StubClassifier::favoring(1));
        let outcome =
            classify_wav(&path, &EngineConfig::default(), &handle).expect("classify");
        assert!(matches!(outcome, FileOutcome::Detected(_)));
        let _ = std::fs::remove_file(&path);
    }
}
