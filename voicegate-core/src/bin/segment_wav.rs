//! Offline segmentation runner.
//!
//! Feeds a WAV file through the conditioning chain (bandpass → gain → VAD)
//! with a synthetic clock derived from the sample count, then prints a JSON
//! report of the segments the engine would have emitted. Useful for tuning
//! thresholds against recorded material without a live capture source.

fn main() {
    if let Err(e) = run() {
        eprintln!("segment_wav failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use serde::Serialize;
    use std::path::{Path, PathBuf};

    use voicegate_core::{
        dsp::{bandpass::BandpassStage, gain::GainStage, level},
        FlushReason, PipelineConfig, SegmentationEngine,
    };

    #[derive(Debug)]
    struct Args {
        input: PathBuf,
        config: Option<PathBuf>,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct SegmentRow {
        index: usize,
        started_at_ms: u64,
        emitted_at_ms: u64,
        duration_secs: f64,
        samples: usize,
        reason: FlushReason,
        peak_level: f32,
    }

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Report {
        input: String,
        sample_rate: u32,
        total_samples: usize,
        total_secs: f32,
        segments: Vec<SegmentRow>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut input: Option<PathBuf> = None;
        let mut config: Option<PathBuf> = None;
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--config" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --config".into());
                    };
                    config = Some(PathBuf::from(v));
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p voicegate-core --bin segment_wav -- \\
  <input.wav> [--config <config.json>] [--output <report.json>]"
                    );
                    std::process::exit(0);
                }
                other if !other.starts_with('-') => {
                    input = Some(PathBuf::from(other));
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        let Some(input) = input else {
            return Err("missing input WAV path (see --help)".into());
        };
        Ok(Args {
            input,
            config,
            output,
        })
    }

    fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), String> {
        let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample <= 16 {
                    reader
                        .samples::<i16>()
                        .map(|s| {
                            s.map(|v| (v as f32) / (i16::MAX as f32))
                                .map_err(|e| e.to_string())
                        })
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| (v as f32) / max).map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                }
            }
        };

        if channels == 1 {
            return Ok((interleaved, spec.sample_rate));
        }

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        for frame in interleaved.chunks(channels) {
            let sum = frame.iter().copied().sum::<f32>();
            mono.push(sum / channels as f32);
        }
        Ok((mono, spec.sample_rate))
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str::<PipelineConfig>(&text).map_err(|e| e.to_string())?
        }
        None => PipelineConfig::default(),
    };

    let (samples, sample_rate) = read_wav_mono_f32(&args.input)?;
    if samples.is_empty() {
        return Err(format!("no audio samples in {}", args.input.display()));
    }
    // The file dictates the rate.
    config.sample_rate = sample_rate;

    let mut bandpass = BandpassStage::new(sample_rate, config.low_cut_hz, config.high_cut_hz);
    bandpass.set_enabled(config.use_bandpass);

    let mut gain = GainStage::new();
    gain.set_manual_gain_db(config.gain_boost_db);
    gain.set_auto_gain_target(config.auto_gain_target);
    gain.set_auto_gain_enabled(config.auto_gain_enabled);

    let mut segmenter = SegmentationEngine::new(config.segmentation());

    // 100 ms chunks, clocked by sample position rather than wall time.
    let chunk_len = (sample_rate / 10).max(1) as usize;
    let mut segments = Vec::new();
    let mut consumed = 0usize;

    let push = |segments: &mut Vec<SegmentRow>, segment: voicegate_core::Segment| {
        let peak_level = level::chunk_level(&segment.samples);
        segments.push(SegmentRow {
            index: segments.len(),
            started_at_ms: segment.started_at_ms,
            emitted_at_ms: segment.emitted_at_ms,
            duration_secs: segment.duration_secs(sample_rate),
            samples: segment.samples.len(),
            reason: segment.reason,
            peak_level,
        });
    };

    for chunk in samples.chunks(chunk_len) {
        let now_ms = (consumed as u64 * 1_000) / u64::from(sample_rate);
        let filtered = bandpass.process(chunk);
        let shaped = gain.apply(&filtered);
        if let Some(segment) = segmenter.push_chunk(&shaped, now_ms) {
            push(&mut segments, segment);
        }
        consumed += chunk.len();
    }

    let end_ms = (consumed as u64 * 1_000) / u64::from(sample_rate);
    if let Some(segment) = segmenter.flush(end_ms) {
        push(&mut segments, segment);
    }

    let report = Report {
        input: args.input.display().to_string(),
        sample_rate,
        total_samples: samples.len(),
        total_secs: samples.len() as f32 / sample_rate as f32,
        segments,
    };

    println!(
        "{}: {} segments over {:.1} s",
        report.input,
        report.segments.len(),
        report.total_secs
    );

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote segmentation report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
