//! Benchmarks for blurring, batch classification, and the in-memory
//! pipeline.
//!
//! Run with: cargo bench
//!
//! All inputs are synthetic; no fixtures are needed.

use std::time::Duration;

use criterion::Criterion;
use stillcut::{
    BatchClassifier, ClassifierOptions, CollectingEncoder, ComputeDevice, Frame, FrameBatch,
    FrameRate, FrequencyBlur, GaussianKernel, PipelineOptions, PixelFormat, ProcessingState,
    StreamMetadata, VecDecoder, run_pipeline,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn metadata(frame_count: u64) -> StreamMetadata {
    StreamMetadata::new(frame_count, FrameRate::new(30, 1).expect("rate"), WIDTH, HEIGHT)
        .expect("metadata")
}

/// A gradient that shifts by `step` pixels per frame, every `period` frames.
fn frames(count: usize, period: usize) -> Vec<Frame> {
    (0..count)
        .map(|i| {
            let shift = (i / period) as u32;
            let data = (0..HEIGHT)
                .flat_map(|y| (0..WIDTH).map(move |x| ((x + y + shift * 8) % 256) as u8))
                .flat_map(|value| [value, value, value])
                .collect();
            Frame::new(WIDTH, HEIGHT, PixelFormat::Rgb8, data).expect("frame")
        })
        .collect()
}

fn benchmark_blur(criterion: &mut Criterion) {
    let frame = &frames(1, 1)[0];
    let plane = frame.luminance();

    let mut group = criterion.benchmark_group("blur");
    for (size, sigma) in [(7, 3.0), (15, 7.0)] {
        let kernel = GaussianKernel::new(size, sigma).expect("kernel");
        let blur = FrequencyBlur::new(&kernel, WIDTH, HEIGHT);
        group.bench_function(format!("kernel {size}"), |bencher| {
            bencher.iter(|| blur.apply(&plane))
        });
    }
    group.finish();
}

fn benchmark_classify_batch(criterion: &mut Criterion) {
    let batch = frames(32, 4);

    let mut group = criterion.benchmark_group("classify batch of 32");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    for (name, device) in [
        ("serial", ComputeDevice::Serial),
        ("parallel", ComputeDevice::default()),
    ] {
        let classifier = BatchClassifier::new(ClassifierOptions::default(), &metadata(32), device)
            .expect("classifier");
        group.bench_function(name, |bencher| {
            bencher.iter(|| {
                classifier
                    .classify(
                        FrameBatch::new(batch.clone()),
                        ProcessingState::new(),
                        FrameRate::new(30, 1).expect("rate"),
                    )
                    .expect("classify")
            })
        });
    }
    group.finish();
}

fn benchmark_pipeline(criterion: &mut Criterion) {
    let input = frames(120, 10);

    let mut group = criterion.benchmark_group("pipeline");
    group.sample_size(10);

    for batch_size in [8usize, 32] {
        group.bench_function(format!("batch size {batch_size}"), |bencher| {
            bencher.iter(|| {
                let frames = input.clone();
                run_pipeline(
                    &metadata(120),
                    move || Ok(VecDecoder::new(frames)),
                    || Ok(CollectingEncoder::new()),
                    &ClassifierOptions::default(),
                    &PipelineOptions::new().with_batch_size(batch_size),
                )
                .expect("pipeline")
            })
        });
    }
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_blur,
    benchmark_classify_batch,
    benchmark_pipeline,
);
criterion::criterion_main!(benches);
