use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hearken::config::{VadConfig, WakeConfig};
use hearken::detect::ActivationCounter;
use hearken::vad::VadSegmenter;

fn bench_segmenter(c: &mut Criterion) {
    // Alternating speech and silence probabilities, one step per 32 ms chunk.
    let probabilities: Vec<f32> = (0..1000)
        .map(|i| if (i / 100) % 2 == 0 { 0.9 } else { 0.05 })
        .collect();

    c.bench_function("vad_segmenter_1000_steps", |b| {
        b.iter(|| {
            let mut segmenter = VadSegmenter::new(&VadConfig::default());
            for &p in &probabilities {
                black_box(segmenter.step(black_box(p)));
            }
        })
    });
}

fn bench_activation_counter(c: &mut Criterion) {
    let probabilities: Vec<f32> = (0..1000)
        .map(|i| if i % 40 == 0 { 0.9 } else { 0.1 })
        .collect();

    c.bench_function("activation_counter_1000_frames", |b| {
        b.iter(|| {
            let mut counter = ActivationCounter::new(WakeConfig::default());
            for &p in &probabilities {
                black_box(counter.update(black_box(p)));
            }
        })
    });
}

criterion_group!(benches, bench_segmenter, bench_activation_counter);
criterion_main!(benches);
