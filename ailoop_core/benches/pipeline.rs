use ailoop_core::calibration::{IDEAL_CODES, POINTS};
use ailoop_core::pipeline::FilterPipeline;
use ailoop_core::{Curve, FilterCfg, fit_quadratic};
use ailoop_hardware::{SimAdc, SimAdcInputs};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p ailoop_core --bench pipeline
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

fn distorted_points(gain: f64, offset: f64) -> [u32; POINTS] {
    std::array::from_fn(|i| (f64::from(IDEAL_CODES[i]) * gain + offset).round() as u32)
}

pub fn bench_fit(c: &mut Criterion) {
    let mut g = c.benchmark_group("fit_quadratic");
    configure(&mut g);
    for &(gain, offset) in &[(1.0, 0.0), (1.02, -150.0), (0.97, 420.0)] {
        let points = distorted_points(gain, offset);
        g.bench_function(format!("gain_{gain}_offset_{offset}"), |b| {
            b.iter(|| black_box(fit_quadratic(black_box(&points))))
        });
    }
    g.finish();
}

pub fn bench_pipeline(c: &mut Criterion) {
    let mut g = c.benchmark_group("pipeline_step");
    configure(&mut g);
    for &window in &[1u8, 30, 200] {
        let filter = FilterCfg {
            window,
            ..FilterCfg::default()
        };
        g.bench_function(format!("window_{window}_1200_ticks"), |b| {
            b.iter_batched(
                || {
                    let inputs = SimAdcInputs::default();
                    for ch in 0..6 {
                        inputs.set_current_ua(ch, 4_000.0 + 3_000.0 * ch as f64);
                    }
                    (FilterPipeline::new(filter, Curve::DEFAULT), SimAdc::new(inputs))
                },
                |(mut p, mut adc)| {
                    for _ in 0..1_200 {
                        black_box(p.step(&mut adc));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

criterion_group!(pipeline, bench_fit, bench_pipeline);
criterion_main!(pipeline);
