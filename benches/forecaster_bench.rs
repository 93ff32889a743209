//! Benchmarks for fitting, recursive prediction and bootstrapping.

use autoreg_forecast::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_series(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            50.0 + 0.05 * t
                + 5.0 * (2.0 * std::f64::consts::PI * t / 12.0).sin()
                + ((i * 37) % 11) as f64 * 0.1
        })
        .collect()
}

fn bench_recursive_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_fit");

    for size in [200, 1000, 5000].iter() {
        let series = TimeSeries::new(generate_series(*size));

        group.bench_with_input(BenchmarkId::new("lags_12", size), size, |b, _| {
            b.iter(|| {
                let mut forecaster =
                    RecursiveForecaster::new(LinearRegression::new(), LagSpec::up_to(12).unwrap());
                forecaster.fit(black_box(&series), None).unwrap();
                forecaster
            })
        });
    }

    group.finish();
}

fn bench_recursive_predict(c: &mut Criterion) {
    let series = TimeSeries::new(generate_series(1000));
    let mut forecaster = RecursiveForecaster::builder(LinearRegression::new(), LagSpec::up_to(12).unwrap())
        .transformer_y(StandardScaler::new())
        .build()
        .unwrap();
    forecaster.fit(&series, None).unwrap();

    let mut group = c.benchmark_group("recursive_predict");
    for steps in [12, 48, 120].iter() {
        group.bench_with_input(BenchmarkId::new("point", steps), steps, |b, &steps| {
            b.iter(|| forecaster.predict(black_box(steps), None, None).unwrap())
        });
    }
    group.finish();
}

fn bench_bootstrap(c: &mut Criterion) {
    let series = TimeSeries::new(generate_series(1000));
    let mut forecaster = RecursiveForecaster::new(LinearRegression::new(), LagSpec::up_to(12).unwrap());
    forecaster.fit(&series, None).unwrap();

    let mut group = c.benchmark_group("bootstrap");
    group.sample_size(20);

    let flat = BootstrapConfig::new(250).with_seed(1);
    group.bench_function("flat_250", |b| {
        b.iter(|| {
            forecaster
                .predict_interval(24, None, None, [5.0, 95.0], black_box(&flat))
                .unwrap()
        })
    });

    let binned = BootstrapConfig::new(250).with_seed(1).with_binned_residuals();
    group.bench_function("binned_250", |b| {
        b.iter(|| {
            forecaster
                .predict_interval(24, None, None, [5.0, 95.0], black_box(&binned))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_direct_fit(c: &mut Criterion) {
    let values = generate_series(1000);
    let other: Vec<f64> = values.iter().map(|v| v.sqrt()).collect();
    let series = SeriesFrame::from_columns(vec![("y".into(), values), ("x".into(), other)]).unwrap();

    let mut group = c.benchmark_group("direct_fit");
    group.sample_size(20);
    for steps in [6, 24].iter() {
        group.bench_with_input(BenchmarkId::new("steps", steps), steps, |b, &steps| {
            b.iter(|| {
                let mut forecaster = DirectForecaster::builder(LinearRegression::new(), "y", steps)
                    .lags(LagSpec::up_to(12).unwrap())
                    .build()
                    .unwrap();
                forecaster.fit(black_box(&series), None).unwrap();
                forecaster
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_recursive_fit,
    bench_recursive_predict,
    bench_bootstrap,
    bench_direct_fit
);
criterion_main!(benches);
