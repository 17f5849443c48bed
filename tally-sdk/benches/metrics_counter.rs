use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tally::KeyValue;
use tally_sdk::metrics::{Counter, ManualReader, MetricReader, SdkMeterProvider};

// Run this benchmark with:
// cargo bench --bench metrics_counter
fn create_counter() -> (SdkMeterProvider, ManualReader, Counter) {
    let reader = ManualReader::new();
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let meter = meter_provider.meter("benchmarks");
    let counter = meter
        .f64_counter("counter_bench")
        .build()
        .expect("valid instrument name");
    (meter_provider, reader, counter)
}

fn criterion_benchmark(c: &mut Criterion) {
    counter_add(c);
    counter_collect(c);
}

const ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

fn counter_add(c: &mut Criterion) {
    let (_provider, _reader, counter) = create_counter();
    let mut rng = SmallRng::from_os_rng();

    c.bench_function("Counter_Add_Sorted", |b| {
        b.iter(|| {
            // 4*4*10*10 = 1600 time series.
            let index_first_attribute = rng.random_range(0..4);
            let index_second_attribute = rng.random_range(0..4);
            let index_third_attribute = rng.random_range(0..10);
            let index_forth_attribute = rng.random_range(0..10);
            let _ = counter.add(
                1.0,
                &[
                    KeyValue::new("attribute1", ATTRIBUTE_VALUES[index_first_attribute]),
                    KeyValue::new("attribute2", ATTRIBUTE_VALUES[index_second_attribute]),
                    KeyValue::new("attribute3", ATTRIBUTE_VALUES[index_third_attribute]),
                    KeyValue::new("attribute4", ATTRIBUTE_VALUES[index_forth_attribute]),
                ],
            );
        });
    });

    c.bench_function("Counter_Add_Unsorted", |b| {
        b.iter(|| {
            // 4*4*10*10 = 1600 time series.
            let index_first_attribute = rng.random_range(0..4);
            let index_second_attribute = rng.random_range(0..4);
            let index_third_attribute = rng.random_range(0..10);
            let index_forth_attribute = rng.random_range(0..10);
            let _ = counter.add(
                1.0,
                &[
                    KeyValue::new("attribute2", ATTRIBUTE_VALUES[index_second_attribute]),
                    KeyValue::new("attribute3", ATTRIBUTE_VALUES[index_third_attribute]),
                    KeyValue::new("attribute1", ATTRIBUTE_VALUES[index_first_attribute]),
                    KeyValue::new("attribute4", ATTRIBUTE_VALUES[index_forth_attribute]),
                ],
            );
        });
    });

    c.bench_function("Counter_Add_No_Attributes", |b| {
        b.iter(|| {
            let _ = counter.add(1.0, &[]);
        });
    });
}

fn counter_collect(c: &mut Criterion) {
    let (_provider, reader, counter) = create_counter();
    for first in ATTRIBUTE_VALUES {
        for second in ATTRIBUTE_VALUES {
            let _ = counter.add(
                1.0,
                &[
                    KeyValue::new("attribute1", first),
                    KeyValue::new("attribute2", second),
                ],
            );
        }
    }

    // 100 time series.
    c.bench_function("Counter_Collect", |b| {
        b.iter(|| reader.collect());
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
