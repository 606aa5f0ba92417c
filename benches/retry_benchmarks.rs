use criterion::{Criterion, criterion_group, criterion_main};
use prime_sdk_e2e::app::{Backoff, RetryPolicy, retry};
use prime_sdk_e2e::infra::read_benchmark_rows;
use std::hint::black_box;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn bench_retry(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("retry_first_attempt_succeeds", |b| {
        b.to_async(&runtime).iter(|| async {
            let result: Result<u32, String> = retry(|| async { Ok(black_box(7)) }, 5).await;
            black_box(result)
        })
    });

    c.bench_function("retry_succeeds_on_fourth_attempt", |b| {
        b.to_async(&runtime).iter(|| async {
            let calls = AtomicU32::new(0);
            let result: Result<u32, String> = retry(
                || {
                    let call = calls.fetch_add(1, Ordering::Relaxed);
                    async move { if call < 3 { Err("busy".to_string()) } else { Ok(call) } }
                },
                5,
            )
            .await;
            black_box(result)
        })
    });
}

fn bench_backoff(c: &mut Criterion) {
    let policy = RetryPolicy::new(5).with_backoff(Backoff::Exponential {
        base: Duration::from_millis(250),
        max: Duration::from_secs(4),
        jitter: true,
    });

    c.bench_function("exponential_backoff_delay", |b| {
        b.iter(|| {
            for failures in 1..=8 {
                black_box(policy.delay_for(black_box(failures)));
            }
        })
    });
}

fn bench_report_parsing(c: &mut Criterion) {
    let mut report = String::from(
        "Label,No_Samples,Average,Min,Max,Std_Dev,Error_Per,Throughput,Received_KBpersec,Sent_KBpersec,Avg_Bytes\n",
    );
    for i in 0..500 {
        report.push_str(&format!(
            "label{},120,812,301,2440,288.4,{}.25%,4.2,11.5,1.9,2801.0\n",
            i,
            i % 10
        ));
    }

    c.bench_function("parse_500_row_report", |b| {
        b.iter(|| {
            let rows = read_benchmark_rows(black_box(report.as_bytes())).unwrap();
            black_box(rows.filter(Result::is_ok).count())
        })
    });
}

criterion_group!(benches, bench_retry, bench_backoff, bench_report_parsing);
criterion_main!(benches);
