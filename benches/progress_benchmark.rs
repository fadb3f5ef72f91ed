//! Progress aggregation benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use upload_orchestrator::job::{SourceFile, UploadId, UploadJob, UploadStatus};
use upload_orchestrator::AggregateProgress;

fn jobs(count: usize) -> Vec<UploadJob> {
    (0..count)
        .map(|i| {
            let file = SourceFile::new(format!("{i}.bin"), vec![0u8; 64]);
            let mut job = UploadJob::new(UploadId::new(), file);
            if i % 2 == 0 {
                job.compressed_size_bytes = Some(32);
                job.uploaded_size_bytes = (i % 33) as u64;
            }
            if i % 7 == 0 {
                job.status = UploadStatus::Success;
            }
            job
        })
        .collect()
}

fn benchmark_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_progress");

    for count in [10, 100, 1000, 10_000].iter() {
        let jobs = jobs(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &jobs, |b, jobs| {
            b.iter(|| black_box(AggregateProgress::from_jobs(black_box(jobs))));
        });
    }

    group.finish();
}

fn benchmark_job_progress(c: &mut Criterion) {
    let jobs = jobs(1000);

    c.bench_function("job_progress_percentage", |b| {
        b.iter(|| {
            let total: u64 = jobs
                .iter()
                .map(|job| u64::from(job.progress_percentage()))
                .sum();
            black_box(total)
        });
    });
}

criterion_group!(benches, benchmark_aggregate, benchmark_job_progress);
criterion_main!(benches);
