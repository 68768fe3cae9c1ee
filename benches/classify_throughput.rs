// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Artifact classification throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Write;
use std::path::{Path, PathBuf};

use modhost::modules::{classify, manifest::MANIFEST_PATH, ArtifactManifest};

fn manifest_text(extra_headers: usize) -> String {
    let mut text = String::from(
        "Manifest-Version: 1.0\nBundle-SymbolicName: com.example.driver;singleton:=true\nBundle-Version: 2.4.1\nDriver-Type: Service\n",
    );
    for i in 0..extra_headers {
        text.push_str(&format!(
            "X-Header-{}: value {} with a long continuation that wraps\n  onto a second line\n",
            i, i
        ));
    }
    text
}

fn write_jar(dir: &Path, entries: usize) -> PathBuf {
    let path = dir.join(format!("driver-{}.jar", entries));
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file(MANIFEST_PATH, options).unwrap();
    zip.write_all(manifest_text(10).as_bytes()).unwrap();
    for i in 0..entries {
        zip.start_file(format!("com/example/Class{}.class", i), options)
            .unwrap();
        zip.write_all(&[0u8; 256]).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_parse");

    for headers in [0usize, 20, 200] {
        let text = manifest_text(headers);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("headers", headers), &text, |b, text| {
            b.iter(|| ArtifactManifest::parse(black_box(text)))
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("classify");

    for entries in [1usize, 100, 1000] {
        let path = write_jar(dir.path(), entries);
        group.bench_with_input(BenchmarkId::new("entries", entries), &path, |b, path| {
            b.iter(|| classify(black_box(path)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_classify);
criterion_main!(benches);
