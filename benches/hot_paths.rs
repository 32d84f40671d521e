use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use awg_exporter::collector::Collector;
use awg_exporter::command::CommandError;
use awg_exporter::dump::parse::parse_dump;
use awg_exporter::dump::source::{DumpError, DumpSource};
use awg_exporter::dump::PeerKey;
use awg_exporter::export::ExporterMetrics;
use awg_exporter::names::{FileSource, NameDirectory, NameSource};
use awg_exporter::rate::RateTracker;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PEERS: usize = 256;

struct NoDump;

impl DumpSource for NoDump {
    async fn fetch(&self) -> Result<String, DumpError> {
        Err(DumpError::Command(CommandError::Empty))
    }
}

fn identity(i: usize) -> String {
    format!("{i:0>43}=")
}

fn dump_text(peers: usize, rx_base: u64) -> String {
    let mut text = String::from("awg0\tPRIV\tPUB\t51820\toff\t4\t40\t70\t0\t0\t0\t0\t0\t0\t0\t0\n");
    for i in 0..peers {
        text.push_str(&format!(
            "awg0\t{}\t(none)\t203.0.113.{}:51820\t10.8.1.{}/32\t1700000000\t{}\t{}\toff\n",
            identity(i),
            i % 250,
            i % 250,
            rx_base + i as u64 * 1_000,
            rx_base * 2 + i as u64 * 500,
        ));
    }
    text
}

fn directory(peers: usize) -> NameDirectory {
    (0..peers)
        .filter(|i| i % 2 == 0)
        .map(|i| (identity(i), format!("client-{i}")))
        .collect()
}

fn bench_parse_dump(c: &mut Criterion) {
    let text = dump_text(PEERS, 1_000_000);

    c.bench_function("parse_dump/256_peers", |b| {
        b.iter(|| {
            let dump = parse_dump(black_box(&text));
            black_box(dump.peers.len())
        })
    });
}

fn bench_rate_update(c: &mut Criterion) {
    let keys: Vec<PeerKey> = (0..PEERS).map(|i| PeerKey::new("awg0", identity(i))).collect();
    let mut tracker = RateTracker::new();
    let mut now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let mut bytes = 0u64;

    c.bench_function("rate_tracker/update_256_peers", |b| {
        b.iter(|| {
            now += Duration::from_secs(30);
            bytes += 4_096;
            tracker.begin_cycle();
            for key in &keys {
                black_box(tracker.update(key, now, bytes, bytes / 2));
            }
        })
    });
}

fn bench_collect(c: &mut Criterion) {
    let metrics = Arc::new(ExporterMetrics::new(":0").expect("metrics"));
    let names = NameSource::File(FileSource::new(&std::env::temp_dir().join("bench-names.json")));
    let mut collector = Collector::new(NoDump, names, metrics, 10);
    let dir = directory(PEERS);
    let texts = [dump_text(PEERS, 1_000_000), dump_text(PEERS, 2_000_000)];
    let mut tick = 0u64;

    c.bench_function("collector/collect_256_peers", |b| {
        b.iter(|| {
            tick += 1;
            let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + tick * 30);
            let text = &texts[(tick % 2) as usize];
            let summary = collector.collect(black_box(text), &dir, now);
            black_box(summary.peers)
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_parse_dump(c);
    bench_rate_update(c);
    bench_collect(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
