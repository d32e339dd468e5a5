//! Criterion benchmarks for the satellite-protocol codec.
//!
//! The hot path is one `audio-chunk` every 30 ms per hub connection, plus the
//! hub's TTS audio coming back in larger blocks.
//!
//! Run with:
//! ```bash
//! cargo bench --package satellite-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use satellite_core::protocol::events::{AudioChunk, AudioFormat, Transcript};
use satellite_core::{decode_event, encode_event, Event, SatelliteMessage};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn mic_chunk_event(samples_bytes: usize) -> Event {
    SatelliteMessage::AudioChunk(AudioChunk {
        format: AudioFormat::MIC_16K_MONO,
        timestamp: None,
        audio: vec![0x55; samples_bytes],
    })
    .to_event()
    .expect("fixture must encode")
}

fn transcript_event() -> Event {
    SatelliteMessage::Transcript(Transcript {
        text: "set a timer for ten minutes".to_string(),
    })
    .to_event()
    .expect("fixture must encode")
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_event");
    for size in [960usize, 4096, 16384] {
        let event = mic_chunk_event(size);
        group.bench_with_input(BenchmarkId::new("audio_chunk", size), &event, |b, ev| {
            b.iter(|| encode_event(black_box(ev)).unwrap())
        });
    }
    let transcript = transcript_event();
    group.bench_function("transcript", |b| {
        b.iter(|| encode_event(black_box(&transcript)).unwrap())
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_event");
    for size in [960usize, 4096, 16384] {
        let bytes = encode_event(&mic_chunk_event(size)).unwrap();
        group.bench_with_input(BenchmarkId::new("audio_chunk", size), &bytes, |b, buf| {
            b.iter(|| decode_event(black_box(buf)).unwrap())
        });
    }
    let transcript = encode_event(&transcript_event()).unwrap();
    group.bench_function("transcript", |b| {
        b.iter(|| decode_event(black_box(&transcript)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
