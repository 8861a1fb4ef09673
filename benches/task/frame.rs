use criterion::{Criterion, Throughput};
use libcoproc::task::frame::{self, Decoder, Kind, MAX_FRAME_LEN, MAX_PAYLOAD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

const FRAMES: usize = 64;

fn wire(rng: &mut StdRng) -> Vec<u8> {
    let mut wire = Vec::new();
    let mut payload = [0u8; MAX_PAYLOAD];
    let mut buf = [0u8; MAX_FRAME_LEN];
    for token in 1..=FRAMES as u16 {
        let len = rng.gen_range(1..=MAX_PAYLOAD);
        rng.fill(&mut payload[..len]);
        let n = frame::encode(Kind::Data, token, 0, &payload[..len], &mut buf).unwrap();
        wire.extend_from_slice(&buf[..n]);
    }
    wire
}

pub fn bench_decode(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let wire = wire(&mut rng);

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let mut frames = 0;
            for &byte in black_box(&wire) {
                if decoder.push(byte).is_some() {
                    frames += 1;
                }
            }
            assert_eq!(frames, FRAMES);
        })
    });
    group.finish();
}

pub fn bench_encode(c: &mut Criterion) {
    let payload = [0xA5u8; MAX_PAYLOAD];
    let mut buf = [0u8; MAX_FRAME_LEN];

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(MAX_PAYLOAD as u64));
    group.bench_function("encode_full_payload", |b| {
        b.iter(|| frame::encode(Kind::Data, 1, 0, black_box(&payload), &mut buf).unwrap())
    });
    group.finish();
}
