use criterion::{BatchSize, Criterion, Throughput};
use libcoproc::channel::{Channel, Read, Write};
use libcoproc::https::{HttpsClient, Status};
use libcoproc::task::frame::{self, Decoder, Kind, MAX_FRAME_LEN, MAX_PAYLOAD};
use libcoproc::task::Dispatcher;
use std::collections::VecDeque;

const BODY_LEN: usize = 16 * 1024;

/// Co-processor stand-in that answers every request with the same body.
struct Loopback {
    decoder: Decoder,
    outbound: VecDeque<u8>,
    body: Vec<u8>,
}

impl Loopback {
    fn new() -> Self {
        Self {
            decoder: Decoder::new(),
            outbound: VecDeque::new(),
            body: (0..BODY_LEN).map(|i| i as u8).collect(),
        }
    }

    fn queue(&mut self, kind: Kind, token: u16, seq: u16, payload: &[u8]) {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = frame::encode(kind, token, seq, payload, &mut buf).unwrap();
        self.outbound.extend(&buf[..n]);
    }

    fn respond(&mut self, token: u16) {
        self.queue(Kind::Ack, token, 0, &[]);
        let body = std::mem::take(&mut self.body);
        let mut seq = 0;
        for chunk in body.chunks(MAX_PAYLOAD) {
            self.queue(Kind::Data, token, seq, chunk);
            seq += 1;
        }
        self.body = body;
        self.queue(Kind::Done, token, seq, &[]);
    }
}

impl Read for Loopback {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Loopback {
    type Error = ();

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            if let Some(frame) = self.decoder.push(byte) {
                if frame.payload.starts_with(br#"{"op":"https_get""#) {
                    self.respond(frame.token);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Channel for Loopback {}

pub fn bench_drain_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("https");
    group.throughput(Throughput::Bytes(BODY_LEN as u64));
    group.bench_function("connect_and_drain_16k", |b| {
        b.iter_batched(
            || HttpsClient::new(Dispatcher::new(Loopback::new())),
            |mut client| {
                client.connect("https://example.com/bench").unwrap();
                let mut total = 0;
                while client.is_active() {
                    client.get_handle(|chunk| total += chunk.len());
                }
                assert_eq!(client.status(), Status::Complete);
                assert_eq!(total, BODY_LEN);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}
