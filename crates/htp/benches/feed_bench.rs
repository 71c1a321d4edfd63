use std::hint::black_box;

use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use micro_htp::codec::RequestDecoder;
use micro_htp::config::Config;
use micro_htp::connection::ConnectionParser;
use micro_htp::handler::HookPoint;
use micro_htp::protocol::{Direction, HookResult};
use tokio_util::codec::Decoder;

const GET: &[u8] = b"GET /index.html?q=rust HTTP/1.1\r\nHost: localhost\r\nUser-Agent: bench\r\nAccept: */*\r\n\r\n";

const CHUNKED_POST: &[u8] = b"POST /submit HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
10\r\n0123456789abcdef\r\n10\r\n0123456789abcdef\r\n0\r\n\r\n";

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nHello World!";

fn bench_request_decoder(c: &mut Criterion) {
    let config = Config::default();

    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new(&config);
            let mut bytes = BytesMut::from(GET);
            while let Ok(Some(message)) = decoder.decode(&mut bytes) {
                black_box(message);
            }
        });
    });
}

fn bench_feed_exchange(c: &mut Criterion) {
    c.bench_function("feed_get_and_response", |b| {
        b.iter(|| {
            let mut parser: ConnectionParser = ConnectionParser::new();
            parser.register(HookPoint::ResponseBodyData, |_, artifact| {
                black_box(artifact.bytes());
                Ok(HookResult::Ok)
            });
            black_box(parser.feed(Direction::Request, GET));
            black_box(parser.feed(Direction::Response, RESPONSE));
        });
    });
}

fn bench_feed_split(c: &mut Criterion) {
    c.bench_function("feed_chunked_post_in_pieces", |b| {
        b.iter(|| {
            let mut parser: ConnectionParser = ConnectionParser::new();
            for piece in CHUNKED_POST.chunks(7) {
                black_box(parser.feed(Direction::Request, piece));
            }
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_feed_exchange, bench_feed_split);
criterion_main!(benches);
