use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mailbounce::config::{Config, SiteConfig};
use mailbounce::deliverer::DelivererConfig;
use mailbounce::mime::Parser;
use mailbounce::services::Services;
use mailbounce::MessageProcessor;

fn read_fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let parser = Parser::new();
    for name in ["nouser.eml", "multipart.eml", "encoded.eml"] {
        let raw = read_fixture(name);
        c.bench_function(&format!("parse_{name}"), |b| {
            b.iter(|| parser.parse_bytes(&raw).unwrap())
        });
    }
}

fn bench_process(c: &mut Criterion) {
    let services = Services::new(SiteConfig {
        return_path: "bounces@example.com".into(),
    });
    let processor = MessageProcessor::new(&Config::default(), services).unwrap();
    let deliverer = DelivererConfig::new("bench");
    let raw = read_fixture("nouser.eml");

    c.bench_function("process_dsn", |b| {
        b.iter(|| processor.process(&raw, &deliverer).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_process);
criterion_main!(benches);
