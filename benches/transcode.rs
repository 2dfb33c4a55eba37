//! Benchmark: record transcoding throughput. Encodes and decodes a flat flow
//! record and a record carrying a subTemplateList, and round-trips a batch of
//! records through a buffer (message framing included).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ipfixcodec::transcode::{decode, encode};
use ipfixcodec::{Buffer, Collector, Exporter, InfoModel, Record, Session, Template, Value};

fn flow_template(model: &InfoModel) -> Template {
    let mut t = Template::new(model);
    for name in [
        "flowStartMilliseconds",
        "sourceIPv4Address",
        "destinationIPv4Address",
        "sourceTransportPort",
        "destinationTransportPort",
        "protocolIdentifier",
        "packetDeltaCount",
        "octetTotalCount",
        "interfaceName",
    ] {
        t.add_element(name).expect("element");
    }
    t
}

fn flow_record(model: &InfoModel, template: &Template, n: u64) -> Record {
    let mut rec = Record::from_template(model, template);
    rec.set("flowStartMilliseconds", 1_700_000_000_000u64 + n).expect("set");
    rec.set("sourceIPv4Address", "10.0.0.1").expect("set");
    rec.set("destinationIPv4Address", "192.168.1.20").expect("set");
    rec.set("sourceTransportPort", 443u16).expect("set");
    rec.set("destinationTransportPort", 51000u16).expect("set");
    rec.set("protocolIdentifier", 6u8).expect("set");
    rec.set("packetDeltaCount", 12u64).expect("set");
    rec.set("octetTotalCount", 1500u64 * n).expect("set");
    rec.set("interfaceName", "eth0").expect("set");
    rec
}

fn bench_flat(c: &mut Criterion) {
    let model = InfoModel::new();
    let mut template = flow_template(&model);
    let mut session = Session::new(&model);
    session.add_template(&mut template, 300).expect("register");
    let rec = flow_record(&model, &template, 1);
    let wire = encode(&rec, &template, &session).expect("encode");

    c.bench_function("encode flow record", |b| {
        b.iter(|| encode(black_box(&rec), &template, &session).expect("encode"))
    });
    let mut out = Record::from_template(&model, &template);
    c.bench_function("decode flow record", |b| {
        b.iter(|| decode(black_box(&wire), &template, &mut out, &mut session).expect("decode"))
    });
}

fn bench_nested(c: &mut Criterion) {
    let model = InfoModel::new();
    let mut inner = Template::new(&model);
    inner.add_element("sourceTransportPort").expect("element");
    inner.add_element("octetTotalCount").expect("element");
    let mut outer = Template::new(&model);
    outer.add_element("protocolIdentifier").expect("element");
    outer.add_element("subTemplateList").expect("element");
    let mut session = Session::new(&model);
    session.add_template(&mut inner, 301).expect("register");
    session.add_template(&mut outer, 302).expect("register");

    let children: Vec<Record> = (0..16u16)
        .map(|n| {
            let mut r = Record::from_template(&model, &inner);
            r.set("sourceTransportPort", 1000 + n).expect("set");
            r.set("octetTotalCount", u64::from(n) * 100).expect("set");
            r
        })
        .collect();
    let mut rec = Record::from_template(&model, &outer);
    rec.set("protocolIdentifier", 17u8).expect("set");
    rec.set("subTemplateList", Value::Records(children)).expect("set");
    let wire = encode(&rec, &outer, &session).expect("encode");

    c.bench_function("encode record with 16-entry subTemplateList", |b| {
        b.iter(|| encode(black_box(&rec), &outer, &session).expect("encode"))
    });
    let mut out = Record::from_template(&model, &outer);
    c.bench_function("decode record with 16-entry subTemplateList", |b| {
        b.iter(|| decode(black_box(&wire), &outer, &mut out, &mut session).expect("decode"))
    });
}

fn bench_buffer(c: &mut Criterion) {
    let model = InfoModel::new();
    let mut template = flow_template(&model);
    let mut session = Session::new(&model);
    let tid = session.add_template(&mut template, 0).expect("register");
    let records: Vec<Record> = (0..1000).map(|n| flow_record(&model, &template, n)).collect();

    let mut buf = Buffer::new();
    buf.init_export(session.clone(), Exporter::in_memory()).expect("export");
    buf.set_internal_template(tid).expect("internal");
    buf.set_export_template(tid).expect("external");
    for rec in &records {
        buf.append(rec).expect("append");
    }
    let bytes = buf.take_output().expect("output");

    c.bench_function("export 1000 flow records", |b| {
        b.iter(|| {
            let mut buf = Buffer::new();
            buf.init_export(session.clone(), Exporter::in_memory()).expect("export");
            buf.set_internal_template(tid).expect("internal");
            buf.set_export_template(tid).expect("external");
            for rec in &records {
                buf.append(rec).expect("append");
            }
            buf.take_output().expect("output")
        })
    });
    c.bench_function("collect 1000 flow records", |b| {
        b.iter(|| {
            let mut buf = Buffer::new();
            buf.init_collection(Session::new(&model), Collector::from_bytes(bytes.clone()))
                .expect("collect");
            buf.set_auto(true);
            buf.filter_map(Result::ok).count()
        })
    });
}

criterion_group!(benches, bench_flat, bench_nested, bench_buffer);
criterion_main!(benches);
