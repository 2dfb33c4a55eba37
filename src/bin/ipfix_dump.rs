use ipfixcodec::dump::{record_summary_line, record_to_dump};
use ipfixcodec::{split_messages, Buffer, CodecError, Collector, InfoModel, Session};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::PcapNGPacketBlock;
use pcap_parser::{create_reader, Linktype, PcapBlockOwned, PcapError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// IANA-assigned IPFIX ports (plain and over DTLS).
const IPFIX_PORTS: [u16; 2] = [4739, 4740];

#[derive(Default)]
struct CaptureStats {
    packets: u64,
    udp_payloads: u64,
    messages: u64,
    removed: u64,
    first_removal: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut raw_args, &["--verbose", "-v"]);
    let pcap = take_flag(&mut raw_args, &["--pcap"]);
    let mut registries: Vec<PathBuf> = Vec::new();
    while let Some(pos) = raw_args.iter().position(|a| a.starts_with("--registry=")) {
        let arg = raw_args.remove(pos);
        if let Some(p) = arg.strip_prefix("--registry=") {
            registries.push(PathBuf::from(p));
        }
    }
    let input: PathBuf = match raw_args.into_iter().next() {
        Some(p) => PathBuf::from(p),
        None => anyhow::bail!("usage: ipfix_dump [--pcap] [--registry=FILE]... [--verbose] <input>"),
    };

    let model = InfoModel::new();
    for path in &registries {
        let n = model.load_file(path)?;
        log::info!("loaded {} elements from {}", n, path.display());
    }

    let mut capture = None;
    let collector = if pcap {
        let mut stats = CaptureStats::default();
        let bytes = read_capture(&input, &mut stats)?;
        capture = Some(stats);
        Collector::from_bytes(bytes)
    } else {
        Collector::open(&input)?
    };

    let mut buf = Buffer::new();
    buf.init_collection(Session::new(&model), collector)?;
    buf.set_auto(true);
    buf.auto_insert();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut records: u64 = 0;
    let mut errors: u64 = 0;
    let mut first_error: Option<String> = None;
    let mut per_template: BTreeMap<u16, u64> = BTreeMap::new();
    loop {
        match buf.next_record() {
            Ok(rec) => {
                records += 1;
                let tid = buf.get_template().map(|t| t.template_id()).unwrap_or(0);
                *per_template.entry(tid).or_insert(0) += 1;
                if verbose {
                    writeln!(out, "=== record {}  template {} ===", records, tid)?;
                    writeln!(out, "{}", record_to_dump(&rec, 1))?;
                } else {
                    writeln!(out, "{} {}", tid, record_summary_line(&rec))?;
                }
            }
            Err(CodecError::EndOfStream) => break,
            Err(e @ CodecError::Malformed(_)) => {
                errors += 1;
                log::warn!("{}", e);
                first_error.get_or_insert_with(|| e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }
    out.flush()?;

    eprintln!("input: {}", input.display());
    if let Some(stats) = capture {
        eprintln!("packets: {}", stats.packets);
        eprintln!("ipfix udp payloads: {}", stats.udp_payloads);
        eprintln!("messages: {}", stats.messages);
        eprintln!("removed (unframeable): {}", stats.removed);
        if let Some(reason) = stats.first_removal {
            eprintln!("  first removal: {}", reason);
        }
    }
    eprintln!("records: {}", records);
    eprintln!("malformed: {}", errors);
    eprintln!("sequence gaps: {}", buf.sequence_gaps());
    if let Some(e) = first_error {
        eprintln!("  first error: {}", e);
    }
    if !per_template.is_empty() {
        eprintln!("records per template:");
        for (tid, n) in &per_template {
            eprintln!("  {}: {}", tid, n);
        }
    }
    if let Some(session) = buf.session() {
        eprintln!("templates known: {:?}", session.external_ids());
    }
    Ok(())
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    match args.iter().position(|a| names.contains(&a.as_str())) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

/// Concatenate the well-framed IPFIX messages carried in a pcap or pcapng capture.
fn read_capture(path: &Path, stats: &mut CaptureStats) -> anyhow::Result<Vec<u8>> {
    let mut reader = create_reader(1 << 20, File::open(path)?)
        .map_err(|e| anyhow::anyhow!("{}: not a capture file: {:?}", path.display(), e))?;
    let mut messages = Vec::new();
    // legacy captures carry one linktype, pcapng one per interface
    let mut linktypes: Vec<Linktype> = Vec::new();
    loop {
        let consumed = match reader.next() {
            Ok((offset, block)) => {
                let frame = match &block {
                    PcapBlockOwned::LegacyHeader(h) => {
                        linktypes = vec![h.network];
                        None
                    }
                    PcapBlockOwned::Legacy(b) => Some((0, b.data)),
                    PcapBlockOwned::NG(PcapNgBlock::InterfaceDescription(idb)) => {
                        linktypes.push(idb.linktype);
                        None
                    }
                    PcapBlockOwned::NG(PcapNgBlock::EnhancedPacket(epb)) => {
                        Some((epb.if_id as usize, epb.packet_data()))
                    }
                    PcapBlockOwned::NG(PcapNgBlock::SimplePacket(spb)) => Some((0, spb.packet_data())),
                    PcapBlockOwned::NG(_) => None,
                };
                if let Some((interface, data)) = frame {
                    stats.packets += 1;
                    let linktype = linktypes.get(interface).copied().unwrap_or(Linktype::ETHERNET);
                    if let Some(payload) = ipfix_payload(linktype, data) {
                        collect_messages(payload, stats, &mut messages);
                    }
                }
                offset
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("capture refill failed: {:?}", e))?;
                continue;
            }
            Err(e) => anyhow::bail!("capture read failed: {:?}", e),
        };
        reader.consume(consumed);
    }
    Ok(messages)
}

fn collect_messages(payload: &[u8], stats: &mut CaptureStats, messages: &mut Vec<u8>) {
    stats.udp_payloads += 1;
    let scan = split_messages(payload);
    for &(start, end) in &scan.messages {
        messages.extend_from_slice(&payload[start..end]);
    }
    stats.messages += scan.messages.len() as u64;
    stats.removed += scan.removed.len() as u64;
    if stats.first_removal.is_none() {
        stats.first_removal = scan.removed.first().map(|rm| {
            format!(
                "packet {} bytes [{}-{}]: {}",
                stats.packets, rm.byte_range.0, rm.byte_range.1, rm.reason
            )
        });
    }
}

fn be16(b: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*b.get(at)?, *b.get(at + 1)?]))
}

/// UDP payload of an IPv4 datagram to or from an IPFIX port. The IPv4 total
/// length and UDP length bound the payload, so link-layer padding is dropped.
fn ipfix_payload(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let (ethertype, l3) = match linktype {
        Linktype::ETHERNET => {
            let mut at = 12;
            let mut ethertype = be16(frame, at)?;
            // skip 802.1Q / 802.1ad tags
            while matches!(ethertype, 0x8100 | 0x88a8) {
                at += 4;
                ethertype = be16(frame, at)?;
            }
            (ethertype, frame.get(at + 2..)?)
        }
        Linktype::LINUX_SLL => (be16(frame, 14)?, frame.get(16..)?),
        Linktype::RAW => (0x0800, frame),
        _ => return None,
    };
    if ethertype != 0x0800 || l3.first()? >> 4 != 4 || *l3.get(9)? != 17 {
        return None;
    }
    let header_len = usize::from(l3[0] & 0x0f) * 4;
    let total_len = usize::from(be16(l3, 2)?);
    if header_len < 20 || total_len < header_len {
        return None;
    }
    let udp = l3.get(header_len..total_len.min(l3.len()))?;
    let (src, dst) = (be16(udp, 0)?, be16(udp, 2)?);
    if !IPFIX_PORTS.contains(&src) && !IPFIX_PORTS.contains(&dst) {
        return None;
    }
    let udp_len = usize::from(be16(udp, 4)?);
    if udp_len < 8 {
        return None;
    }
    udp.get(8..udp_len)
}
