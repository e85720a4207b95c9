use std::io::BufRead;

/// Counters of one network link as listed in `/proc/net/dev`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// Number of header lines preceding the per-link rows.
const HEADER_LINES: usize = 2;

/// Parses every link row of a `/proc/net/dev` style file, keeping the kernel's
/// enumeration order.
///
/// A row whose counters are missing or unparsable is skipped with a warning;
/// it never fails the whole listing.
pub fn parse_links<R: BufRead>(buf: &mut R) -> std::io::Result<Vec<LinkCounters>> {
    let mut links = Vec::new();
    let mut line = String::new();
    let mut lineno = 0;

    while buf.read_line(&mut line)? != 0 {
        lineno += 1;
        if lineno > HEADER_LINES {
            if let Some((name, data)) = line.trim().split_once(':') {
                match link_from_fields(name.trim(), data) {
                    Some(link) => links.push(link),
                    None => log::warn!(
                        "skipping link without statistics: link={}, line={lineno}",
                        name.trim()
                    ),
                }
            }
        }
        line.clear();
    }

    Ok(links)
}

fn link_from_fields(name: &str, data: &str) -> Option<LinkCounters> {
    let fields = data
        .split_whitespace()
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    // rx: bytes packets errs drop fifo frame compressed multicast, then tx
    if fields.len() < 12 {
        return None;
    }
    Some(LinkCounters {
        name: name.to_owned(),
        rx_bytes: fields[0],
        rx_packets: fields[1],
        rx_errors: fields[2],
        rx_dropped: fields[3],
        tx_bytes: fields[8],
        tx_packets: fields[9],
        tx_errors: fields[10],
        tx_dropped: fields[11],
    })
}
