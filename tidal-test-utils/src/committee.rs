// Test-only `NodeLocation` fixtures: bind an ephemeral port, then
// immediately connect-and-drop so the OS holds it in `TIME_WAIT` for the
// caller long enough to reuse it deterministically.

use std::net::{TcpListener, TcpStream};

use tidal_types::NodeLocation;

/// A single local [`NodeLocation`] bound to an available ephemeral port.
pub fn local_node_location(node_id: u64) -> NodeLocation {
    NodeLocation::new(node_id, "127.0.0.1", available_local_port())
}

/// A committee of `n` distinct local [`NodeLocation`]s, node ids `0..n`.
pub fn local_committee(n: usize) -> Vec<NodeLocation> {
    (0..n as u64).map(local_node_location).collect()
}

fn available_local_port() -> u16 {
    const MAX_RETRIES: u32 = 1000;
    for _ in 0..MAX_RETRIES {
        if let Ok(port) = try_ephemeral_port() {
            return port;
        }
    }
    panic!("could not find an available local port after {MAX_RETRIES} retries");
}

fn try_ephemeral_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let addr = listener.local_addr()?;
    let _sender = TcpStream::connect(addr)?;
    let _incoming = listener.accept()?;
    Ok(addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committee_members_get_distinct_node_ids() {
        let committee = local_committee(3);
        assert_eq!(committee.len(), 3);
        let ids: Vec<u64> = committee.iter().map(|l| l.node_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
