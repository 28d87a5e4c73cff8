// The connection table: the authoritative, ordered set of monitored members.
//
// Slot 0 is always the listening endpoint and slot 1 the shutdown source;
// peers occupy slots 2 and up in acceptance order. The fixed slots mean
// compaction can never reorder the relationship between the listener, the
// shutdown source, and the surviving peers.
//
// The table is owned and mutated by the event-loop thread only, strictly
// between readiness waits — there is exactly one execution context touching
// it, so no locking. Each entry owns its descriptor from acceptance until
// removal; `remove` compacts the peer list and the drop closes the handle,
// so a descriptor is closed exactly once and never leaks.
//
// Broadcast relaying lives here too: one source read is written to every
// other peer, and a failing recipient never aborts delivery to the rest.

use std::collections::BTreeSet;
use std::io::Write;
use std::os::fd::AsRawFd;

use tracing::debug;

use crate::endpoint::{Listener, Stream};
use crate::readiness;
use crate::shutdown::ShutdownSignal;

/// Table index of the listening endpoint.
pub const LISTENER_SLOT: usize = 0;
/// Table index of the shutdown source.
pub const SHUTDOWN_SLOT: usize = 1;
/// First table index eligible for peer connections.
pub const PEER_BASE: usize = 2;

pub struct ConnectionTable {
    listener: Listener,
    shutdown: ShutdownSignal,
    peers: Vec<Stream>,
}

impl ConnectionTable {
    /// Seed the table with the two permanent members. Size is at least two
    /// for the table's whole life.
    pub fn new(listener: Listener, shutdown: ShutdownSignal) -> Self {
        Self {
            listener,
            shutdown,
            peers: Vec::new(),
        }
    }

    /// Total member count, permanent slots included.
    pub fn size(&self) -> usize {
        PEER_BASE + self.peers.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Append a newly accepted peer and return its table index.
    pub fn add(&mut self, stream: Stream) -> usize {
        self.peers.push(stream);
        PEER_BASE + self.peers.len() - 1
    }

    /// Remove the peer at `index`, closing its descriptor and compacting so
    /// the iteration order of the survivors is preserved. Only peer slots
    /// can be removed; callers iterating a readiness snapshot must defer
    /// removals to the end of the pass and apply them highest index first.
    pub fn remove(&mut self, index: usize) {
        debug_assert!(index >= PEER_BASE && index < self.size());
        let stream = self.peers.remove(index - PEER_BASE);
        drop(stream);
        debug!(index, peers = self.peers.len(), "peer removed");
    }

    pub(crate) fn peer_mut(&mut self, index: usize) -> &mut Stream {
        debug_assert!(index >= PEER_BASE && index < self.size());
        &mut self.peers[index - PEER_BASE]
    }

    /// Build the pollfd set for one readiness wait, in table order.
    pub fn pollfds(&self) -> Vec<libc::pollfd> {
        let mut fds = Vec::with_capacity(self.size());
        fds.push(readiness::poll_fd(self.listener.as_raw_fd()));
        fds.push(readiness::poll_fd(self.shutdown.as_raw_fd()));
        for peer in &self.peers {
            fds.push(readiness::poll_fd(peer.as_raw_fd()));
        }
        fds
    }

    /// Write `bytes` to every peer except the source and any member already
    /// marked for removal in this pass. Write failures are isolated per
    /// recipient: the failing peer is reported back for deferred removal and
    /// delivery continues to the rest.
    pub fn relay_from(&mut self, source: usize, bytes: &[u8], skip: &BTreeSet<usize>) -> Vec<usize> {
        let mut failed = Vec::new();
        for offset in 0..self.peers.len() {
            let index = PEER_BASE + offset;
            if index == source || skip.contains(&index) {
                continue;
            }
            if let Err(err) = self.peers[offset].write_all(bytes) {
                debug!(index, error = %err, "relay write failed");
                failed.push(index);
            }
        }
        failed
    }

    /// Close every member. Peers and the shutdown source close on drop; the
    /// listener additionally removes a Unix-domain bind path. Consuming the
    /// table makes a second teardown unrepresentable.
    pub fn teardown(self) {
        let Self {
            listener,
            shutdown,
            peers,
        } = self;
        drop(peers);
        drop(shutdown);
        listener.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use super::*;
    use crate::endpoint::{Endpoint, Listener};
    use crate::shutdown::shutdown_pair;

    /// Table backed by a real TCP listener with `n` accepted peers.
    /// Returns the client-side stream for each peer, in slot order.
    fn table_with_peers(n: usize) -> (ConnectionTable, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (_handle, signal) = shutdown_pair().unwrap();

        let mut table = ConnectionTable::new(Listener::Tcp(listener), signal);
        let mut clients = Vec::new();
        for _ in 0..n {
            let client = TcpStream::connect(addr).unwrap();
            client
                .set_read_timeout(Some(Duration::from_millis(200)))
                .unwrap();
            let accepted = table.listener().accept().unwrap();
            table.add(accepted);
            clients.push(client);
        }
        (table, clients)
    }

    fn read_some(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let count = client.read(&mut buf).unwrap();
        buf[..count].to_vec()
    }

    fn expect_silence(client: &mut TcpStream) {
        let mut buf = [0u8; 64];
        match client.read(&mut buf) {
            Err(err) => assert!(
                matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ),
                "unexpected error: {err}"
            ),
            Ok(count) => panic!("expected silence, read {count} bytes"),
        }
    }

    #[test]
    fn add_assigns_ascending_slots() {
        let (table, _clients) = table_with_peers(3);
        assert_eq!(table.size(), PEER_BASE + 3);
        assert_eq!(table.peer_count(), 3);
    }

    #[test]
    fn remove_closes_descriptor_and_compacts() {
        let (mut table, mut clients) = table_with_peers(3);

        table.remove(PEER_BASE + 1);
        assert_eq!(table.peer_count(), 2);

        // The removed peer's client end sees EOF.
        let mut buf = [0u8; 8];
        assert_eq!(clients[1].read(&mut buf).unwrap(), 0);

        // Survivors kept their relative order: a relay from the (shifted)
        // first peer reaches the peer that used to sit at slot 4.
        let failed = table.relay_from(PEER_BASE, b"still here", &BTreeSet::new());
        assert!(failed.is_empty());
        assert_eq!(read_some(&mut clients[2]), b"still here");
        expect_silence(&mut clients[0]);
    }

    #[test]
    fn relay_skips_source_and_marked_members() {
        let (mut table, mut clients) = table_with_peers(3);

        let mut skip = BTreeSet::new();
        skip.insert(PEER_BASE + 1);
        let failed = table.relay_from(PEER_BASE, b"hello", &skip);
        assert!(failed.is_empty());

        expect_silence(&mut clients[0]); // source
        expect_silence(&mut clients[1]); // marked for removal
        assert_eq!(read_some(&mut clients[2]), b"hello");
    }

    #[test]
    fn relay_reports_failed_recipient_and_delivers_to_rest() {
        let (mut table, mut clients) = table_with_peers(3);

        // Force a deterministic write failure on the middle peer by closing
        // the table-side write direction.
        let fd = table.peer_mut(PEER_BASE + 1).as_raw_fd();
        let rc = unsafe { libc::shutdown(fd, libc::SHUT_WR) };
        assert_eq!(rc, 0);

        let failed = table.relay_from(PEER_BASE, b"payload", &BTreeSet::new());
        assert_eq!(failed, vec![PEER_BASE + 1]);
        assert_eq!(read_some(&mut clients[2]), b"payload");
        expect_silence(&mut clients[0]);
    }

    #[test]
    fn teardown_closes_every_peer() {
        let (table, mut clients) = table_with_peers(2);
        table.teardown();
        let mut buf = [0u8; 8];
        assert_eq!(clients[0].read(&mut buf).unwrap(), 0);
        assert_eq!(clients[1].read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn teardown_unlinks_unix_bind_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.sock");
        let listener = Listener::bind(&Endpoint::Unix { path: path.clone() }).unwrap();
        let (_handle, signal) = shutdown_pair().unwrap();
        let table = ConnectionTable::new(listener, signal);

        assert!(path.exists());
        table.teardown();
        assert!(!path.exists());
    }
}
