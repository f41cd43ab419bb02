use heapless::Vec;

use crate::{bitmap::IdBitmap, TxRxError, TxRxResult};

/// A MAC address.
pub type MacAddress = [u8; 6];
/// The id of the virtual device (link) a peer belongs to.
pub type VdevId = u32;
/// A numeric id assigned to a peer by the target.
pub type PeerId = u16;

/// The number of distinct peer ids the target can assign.
pub const MAX_NUM_PEER_IDS: usize = 2048;

/// The set of peer ids currently assigned to one peer.
pub type PeerIdSet = IdBitmap<{ MAX_NUM_PEER_IDS / u32::BITS as usize }>;

/// A remote station, as known to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Peer {
    vdev_id: VdevId,
    addr: MacAddress,
    peer_ids: PeerIdSet,
}
impl Peer {
    /// Create a peer with no ids assigned yet.
    pub const fn new(vdev_id: VdevId, addr: MacAddress) -> Self {
        Self {
            vdev_id,
            addr,
            peer_ids: PeerIdSet::new(),
        }
    }
    pub const fn vdev_id(&self) -> VdevId {
        self.vdev_id
    }
    pub const fn addr(&self) -> &MacAddress {
        &self.addr
    }
    /// The ids the target currently uses for this peer.
    ///
    /// During handover, this can contain more than one id.
    pub const fn peer_ids(&self) -> &PeerIdSet {
        &self.peer_ids
    }
    /// Check if the target assigned at least one id to this peer.
    pub fn is_mapped(&self) -> bool {
        !self.peer_ids.is_empty()
    }
    fn matches(&self, vdev_id: VdevId, addr: &MacAddress) -> bool {
        self.vdev_id == vdev_id && self.addr == *addr
    }
}

/// The registry of all peers and the ids assigned to them.
///
/// No peer id is ever a member of two peers at the same time.
pub struct PeerTable<const PEERS: usize> {
    peers: Vec<Peer, PEERS>,
}
impl<const PEERS: usize> PeerTable<PEERS> {
    pub const fn new() -> Self {
        Self { peers: Vec::new() }
    }
    pub fn len(&self) -> usize {
        self.peers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }
    /// Find the peer with the address on the specified link.
    pub fn find(&self, vdev_id: VdevId, addr: &MacAddress) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.matches(vdev_id, addr))
    }
    fn find_mut(&mut self, vdev_id: VdevId, addr: &MacAddress) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| peer.matches(vdev_id, addr))
    }
    fn position_by_id(&self, peer_id: PeerId) -> Option<usize> {
        self.peers
            .iter()
            .position(|peer| peer.peer_ids.contains(peer_id as usize))
    }
    /// Find the peer, which currently owns the id.
    pub fn find_by_id(&self, peer_id: PeerId) -> Option<&Peer> {
        self.position_by_id(peer_id).map(|index| &self.peers[index])
    }
    /// Add a new, unmapped peer.
    pub fn insert(&mut self, vdev_id: VdevId, addr: MacAddress) -> TxRxResult<()> {
        if self.find(vdev_id, &addr).is_some() {
            return Err(TxRxError::PeerExists);
        }
        self.peers
            .push(Peer::new(vdev_id, addr))
            .map_err(|_| TxRxError::PeerTableFull)
    }
    /// Remove the peer and return it.
    pub fn remove(&mut self, vdev_id: VdevId, addr: &MacAddress) -> TxRxResult<Peer> {
        let index = self
            .peers
            .iter()
            .position(|peer| peer.matches(vdev_id, addr))
            .ok_or(TxRxError::UnknownPeer)?;
        Ok(self.peers.swap_remove(index))
    }
    /// Remove all peers of the link.
    ///
    /// `on_removed` is called for every peer taken out of the table.
    pub fn cleanup(&mut self, vdev_id: VdevId, mut on_removed: impl FnMut(&Peer)) -> usize {
        let before = self.peers.len();
        self.peers.retain(|peer| {
            if peer.vdev_id == vdev_id {
                on_removed(peer);
                false
            } else {
                true
            }
        });
        before - self.peers.len()
    }
    /// Assign the id to the peer.
    ///
    /// If another peer still owns the id, it is taken away from that peer first.
    pub fn map_id(&mut self, vdev_id: VdevId, addr: &MacAddress, peer_id: PeerId) -> TxRxResult<()> {
        if peer_id as usize >= MAX_NUM_PEER_IDS {
            return Err(TxRxError::PeerIdOutOfRange);
        }
        if self.find(vdev_id, addr).is_none() {
            return Err(TxRxError::UnknownPeer);
        }
        if let Some(owner) = self.position_by_id(peer_id) {
            let owner = &mut self.peers[owner];
            if !owner.matches(vdev_id, addr) {
                warn!(
                    "Peer id {} was still assigned to {:?} on vdev {}, reassigning it.",
                    peer_id,
                    owner.addr,
                    owner.vdev_id
                );
                owner.peer_ids.remove(peer_id as usize);
            }
        }
        let Some(peer) = self.find_mut(vdev_id, addr) else {
            return Err(TxRxError::UnknownPeer);
        };
        peer.peer_ids.insert(peer_id as usize);
        Ok(())
    }
    /// Take the id away from its owner.
    ///
    /// Returns `true`, if the owner has no ids left afterwards.
    pub fn unmap_id(&mut self, peer_id: PeerId) -> TxRxResult<bool> {
        let owner = self
            .position_by_id(peer_id)
            .ok_or(TxRxError::UnknownId)?;
        let peer = &mut self.peers[owner];
        peer.peer_ids.remove(peer_id as usize);
        Ok(!peer.is_mapped())
    }
}
impl<const PEERS: usize> Default for PeerTable<PEERS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::vec::Vec;

    const ADDR_A: MacAddress = [0x00, 0x03, 0x7f, 0x00, 0x00, 0x0a];
    const ADDR_B: MacAddress = [0x00, 0x03, 0x7f, 0x00, 0x00, 0x0b];

    fn ids(peer: &Peer) -> Vec<usize> {
        peer.peer_ids().iter().collect()
    }

    #[test]
    fn test_handover() {
        let mut table = PeerTable::<4>::new();
        table.insert(0, ADDR_A).unwrap();
        assert!(!table.find(0, &ADDR_A).unwrap().is_mapped());

        table.map_id(0, &ADDR_A, 5).unwrap();
        table.map_id(0, &ADDR_A, 9).unwrap();
        assert_eq!(ids(table.find(0, &ADDR_A).unwrap()), [5, 9]);
        assert_eq!(table.find_by_id(9).unwrap().addr(), &ADDR_A);

        assert_eq!(table.unmap_id(5), Ok(false));
        assert_eq!(ids(table.find(0, &ADDR_A).unwrap()), [9]);
        assert_eq!(table.unmap_id(9), Ok(true));
        assert!(!table.find(0, &ADDR_A).unwrap().is_mapped());
        assert!(table.find_by_id(9).is_none());
    }

    #[test]
    fn test_insert_remove() {
        let mut table = PeerTable::<2>::new();
        table.insert(0, ADDR_A).unwrap();
        assert_eq!(table.insert(0, ADDR_A), Err(TxRxError::PeerExists));
        // Same address on another link is a different peer.
        table.insert(1, ADDR_A).unwrap();
        assert_eq!(table.insert(0, ADDR_B), Err(TxRxError::PeerTableFull));

        assert_eq!(table.remove(1, &ADDR_A).unwrap().vdev_id(), 1);
        assert_eq!(table.remove(1, &ADDR_A), Err(TxRxError::UnknownPeer));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_peer_and_range() {
        let mut table = PeerTable::<2>::new();
        table.insert(0, ADDR_A).unwrap();
        assert_eq!(table.map_id(0, &ADDR_B, 1), Err(TxRxError::UnknownPeer));
        assert_eq!(table.map_id(1, &ADDR_A, 1), Err(TxRxError::UnknownPeer));
        assert_eq!(
            table.map_id(0, &ADDR_A, MAX_NUM_PEER_IDS as PeerId),
            Err(TxRxError::PeerIdOutOfRange)
        );
        assert!(!table.find(0, &ADDR_A).unwrap().is_mapped());
    }

    #[test]
    fn test_unmap_unknown_id() {
        let mut table = PeerTable::<2>::new();
        table.insert(0, ADDR_A).unwrap();
        table.map_id(0, &ADDR_A, 3).unwrap();
        let before = table.find(0, &ADDR_A).unwrap().clone();

        assert_eq!(table.unmap_id(4), Err(TxRxError::UnknownId));
        assert_eq!(table.unmap_id(4000), Err(TxRxError::UnknownId));
        assert_eq!(table.find(0, &ADDR_A).unwrap(), &before);
    }

    #[test]
    fn test_reassign_owned_id() {
        let mut table = PeerTable::<2>::new();
        table.insert(0, ADDR_A).unwrap();
        table.insert(0, ADDR_B).unwrap();
        table.map_id(0, &ADDR_A, 7).unwrap();
        table.map_id(0, &ADDR_B, 7).unwrap();

        assert!(!table.find(0, &ADDR_A).unwrap().is_mapped());
        assert_eq!(table.find_by_id(7).unwrap().addr(), &ADDR_B);
    }

    #[test]
    fn test_cleanup() {
        let mut table = PeerTable::<4>::new();
        table.insert(0, ADDR_A).unwrap();
        table.insert(1, ADDR_A).unwrap();
        table.insert(0, ADDR_B).unwrap();
        table.map_id(0, &ADDR_B, 1).unwrap();

        let mut mapped = 0;
        let removed = table.cleanup(0, |peer| {
            if peer.is_mapped() {
                mapped += 1;
            }
        });
        assert_eq!(removed, 2);
        assert_eq!(mapped, 1);
        assert_eq!(table.len(), 1);
        assert!(table.find_by_id(1).is_none());
    }

    #[test]
    fn test_disjoint_ids() {
        const ADDRS: [MacAddress; 4] = [
            [2, 0, 0, 0, 0, 0],
            [2, 0, 0, 0, 0, 1],
            [2, 0, 0, 0, 0, 2],
            [2, 0, 0, 0, 0, 3],
        ];
        let mut table = PeerTable::<4>::new();
        for addr in ADDRS {
            table.insert(0, addr).unwrap();
        }
        // Linear congruential generator, so the sequence is reproducible.
        let mut seed = 12345u32;
        let mut next = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            seed >> 16
        };
        for _ in 0..2000 {
            let peer_id = (next() % 64) as PeerId;
            if next() % 2 == 0 {
                let addr = ADDRS[next() as usize % ADDRS.len()];
                table.map_id(0, &addr, peer_id).unwrap();
            } else {
                let _ = table.unmap_id(peer_id);
            }
            let peers: Vec<&Peer> = table.iter().collect();
            for (i, a) in peers.iter().enumerate() {
                for b in &peers[i + 1..] {
                    assert!(a.peer_ids().is_disjoint(b.peer_ids()));
                }
            }
        }
    }
}
