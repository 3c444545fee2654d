//! Hand-off of serialized bundles to whatever relays them.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Receives serialized bundles. Returns whether the bundle was accepted.
pub trait BundleSubmitter: Send + Sync {
    fn submit(&self, bundle: &[u8]) -> bool;
}

impl<F> BundleSubmitter for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn submit(&self, bundle: &[u8]) -> bool {
        self(bundle)
    }
}

/// Forwards bundles to a bounded channel. A full or closed channel
/// counts as a rejected submission.
pub struct ChannelSubmitter {
    tx: Sender<Bytes>,
}

impl ChannelSubmitter {
    pub fn new(capacity: usize) -> (Self, Receiver<Bytes>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl BundleSubmitter for ChannelSubmitter {
    fn submit(&self, bundle: &[u8]) -> bool {
        self.tx.try_send(Bytes::copy_from_slice(bundle)).is_ok()
    }
}
