//! `REQUEST_AWAITING_RESP` (§9 Open Question 3): one `oneshot` slot per pending strong request,
//! signalled when the request is promoted into `COMMITTED`.

use std::collections::HashMap;

use cabkv_wire::Oid;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct PendingResponses {
	slots: HashMap<Oid, oneshot::Sender<()>>,
}

impl PendingResponses {
	pub fn register(&mut self, id: Oid) -> oneshot::Receiver<()> {
		let (tx, rx) = oneshot::channel();
		self.slots.insert(id, tx);
		rx
	}

	/// Signal every id in `ids` that has a pending waiter; ids with no waiter (weak ops, or
	/// ops whose caller already timed out) are silently ignored.
	pub fn notify_all(&mut self, ids: &[Oid]) {
		for id in ids {
			if let Some(tx) = self.slots.remove(id) {
				let _ = tx.send(());
			}
		}
	}
}
