//! Non-blocking halo exchange over channels.
//!
//! Models the communication side of the task chains: `init_recv` arms
//! the expected message count, `send_*` tasks post messages eagerly,
//! `recv_*` tasks poll with `try_recv` and report incomplete until every
//! expected message has arrived, and `clear_send` resets the exchange
//! between stages. The polling contract is deliberate: a receive that
//! has not completed is re-invoked on a later pass, never suspended.

use std::error::Error;
use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use torus_core::TaskStatus;

use crate::pack::{BlockField, FaceField, MeshBlockPack};

/// Which ghost region of the receiving block a message fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face {
    /// The receiver's left ghost cells (sent by its left neighbor).
    Left,
    /// The receiver's right ghost cells (sent by its right neighbor).
    Right,
}

/// One halo message: destination block, destination face, payload.
#[derive(Clone, Debug, PartialEq)]
pub struct HaloMsg {
    /// Destination block index within the receiving pack.
    pub block: usize,
    /// Which ghost region the payload fills.
    pub face: Face,
    /// Payload values, innermost-first.
    pub values: Vec<f64>,
}

/// Errors from the exchange plumbing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeError {
    /// The receive side of the channel was dropped.
    Disconnected,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "halo exchange channel disconnected"),
        }
    }
}

impl Error for ExchangeError {}

/// One module's halo-exchange endpoint.
///
/// In-process the channel loops back onto itself, standing in for the
/// transport between ranks; the task-facing contract (arm, send, poll,
/// clear) is what the scheduler's incomplete-polling relies on.
#[derive(Debug)]
pub struct HaloExchange {
    tx: Sender<HaloMsg>,
    rx: Receiver<HaloMsg>,
    expected: usize,
    received: usize,
}

impl Default for HaloExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl HaloExchange {
    /// Create an exchange with a loopback channel.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            expected: 0,
            received: 0,
        }
    }

    /// Swap in a sender whose channel has no receiver, dropping the
    /// loopback sender and disconnecting `rx`.
    #[cfg(test)]
    fn disconnect(&mut self) {
        let (tx, _) = unbounded();
        self.tx = tx;
    }

    /// Arm the exchange for one stage: `expected` messages must arrive
    /// before a receive task may report complete.
    pub fn post_receives(&mut self, expected: usize) {
        self.expected = expected;
        self.received = 0;
    }

    /// Post one message. Never blocks.
    pub fn send(&self, msg: HaloMsg) -> Result<(), ExchangeError> {
        self.tx.send(msg).map_err(|_| ExchangeError::Disconnected)
    }

    /// Poll for arrived messages, handing each to `apply`. Reports
    /// [`TaskStatus::Incomplete`] until the armed count has arrived;
    /// safe to call repeatedly. A disconnected channel with messages
    /// still outstanding is [`TaskStatus::Fail`]: the armed count can
    /// never be met, and silent re-polling would stall the scheduler
    /// with no hint of the cause.
    pub fn try_receive(&mut self, mut apply: impl FnMut(HaloMsg)) -> TaskStatus {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    self.received += 1;
                    apply(msg);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.received < self.expected {
                        return TaskStatus::Fail;
                    }
                    break;
                }
            }
        }
        if self.received >= self.expected {
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        }
    }

    /// Drain any leftover messages and disarm. Called by `clear_send`
    /// tasks at the end of every stage so the exchange is reusable.
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
        self.expected = 0;
        self.received = 0;
    }

    /// Expected messages for a full ghost exchange over `pack`: one per
    /// face per block.
    pub fn ghost_count(pack: &MeshBlockPack) -> usize {
        2 * pack.nmb
    }

    /// Post ghost-cell messages for one cell-centered field: each block
    /// sends its outermost interior cells to both neighbors.
    pub fn send_ghosts(
        &self,
        pack: &MeshBlockPack,
        field: &BlockField,
    ) -> Result<(), ExchangeError> {
        let (is, ie, ng) = (pack.is(), pack.ie(), pack.ng);
        for m in 0..pack.nmb {
            let b = field.block(m);
            // Rightmost interior cells fill the right neighbor's left ghosts.
            self.send(HaloMsg {
                block: pack.right_of(m),
                face: Face::Left,
                values: b[ie + 1 - ng..=ie].to_vec(),
            })?;
            // Leftmost interior cells fill the left neighbor's right ghosts.
            self.send(HaloMsg {
                block: pack.left_of(m),
                face: Face::Right,
                values: b[is..is + ng].to_vec(),
            })?;
        }
        Ok(())
    }

    /// Write one ghost message into a cell-centered field.
    pub fn apply_ghosts(pack: &MeshBlockPack, field: &mut BlockField, msg: &HaloMsg) {
        let ng = pack.ng;
        let ncells = pack.ncells();
        let b = field.block_mut(msg.block);
        match msg.face {
            Face::Left => b[..ng].copy_from_slice(&msg.values),
            Face::Right => b[ncells - ng..].copy_from_slice(&msg.values),
        }
    }

    /// Poll a full ghost exchange into `field`.
    pub fn recv_ghosts(&mut self, pack: &MeshBlockPack, field: &mut BlockField) -> TaskStatus {
        // The closure cannot borrow `self`, so route through a plain poll.
        let mut msgs = Vec::new();
        let status = self.try_receive(|msg| msgs.push(msg));
        for msg in &msgs {
            Self::apply_ghosts(pack, field, msg);
        }
        status
    }

    /// Post shared-face messages for a face-centered field: each block
    /// sends the values at its two boundary interior faces so neighbors
    /// agree on the flux through shared faces.
    pub fn send_shared_faces(
        &self,
        pack: &MeshBlockPack,
        faces: &FaceField,
    ) -> Result<(), ExchangeError> {
        let (is, ie) = (pack.is(), pack.ie());
        for m in 0..pack.nmb {
            let f = faces.block(m);
            self.send(HaloMsg {
                block: pack.right_of(m),
                face: Face::Left,
                values: vec![f[ie + 1]],
            })?;
            self.send(HaloMsg {
                block: pack.left_of(m),
                face: Face::Right,
                values: vec![f[is]],
            })?;
        }
        Ok(())
    }

    /// Poll a shared-face exchange into `faces`, reconciling each shared
    /// face as the mean of the two blocks' values.
    pub fn recv_shared_faces(&mut self, pack: &MeshBlockPack, faces: &mut FaceField) -> TaskStatus {
        let (is, ie) = (pack.is(), pack.ie());
        let mut msgs = Vec::new();
        let status = self.try_receive(|msg| msgs.push(msg));
        for msg in &msgs {
            let f = faces.block_mut(msg.block);
            match msg.face {
                Face::Left => f[is] = 0.5 * (f[is] + msg.values[0]),
                Face::Right => f[ie + 1] = 0.5 * (f[ie + 1] + msg.values[0]),
            }
        }
        status
    }
}
