//! Shared-memory runtime: one thread per rank, one mailbox per thread.
//!
//! Every rank owns the receiving end of its own channel and a sender to
//! every rank. Messages that arrive before anyone asks for them are parked
//! in a pending queue and matched later on `(source, tag)`, so the order in
//! which peers send never has to line up with the order in which a rank
//! receives.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use log::{trace, warn};

use super::{Comm, Tag};
use crate::core::block::Block;
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};

struct Envelope<T> {
    source: usize,
    tag: Tag,
    blocks: Vec<Block<T>>,
}

pub struct ThreadComm<T> {
    rank: usize,
    size: usize,
    inbox: Receiver<Envelope<T>>,
    outboxes: Vec<Sender<Envelope<T>>>,
    pending: RefCell<VecDeque<Envelope<T>>>,
    timeout: Option<Duration>,
}

impl<T: Scalar> ThreadComm<T> {
    /// Fully connected group of `size` ranks. `timeout` bounds every
    /// receive; `None` waits forever.
    pub fn group(size: usize, timeout: Option<Duration>) -> Vec<Self> {
        let (outboxes, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                size,
                inbox,
                outboxes: outboxes.clone(),
                pending: RefCell::new(VecDeque::new()),
                timeout,
            })
            .collect()
    }

    fn take_pending(&self, source: usize, tag: Tag) -> Option<Envelope<T>> {
        let mut pending = self.pending.borrow_mut();
        let pos = pending.iter().position(|e| e.source == source && e.tag == tag)?;
        pending.remove(pos)
    }

    fn next_envelope(&self, source: usize, tag: Tag, deadline: Option<Instant>) -> Result<Envelope<T>> {
        let received = match deadline {
            None => self.inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                self.inbox.recv_timeout(left)
            }
        };
        received.map_err(|e| match e {
            RecvTimeoutError::Timeout => PdivError::Timeout {
                rank: self.rank,
                peer: source,
                tag,
                timeout: self.timeout.unwrap_or_default(),
            },
            RecvTimeoutError::Disconnected => PdivError::Disconnected { rank: self.rank, peer: source },
        })
    }
}

impl<T: Scalar> Comm for ThreadComm<T> {
    type Scalar = T;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: Tag, blocks: Vec<Block<T>>) -> Result<()> {
        trace!("rank {} -> {dest}: {tag:?} ({} blocks)", self.rank, blocks.len());
        let outbox = self.outboxes.get(dest).ok_or_else(|| {
            PdivError::Runtime(format!("rank {} sent to rank {dest} of {}", self.rank, self.size))
        })?;
        outbox
            .send(Envelope { source: self.rank, tag, blocks })
            .map_err(|_| PdivError::Disconnected { rank: self.rank, peer: dest })
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Block<T>>> {
        if let Some(envelope) = self.take_pending(source, tag) {
            return Ok(envelope.blocks);
        }
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            let envelope = self.next_envelope(source, tag, deadline)?;
            if envelope.tag == Tag::Abort {
                return Err(PdivError::Aborted { rank: self.rank, peer: envelope.source });
            }
            if envelope.source == source && envelope.tag == tag {
                trace!("rank {} <- {source}: {tag:?}", self.rank);
                return Ok(envelope.blocks);
            }
            self.pending.borrow_mut().push_back(envelope);
        }
    }

    fn abort(&self) {
        for dest in (0..self.size).filter(|&r| r != self.rank) {
            // a peer that already finished has dropped its inbox
            let _ = self.outboxes[dest].send(Envelope { source: self.rank, tag: Tag::Abort, blocks: Vec::new() });
        }
    }
}

/// Runs `worker` once per rank, every rank on its own thread, and returns
/// the results in rank order.
#[cfg(feature = "rayon")]
pub fn launch<T, R, F>(comms: Vec<ThreadComm<T>>, worker: F) -> Result<Vec<Result<R>>>
where
    T: Scalar,
    R: Send,
    F: Fn(ThreadComm<T>) -> Result<R> + Sync,
{
    use std::sync::Mutex;

    let n = comms.len();
    if n > num_cpus::get() {
        warn!("{n} ranks on {} cores; ranks will time-share", num_cpus::get());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("pdiv-rank-{i}"))
        .build()
        .map_err(|e| PdivError::Runtime(format!("cannot start {n} worker threads: {e}")))?;
    let slots: Vec<Mutex<Option<ThreadComm<T>>>> = comms.into_iter().map(|c| Mutex::new(Some(c))).collect();
    Ok(pool.broadcast(|ctx| {
        let comm = slots[ctx.index()].lock().ok().and_then(|mut slot| slot.take());
        match comm {
            Some(comm) => worker(comm),
            None => Err(PdivError::Runtime(format!("no communicator for thread {}", ctx.index()))),
        }
    }))
}

/// Runs `worker` once per rank, every rank on its own thread, and returns
/// the results in rank order.
#[cfg(not(feature = "rayon"))]
pub fn launch<T, R, F>(comms: Vec<ThreadComm<T>>, worker: F) -> Result<Vec<Result<R>>>
where
    T: Scalar,
    R: Send,
    F: Fn(ThreadComm<T>) -> Result<R> + Sync,
{
    let worker = &worker;
    let n = comms.len();
    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move || worker(comm)))
            .collect();
        if n > std::thread::available_parallelism().map_or(1, |p| p.get()) {
            warn!("{n} ranks exceed the available cores; ranks will time-share");
        }
        Ok(handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join()
                    .unwrap_or_else(|_| Err(PdivError::Runtime(format!("rank {rank} panicked"))))
            })
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn scalar_block(v: f64) -> Block<f64> {
        Mat::from_fn(1, 1, |_, _| v)
    }

    #[test]
    fn out_of_order_messages_are_matched() {
        let comms = ThreadComm::<f64>::group(2, Some(Duration::from_secs(5)));
        comms[1].send(0, Tag::LowerBoundary, vec![scalar_block(2.0)]).unwrap();
        comms[1].send(0, Tag::UpperBoundary, vec![scalar_block(1.0)]).unwrap();

        let upper = comms[0].recv(1, Tag::UpperBoundary).unwrap();
        assert_eq!(upper[0][(0, 0)], 1.0);
        let lower = comms[0].recv(1, Tag::LowerBoundary).unwrap();
        assert_eq!(lower[0][(0, 0)], 2.0);
    }

    #[test]
    fn missing_message_times_out() {
        let comms = ThreadComm::<f64>::group(2, Some(Duration::from_millis(20)));
        let err = comms[0].recv(1, Tag::Corners).unwrap_err();
        assert!(matches!(err, PdivError::Timeout { rank: 0, peer: 1, tag: Tag::Corners, .. }));
    }

    #[test]
    fn abort_wakes_waiting_peer() {
        let comms = ThreadComm::<f64>::group(3, None);
        comms[2].abort();
        let err = comms[0].recv(1, Tag::MatrixMapSnapshot).unwrap_err();
        assert!(matches!(err, PdivError::Aborted { rank: 0, peer: 2 }));
    }

    #[test]
    fn barrier_and_launch() {
        let comms = ThreadComm::<f64>::group(4, Some(Duration::from_secs(10)));
        let results = launch(comms, |comm| {
            comm.barrier()?;
            comm.send_to_all(0..comm.size(), Tag::Corners, &[scalar_block(comm.rank() as f64)])?;
            let mut sum = 0.0;
            for peer in (0..comm.size()).filter(|&r| r != comm.rank()) {
                sum += comm.recv(peer, Tag::Corners)?[0][(0, 0)];
            }
            comm.barrier()?;
            Ok(sum)
        })
        .unwrap();
        let sums: Vec<f64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(sums, vec![6.0, 5.0, 4.0, 3.0]);
    }
}
