//! The work queue, the worker pool, result assembly, and the final
//! integrity-checked blob. Parallel OS threads, one per peer endpoint, plus
//! the coordinator thread itself; no cooperative scheduler, no locks beyond
//! the two channels.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::peer::PeerClient;
use crate::piece::{self, PieceResult, PieceWork};
use crate::torrent::TorrentSpec;
use crate::tracker::PeerEndpoint;

const WORK_QUEUE_WAIT: Duration = Duration::from_secs(5);
const JOIN_GRACE: Duration = Duration::from_secs(1);
const WATCHDOG_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("no peers available to download from")]
    NoPeersAvailable,

    #[error("every worker exited before all pieces were collected ({completed}/{total})")]
    Stalled { completed: usize, total: usize },
}

pub type SwarmResult<T> = std::result::Result<T, SwarmError>;

/// A sentinel-carrying queue item: `Poison` is the "broadcast via queue"
/// marker described in spec.md §9 -- a worker that pops it pushes it back
/// before exiting, so every other worker also observes it.
enum WorkItem {
    Work(PieceWork),
    Poison,
}

/// Drives a full swarm download for `spec` against `peers`, returning the
/// assembled, integrity-verified payload as an in-memory blob.
#[tracing::instrument(skip(spec, peers, peer_id), fields(name = %spec.name, peers = peers.len()))]
pub fn download(spec: &TorrentSpec, peers: Vec<PeerEndpoint>, peer_id: [u8; 20]) -> SwarmResult<Vec<u8>> {
    if peers.is_empty() {
        return Err(SwarmError::NoPeersAvailable);
    }

    let (work_tx, work_rx) = crossbeam_channel::unbounded::<WorkItem>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<PieceResult>();

    for (index, hash) in spec.piece_hashes.iter().enumerate() {
        work_tx
            .send(WorkItem::Work(PieceWork {
                index: index as u32,
                hash: *hash,
                length: spec.piece_size(index) as u32,
            }))
            .expect("work queue receiver outlives this send");
    }

    let alive_workers = Arc::new(AtomicUsize::new(peers.len()));
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(peers.len());
    for peer in peers {
        let work_tx = work_tx.clone();
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let alive_workers = Arc::clone(&alive_workers);
        let info_hash = spec.info_hash;
        handles.push(thread::spawn(move || {
            worker_loop(peer, info_hash, peer_id, work_tx, work_rx, result_tx);
            alive_workers.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    let total = spec.num_pieces();
    let assembled = assemble(total, spec.total_length, spec.piece_length, &result_rx, &alive_workers)?;

    for _ in &handles {
        work_tx
            .send(WorkItem::Poison)
            .expect("work queue receiver outlives this send");
    }
    for handle in handles {
        join_with_grace(handle, JOIN_GRACE);
    }

    Ok(assembled)
}

/// One worker's whole lifetime: connect, announce interest, then pull work
/// until poisoned, starved, or dealt an unrecoverable per-peer error.
fn worker_loop(
    peer: PeerEndpoint,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    work_tx: Sender<WorkItem>,
    work_rx: Receiver<WorkItem>,
    result_tx: Sender<PieceResult>,
) {
    let mut client = match PeerClient::connect(peer.socket_addr(), info_hash, peer_id) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "peer construction failed, discarding peer");
            return;
        }
    };

    if let Err(e) = client.unchoke().and_then(|()| client.interested()) {
        tracing::warn!(%peer, error = %e, "failed to announce interest");
        return;
    }
    tracing::info!(%peer, "connected");

    loop {
        let item = match work_rx.recv_timeout(WORK_QUEUE_WAIT) {
            Ok(item) => item,
            Err(_) => {
                tracing::debug!(%peer, "work queue starved, winding down");
                return;
            }
        };

        let work = match item {
            WorkItem::Poison => {
                let _ = work_tx.send(WorkItem::Poison);
                return;
            }
            WorkItem::Work(work) => work,
        };

        if !client.bitfield.has(work.index as usize) {
            let _ = work_tx.send(WorkItem::Work(work));
            continue;
        }

        let index = work.index;
        let outcome = piece::attempt_download_piece(&mut client, &work)
            .and_then(|data| piece::verify_integrity(&work, &data).map(|()| data));
        match outcome {
            Ok(data) => {
                let _ = client.have(index);
                if result_tx.send(PieceResult { index, data }).is_err() {
                    return;
                }
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(%peer, piece = index, error = %e, "piece download timed out, requeueing and discarding peer");
                let _ = work_tx.send(WorkItem::Work(work));
                return;
            }
            Err(e) => {
                tracing::warn!(%peer, piece = index, error = %e, "piece failed, requeueing and discarding peer");
                let _ = work_tx.send(WorkItem::Work(work));
                return;
            }
        }
    }
}

/// Pulls results until every piece is accounted for, writing each into the
/// destination buffer at `index * piece_length`. Polls `alive_workers` so a
/// swarm that loses every worker before finishing fails loudly instead of
/// blocking forever (spec.md §9's suggested watchdog).
fn assemble(
    total: usize,
    total_length: u64,
    piece_length: u32,
    result_rx: &Receiver<PieceResult>,
    alive_workers: &Arc<AtomicUsize>,
) -> SwarmResult<Vec<u8>> {
    let mut buf = vec![0u8; total_length as usize];
    let mut completed = 0usize;

    while completed < total {
        match result_rx.recv_timeout(WATCHDOG_POLL) {
            Ok(result) => {
                let begin = result.index as usize * piece_length as usize;
                let end = begin + result.data.len();
                buf[begin..end].copy_from_slice(&result.data);
                completed += 1;
                tracing::info!(
                    "({:.2}%) downloaded piece #{}",
                    (completed as f64 / total as f64) * 100.0,
                    result.index
                );
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if alive_workers.load(Ordering::SeqCst) == 0 {
                    return Err(SwarmError::Stalled { completed, total });
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                return Err(SwarmError::Stalled { completed, total });
            }
        }
    }

    Ok(buf)
}

/// Joins `handle`, abandoning it if it hasn't returned within `grace`.
/// `std::thread::JoinHandle` has no native timed join, so a proxy thread
/// races the real join against a channel timeout; workers are daemon-class
/// and the process exits regardless of whether the proxy thread is still
/// waiting.
fn join_with_grace(handle: JoinHandle<()>, grace: Duration) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    if rx.recv_timeout(grace).is_err() {
        tracing::debug!("worker thread did not finish within the join grace period, abandoning");
    }
}
