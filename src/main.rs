//! CLI entry point: reads a metainfo file, announces to its tracker, and
//! drives the swarm coordinator to download the declared payload to disk.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use rstc::bencode;
use rstc::torrent::TorrentSpec;
use rstc::{swarm, tracker};

/// Advertised to the tracker; the client never actually listens on it.
const LISTEN_PORT: u16 = 6881;

#[derive(Debug, Parser)]
#[command(name = "rstc", about = "A minimal single-file BitTorrent v1 downloader")]
struct Cli {
    /// Path to the .torrent metainfo file.
    torrent: PathBuf,

    /// Path to write the downloaded payload to.
    output: PathBuf,

    /// Enable verbose informational logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data = fs::read(&cli.torrent)
        .with_context(|| format!("reading metainfo file {}", cli.torrent.display()))?;
    let value = bencode::decode(&data).context("decoding metainfo file as bencode")?;
    let spec = TorrentSpec::parse(value).context("parsing metainfo")?;

    tracing::info!(
        name = %spec.name,
        info_hash = %hex::encode(spec.info_hash),
        pieces = spec.num_pieces(),
        "loaded torrent"
    );

    let peer_id = generate_peer_id();
    let peers = tracker::announce(&spec.announce, &spec.info_hash, &peer_id, LISTEN_PORT, spec.total_length)
        .context("announcing to tracker")?;
    tracing::info!(count = peers.len(), "tracker returned peers");

    let blob = swarm::download(&spec, peers, peer_id).context("downloading torrent")?;

    fs::write(&cli.output, blob)
        .with_context(|| format!("writing output file {}", cli.output.display()))?;
    tracing::info!(path = %cli.output.display(), "download complete");

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .init();
}

/// A fresh 20-byte peer-id: an 8-byte client prefix followed by 12
/// cryptographically random bytes.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    rand::rng().fill(&mut peer_id[prefix.len()..]);
    peer_id
}
