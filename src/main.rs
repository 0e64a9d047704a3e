use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::time::Duration;
use ut_fetch::metainfo::Info;
use ut_fetch::{utils, Config, Session};

#[derive(Parser, Debug)]
#[clap(about = "Fetch a torrent's info dictionary from a single peer")]
struct Cli {
    #[clap(help = "peer address, host:port")]
    peer: String,
    #[clap(help = "info hash, 40 hex characters")]
    info_hash: String,
    #[clap(long, help = "our peer id, 20 characters or 40 hex characters")]
    peer_id: Option<String>,
    #[clap(long, default_value = "3", help = "seconds to wait for the TCP connection")]
    dial_timeout: u64,
    #[clap(long, default_value = "5", help = "seconds allowed for each handshake")]
    handshake_timeout: u64,
    #[clap(long, default_value = "30", help = "seconds allowed to collect all pieces")]
    metadata_timeout: u64,
    #[clap(short, long, help = "where to write the raw info dictionary")]
    out: Option<String>,
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    log::debug!("{:?}", args);

    let info_hash = utils::parse_info_hash(&args.info_hash)
        .ok_or_else(|| anyhow!("invalid info hash {:?}", args.info_hash))?;
    let peer_id = match &args.peer_id {
        Some(id) => utils::parse_peer_id(id).ok_or_else(|| anyhow!("invalid peer id {:?}", id))?,
        None => utils::generate_peer_id(),
    };

    let config = Config {
        dial_timeout: Duration::from_secs(args.dial_timeout),
        handshake_timeout: Duration::from_secs(args.handshake_timeout),
        metadata_timeout: Duration::from_secs(args.metadata_timeout),
        ..Config::default()
    };

    let mut session = Session::new(args.peer.clone(), info_hash, peer_id, config);
    let metadata = session
        .fetch()
        .with_context(|| format!("failed to fetch metadata from {}", args.peer))?;

    if let Some(path) = &args.out {
        std::fs::write(path, &metadata).with_context(|| format!("failed to write {}", path))?;
    }

    let info = Info::from_bytes(&metadata)?;
    println!("name:    {}", info.name);
    println!("size:    {} bytes", info.total_length());
    println!("files:   {}", info.file_count());
    println!("pieces:  {} x {} bytes", info.piece_hashes().len(), info.piece_length);
    Ok(())
}
