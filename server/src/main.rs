mod counter;

use std::collections::BTreeMap;

use beehive_core::config::HiveConfig;
use beehive_core::hive::Hive;
use beehive_core::network;
use clap::Parser;
use openraft::BasicNode;
use tracing_subscriber::EnvFilter;

/// Runs one beehive node. Grounded on the teacher's
/// `start_example_raft_node(node_id, port, namespace)` entry point,
/// generalized to the cluster-join CLI spec.md §6 describes.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    node_id: u64,

    #[arg(long, default_value = "127.0.0.1:7000")]
    addr: String,

    /// Comma-separated `id@addr` peers already in the cluster. Leave
    /// empty when bootstrapping the very first node.
    #[arg(long, value_delimiter = ',')]
    peer: Vec<String>,

    /// Bootstrap a brand-new single-node cluster. Joining nodes should
    /// omit this and instead be added via `/cluster/add-learner` +
    /// `/cluster/add-node` on an existing member.
    #[arg(long)]
    bootstrap: bool,

    #[arg(long, default_value = "./data")]
    data_dir: String,

    #[arg(long, default_value_t = 1000)]
    snap_count: u64,
}

fn parse_peer(s: &str) -> anyhow::Result<(u64, String)> {
    let (id, addr) = s.split_once('@').ok_or_else(|| anyhow::anyhow!("peer must be id@addr: {s}"))?;
    Ok((id.parse()?, addr.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let cfg = HiveConfig::builder()
        .with_node_id(args.node_id)
        .with_addr(args.addr.clone())
        .with_data_dir(args.data_dir)
        .with_snap_count(args.snap_count)
        .build();

    let mut initial_members: BTreeMap<u64, BasicNode> = BTreeMap::new();
    if args.bootstrap {
        initial_members.insert(args.node_id, BasicNode { addr: args.addr.clone() });
        for p in &args.peer {
            let (id, addr) = parse_peer(p)?;
            initial_members.insert(id, BasicNode { addr });
        }
    }

    let hive = Hive::start(&cfg, args.bootstrap, initial_members).await?;

    let app = hive.new_app(counter::APP_NAME);
    app.handle(counter::MESSAGE_TYPE, counter::CounterHandler);

    tracing::info!(node_id = args.node_id, addr = %cfg.addr, "beehive node starting");
    network::serve(hive, &cfg.addr).await
}
