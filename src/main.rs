// File: main.rs
//
// The purpose of this file is the process entry point: parse CLI
// arguments, either bootstrap a fresh one-node ring or join an existing
// one through a peer, then serve the wire protocol over HTTP until the
// process is asked to stop. The separate client utility / topology
// visualiser named in spec.md §1 as out-of-scope are not implemented
// here -- this binary only ever runs a single ring participant.

mod config;
mod consistency;
mod error;
mod hash;
mod membership;
mod node;
mod overlay;
mod replication;
mod routing;
mod server;
mod store;
mod transport;
mod wire;

#[cfg(test)]
mod testutil;

use std::net::SocketAddr;
use std::sync::Arc;
use structopt::StructOpt;
use tracing::info;

use config::{validate_k, Consistency as ConsistencyMode};
use node::{Node, NodeDescriptor};
use transport::HttpTransport;

#[derive(Debug, StructOpt)]
#[structopt(name = "chordring", about = "A replicated, consistent-hashing key-value ring node.")]
struct Cli {
  /// IP address this node listens on.
  ip: String,

  /// Port this node listens on.
  port: u16,

  /// IP address of an existing ring member to join through. Omit to
  /// bootstrap a brand-new, single-node ring.
  #[structopt(long)]
  bootstrap_ip: Option<String>,

  /// Port of the existing ring member named by `--bootstrap-ip`.
  #[structopt(long)]
  bootstrap_port: Option<u16>,

  /// Consistency mode for a freshly bootstrapped ring: "eventual" or
  /// "linearizability". Ignored when joining -- the joining node adopts
  /// whatever the ring already agreed on.
  #[structopt(long, default_value = "eventual")]
  consistency: String,

  /// Replication factor (total copies per key, primary included) for a
  /// freshly bootstrapped ring, in [1, 10]. Ignored when joining.
  #[structopt(long, default_value = "3")]
  k_factor: u8,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::from_args();
  let transport = Arc::new(HttpTransport::new());

  let node: Arc<Node> = match (&cli.bootstrap_ip, cli.bootstrap_port) {
    (Some(bootstrap_ip), Some(bootstrap_port)) => {
      let bootstrap = NodeDescriptor::new(bootstrap_ip, bootstrap_port);
      info!(peer = %bootstrap.addr(), "joining ring via bootstrap peer");
      membership::join_via(&cli.ip, cli.port, &bootstrap, transport)
        .await
        .expect("failed to join ring")
    }
    (None, None) => {
      let consistency: ConsistencyMode = cli
        .consistency
        .parse()
        .expect("invalid --consistency value");
      let k = validate_k(cli.k_factor).expect("invalid --k-factor value");
      info!(ip = %cli.ip, port = cli.port, ?consistency, k, "bootstrapping new ring");
      Node::bootstrap(&cli.ip, cli.port, consistency, k, transport)
    }
    _ => {
      eprintln!("--bootstrap-ip and --bootstrap-port must be given together");
      std::process::exit(1);
    }
  };

  let addr: SocketAddr = format!("{}:{}", cli.ip, cli.port)
    .parse()
    .expect("invalid ip/port combination");

  info!(%addr, id = node.id(), "serving ring node");

  let app = server::router(node);
  axum::Server::bind(&addr)
    .serve(app.into_make_service())
    .await
    .expect("server error");
}
