use std::ffi::OsString;
use std::path::Path;

/// How the node binary is started for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Application only, without the node's consensus engine. The sync
    /// process is the sole writer of the block and state stores.
    DatabaseOnly,

    /// Full node with peer exchange and every peer list cleared, so no block
    /// can arrive over P2P during the session.
    IsolatedNetwork,
}

impl StartMode {
    pub fn args(&self, home: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["start".into(), "--home".into(), home.as_os_str().to_owned()];
        match self {
            StartMode::DatabaseOnly => args.push("--with-tendermint=false".into()),
            StartMode::IsolatedNetwork => {
                for flag in [
                    "--p2p.pex=false",
                    "--p2p.persistent_peers",
                    "",
                    "--p2p.private_peer_ids",
                    "",
                    "--p2p.unconditional_peer_ids",
                    "",
                ] {
                    args.push(flag.into());
                }
            }
        }
        args
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::DatabaseOnly => "database-only",
            StartMode::IsolatedNetwork => "isolated-network",
        }
    }
}
