use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Kaon,
    Korellia,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Kaon, Network::Korellia];

    pub fn chain_id(&self) -> &'static str {
        match self {
            Network::Mainnet => "kyve-1",
            Network::Kaon => "kaon-1",
            Network::Korellia => "korellia-2",
        }
    }

    /// REST endpoint of the pool registry for this chain.
    pub fn registry_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api-eu-1.kyve.network",
            Network::Kaon => "https://api-eu-1.kaon.kyve.network",
            Network::Korellia => "https://api.korellia.kyve.network",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(chain_id: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|network| network.chain_id() == chain_id)
            .ok_or_else(|| {
                format!("unknown chain id {chain_id:?}, expected one of kyve-1, kaon-1, korellia-2")
            })
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.chain_id())
    }
}

/// Base URL that serves bundles of the given storage provider.
///
/// Arweave and Bundlr uploads are both readable through the Arweave gateway.
pub fn storage_gateway(storage_provider_id: u32) -> Option<&'static str> {
    match storage_provider_id {
        1 | 2 => Some("https://arweave.net"),
        3 => Some("https://storage.kyve.network"),
        _ => None,
    }
}
