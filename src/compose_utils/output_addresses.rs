use crate::collaborators::AddressFactory;
use crate::utxo::{OutputSet, TxOut};
use anyhow::anyhow;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Where fragmentation outputs are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputAddressMode {
    Bootstrap,
    /// Drawn from addresses already known to the wallet store.
    Random,
    /// Freshly created through the wallet server, even in dry runs.
    New,
}

impl FromStr for OutputAddressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(OutputAddressMode::Bootstrap),
            "random" => Ok(OutputAddressMode::Random),
            "new" => Ok(OutputAddressMode::New),
            other => Err(anyhow!("unknown output address mode: {}", other)),
        }
    }
}

impl fmt::Display for OutputAddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputAddressMode::Bootstrap => "bootstrap",
            OutputAddressMode::Random => "random",
            OutputAddressMode::New => "new",
        };
        f.write_str(name)
    }
}

pub async fn output_addresses<R: Rng + Send>(
    mode: OutputAddressMode,
    count: usize,
    bootstrap_address: &str,
    wallet_addresses: &[String],
    factory: &dyn AddressFactory,
    rng: &mut R,
) -> anyhow::Result<Vec<String>> {
    match mode {
        OutputAddressMode::Bootstrap => Ok(vec![bootstrap_address.to_string(); count]),
        OutputAddressMode::Random => random_addresses(count, wallet_addresses, rng),
        OutputAddressMode::New => {
            let mut addresses = Vec::with_capacity(count);
            for _ in 0..count {
                addresses.push(factory.create_address().await?);
            }
            Ok(addresses)
        }
    }
}

/// Unique picks while there are enough addresses, repeats allowed otherwise.
fn random_addresses<R: Rng>(
    count: usize,
    wallet_addresses: &[String],
    rng: &mut R,
) -> anyhow::Result<Vec<String>> {
    if wallet_addresses.is_empty() {
        return Err(anyhow!("no wallet addresses available for random outputs"));
    }
    if count < wallet_addresses.len() {
        return Ok(wallet_addresses
            .choose_multiple(rng, count)
            .cloned()
            .collect());
    }
    Ok((0..count)
        .filter_map(|_| wallet_addresses.choose(rng).cloned())
        .collect())
}

pub fn build_outputs(addresses: Vec<String>, amounts: Vec<u64>) -> anyhow::Result<OutputSet> {
    if addresses.len() != amounts.len() {
        return Err(anyhow!(
            "output address count {} does not match amount count {}",
            addresses.len(),
            amounts.len()
        ));
    }
    Ok(OutputSet::from_outputs(
        addresses
            .into_iter()
            .zip(amounts)
            .map(|(address, amount)| TxOut::new(address, amount))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::collaborators::AddressFactory;
    use crate::compose_utils::output_addresses::{
        build_outputs, output_addresses, OutputAddressMode,
    };
    use async_trait::async_trait;
    use itertools::Itertools;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct SequentialFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl AddressFactory for SequentialFactory {
        async fn create_address(&self) -> anyhow::Result<String> {
            let index = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("new{index}"))
        }
    }

    fn known() -> Vec<String> {
        (0..5).map(|i| format!("known{i}")).collect()
    }

    #[tokio::test]
    async fn bootstrap_mode_repeats_bootstrap() {
        let factory = SequentialFactory::default();
        let mut rng = StdRng::seed_from_u64(1);
        let addresses =
            output_addresses(OutputAddressMode::Bootstrap, 3, "boot", &known(), &factory, &mut rng)
                .await
                .unwrap();
        assert_eq!(addresses, vec!["boot", "boot", "boot"]);
    }

    #[tokio::test]
    async fn random_mode_is_unique_when_possible() {
        let factory = SequentialFactory::default();
        let mut rng = StdRng::seed_from_u64(1);
        let addresses =
            output_addresses(OutputAddressMode::Random, 4, "boot", &known(), &factory, &mut rng)
                .await
                .unwrap();
        assert_eq!(addresses.len(), 4);
        assert_eq!(addresses.iter().unique().count(), 4);
        assert!(addresses.iter().all(|a| known().contains(a)));
    }

    #[tokio::test]
    async fn random_mode_repeats_when_short() {
        let factory = SequentialFactory::default();
        let mut rng = StdRng::seed_from_u64(1);
        let addresses =
            output_addresses(OutputAddressMode::Random, 12, "boot", &known(), &factory, &mut rng)
                .await
                .unwrap();
        assert_eq!(addresses.len(), 12);
        assert!(addresses.iter().all(|a| known().contains(a)));
        assert!(output_addresses(OutputAddressMode::Random, 1, "boot", &[], &factory, &mut rng)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn new_mode_creates_one_per_output() {
        let factory = SequentialFactory::default();
        let mut rng = StdRng::seed_from_u64(1);
        let addresses =
            output_addresses(OutputAddressMode::New, 3, "boot", &[], &factory, &mut rng)
                .await
                .unwrap();
        assert_eq!(addresses, vec!["new0", "new1", "new2"]);
    }

    #[test]
    fn outputs_pair_addresses_and_amounts() {
        let outputs = build_outputs(vec!["a".into(), "b".into()], vec![3, 4]).unwrap();
        assert_eq!(outputs.count(), 2);
        assert_eq!(outputs.sum(), 7);
        assert!(build_outputs(vec!["a".into()], vec![]).is_err());
    }

    #[test]
    fn mode_names() {
        for name in ["bootstrap", "random", "new"] {
            assert_eq!(OutputAddressMode::from_str(name).unwrap().to_string(), name);
        }
        assert!(OutputAddressMode::from_str("fresh").is_err());
    }
}
