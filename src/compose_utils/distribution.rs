use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistributionMode {
    Even,
    #[default]
    Random,
}

/// Splits a lovelace total across a number of outputs.
///
/// Every produced amount is raised to `floor` when it falls below it, so the
/// realised sum may exceed the requested total. This keeps all outputs
/// spendable and is not re-normalised.
pub struct OutputDistribution {
    mode: DistributionMode,
    floor: u64,
    rng: StdRng,
}

impl OutputDistribution {
    pub fn new(mode: DistributionMode, floor: u64) -> Self {
        Self {
            mode,
            floor,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mode: DistributionMode, floor: u64, seed: u64) -> Self {
        Self {
            mode,
            floor,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> DistributionMode {
        self.mode
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// The floor follows the protocol minimum, which is refreshed every iteration.
    pub fn set_floor(&mut self, floor: u64) {
        self.floor = floor;
    }

    pub fn generate(&mut self, count: usize, total: u64) -> Vec<u64> {
        if count == 0 {
            return vec![];
        }

        let amounts = match self.mode {
            DistributionMode::Even => even_amounts(count, total),
            DistributionMode::Random => self.random_amounts(count, total),
        };

        apply_floor(amounts, self.floor)
    }

    fn random_amounts(&mut self, count: usize, total: u64) -> Vec<u64> {
        let weights: Vec<f64> = (0..count).map(|_| self.rng.gen::<f64>()).collect();
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return even_amounts(count, total);
        }

        weights
            .into_iter()
            .map(|weight| (weight / weight_sum * total as f64) as u64)
            .collect()
    }
}

fn even_amounts(count: usize, total: u64) -> Vec<u64> {
    vec![total / count as u64; count]
}

fn apply_floor(amounts: Vec<u64>, floor: u64) -> Vec<u64> {
    amounts.into_iter().map(|amount| amount.max(floor)).collect()
}
