use std::convert::TryFrom;

/// Computes the difficulty of the next block from a window of past blocks.
///
/// `timestamps` and `cumulative_difficulties` hold `window + 1` entries in chain order ending
/// at the previous block.
pub trait DifficultyAlgorithm: Send + Sync {
    fn next_difficulty(
        &self,
        timestamps: &[u64],
        cumulative_difficulties: &[u64],
        window: u32,
        block_time: u64,
    ) -> u64;
}

/// Linearly weighted moving average, version 3
#[derive(Debug, Default, Clone, Copy)]
pub struct Lwma3;

impl DifficultyAlgorithm for Lwma3 {
    fn next_difficulty(
        &self,
        timestamps: &[u64],
        cumulative_difficulties: &[u64],
        window: u32,
        block_time: u64,
    ) -> u64 {
        let n = window as usize;
        if n == 0 || timestamps.len() < n + 1 || cumulative_difficulties.len() < n + 1 {
            return 0;
        }

        let t = block_time as u128;
        let mut weighted: u128 = 0;
        let mut sum_last_3: u128 = 0;
        let mut last = timestamps[0];

        for i in 1..=n {
            let next = if timestamps[i] > last {
                timestamps[i]
            } else {
                last + 1
            };
            let solve_time = std::cmp::min(6 * t, (next - last) as u128);
            last = next;
            weighted += solve_time * i as u128;
            if i + 3 > n {
                sum_last_3 += solve_time;
            }
        }

        let work = cumulative_difficulties[n].saturating_sub(cumulative_difficulties[0]) as u128;
        let mut next_d = work * t * (n as u128 + 1) * 99 / (100 * 2 * weighted);

        let prev_d =
            cumulative_difficulties[n].saturating_sub(cumulative_difficulties[n - 1]) as u128;
        next_d = std::cmp::max(prev_d * 67 / 100, std::cmp::min(next_d, prev_d * 150 / 100));

        if sum_last_3 < 9 * t / 10 {
            next_d = std::cmp::max(next_d, prev_d * 108 / 100);
        }

        u64::try_from(next_d).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn window(difficulty: u64, spacing: u64, n: usize) -> (Vec<u64>, Vec<u64>) {
        let timestamps = (0..=n as u64).map(|i| 1_000 + i * spacing).collect();
        let cumulative = (0..=n as u64).map(|i| (i + 1) * difficulty).collect();
        (timestamps, cumulative)
    }

    #[test]
    fn test_stable_hashrate() {
        let (timestamps, cumulative) = window(10_000, 60, 60);
        let next = Lwma3.next_difficulty(&timestamps, &cumulative, 60, 60);
        // on target solve times keep the difficulty within one percent
        assert!(next >= 9_900 && next <= 10_000, "{}", next);
    }

    #[test]
    fn test_bounds() {
        // very slow blocks can at most drop difficulty to 67%
        let (timestamps, cumulative) = window(10_000, 6_000, 60);
        assert_eq!(Lwma3.next_difficulty(&timestamps, &cumulative, 60, 60), 6_700);

        // very fast blocks raise it by at most 50%
        let (timestamps, cumulative) = window(10_000, 1, 60);
        assert_eq!(Lwma3.next_difficulty(&timestamps, &cumulative, 60, 60), 15_000);
    }

    #[test]
    fn test_insufficient_data() {
        let (timestamps, cumulative) = window(10, 60, 5);
        assert_eq!(Lwma3.next_difficulty(&timestamps, &cumulative, 60, 60), 0);
    }
}
