//! 随机源

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 抽奖随机源
pub trait EntropySource: Send + Sync {
    /// 在 `[0, total)` 上均匀取一个券号；`total == 0` 时返回 0
    fn pick_ticket(&self, total: u64) -> u64;
}

/// 操作系统播种的密码学安全随机源（默认）
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn pick_ticket(&self, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        rand::rng().random_range(0..total)
    }
}

/// 固定种子随机源，相同种子与相同参与分布得到相同的开奖序列
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn pick_ticket(&self, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        self.rng.lock().random_range(0..total)
    }
}

/// 固定比例随机源，券号为 `floor(fraction * total)`，用于验证开奖结果
#[derive(Debug, Clone, Copy)]
pub struct FixedFraction(pub f64);

impl EntropySource for FixedFraction {
    fn pick_ticket(&self, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        let ticket = (self.0.clamp(0.0, 1.0) * total as f64).floor() as u64;
        ticket.min(total - 1)
    }
}
