//! 加权抽奖
//!
//! 中奖概率与持有的抽奖券数量严格成正比：在 `[0, total)` 上均匀抽取一张券号，
//! 再通过累计权重数组二分定位券号所属用户。随机源可注入，固定种子可复现。

mod entropy;
mod weighted;

pub use entropy::{EntropySource, FixedFraction, OsEntropy, SeededEntropy};
pub use weighted::WeightedTable;
