//! Traffic splitting for layers.
//!
//! ## Algorithm
//! 1. Normalize the arm ratios so they sum to 1
//! 2. Hash the bucket key (salted with the layer name) with blake3 and map
//!    the first 8 bytes to a draw in [0, 1)
//! 3. Walk the cumulative distribution and pick the first arm whose upper
//!    bound exceeds the draw
//!
//! The same key always lands in the same arm of the same layer, and
//! independent layers split the same population independently.

use task_config::{ExperimentArm, LayerConfig};

use crate::context::RequestContext;
use crate::error::{TaskError, TaskResult};

/// Parameter consulted when the request carries no subject id.
pub const BUCKET_KEY_PARAM: &str = "bucketKey";

/// Scale weights so they sum to 1.
///
/// Fails when the sum is not a positive finite number.
pub fn normalize(weights: &[f64]) -> TaskResult<Vec<f64>> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(TaskError::InvalidBucketConfig(format!(
            "weights must be finite and non-negative: {:?}",
            weights
        )));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(TaskError::InvalidBucketConfig(
            "sum of weights is zero".to_string(),
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Key a request is bucketed on: subject id, then the `bucketKey`
/// parameter, then the empty key.
pub fn bucket_key(ctx: &RequestContext) -> String {
    ctx.id()
        .map(str::to_string)
        .or_else(|| ctx.lookup_str(BUCKET_KEY_PARAM))
        .unwrap_or_default()
}

/// Picks an experiment for a request.
pub trait Bucketizer: Send + Sync {
    fn to_bucket(&self, ctx: &RequestContext) -> TaskResult<String>;
}

/// Deterministic hash bucketing.
#[derive(Debug, Clone)]
pub struct HashBucketizer {
    layer: String,
    arms: Vec<ExperimentArm>,
    salt_with_layer: bool,
}

impl HashBucketizer {
    pub fn new(layer: impl Into<String>, arms: Vec<ExperimentArm>, salt_with_layer: bool) -> Self {
        Self {
            layer: layer.into(),
            arms,
            salt_with_layer,
        }
    }

    pub fn from_config(config: &LayerConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.experiments.clone(),
            config.bucketizer.salt_with_layer,
        )
    }

    /// Arm for an explicit key.
    pub fn assign(&self, key: &str) -> TaskResult<&str> {
        let weights: Vec<f64> = self.arms.iter().map(|arm| arm.ratio).collect();
        let probabilities = normalize(&weights).map_err(|e| match e {
            TaskError::InvalidBucketConfig(reason) => {
                TaskError::InvalidBucketConfig(format!("layer {}: {}", self.layer, reason))
            }
            other => other,
        })?;

        let draw = self.draw(key);
        let mut upper = 0.0;
        let mut fallback = None;
        for (arm, p) in self.arms.iter().zip(&probabilities) {
            if *p <= 0.0 {
                continue;
            }
            upper += p;
            if draw < upper {
                return Ok(&arm.name);
            }
            fallback = Some(arm.name.as_str());
        }
        // Rounding can leave the total a hair under 1
        fallback.ok_or_else(|| {
            TaskError::InvalidBucketConfig(format!("layer {} has no experiments", self.layer))
        })
    }

    /// Uniform draw in [0, 1) derived from the key.
    fn draw(&self, key: &str) -> f64 {
        let mut hasher = blake3::Hasher::new();
        if self.salt_with_layer {
            hasher.update(self.layer.as_bytes());
            hasher.update(b"/");
        }
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        // 53 bits fit an f64 mantissa exactly
        (u64::from_be_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Bucketizer for HashBucketizer {
    fn to_bucket(&self, ctx: &RequestContext) -> TaskResult<String> {
        let key = bucket_key(ctx);
        self.assign(&key).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn arms(ratios: &[(&str, f64)]) -> Vec<ExperimentArm> {
        ratios
            .iter()
            .map(|(name, ratio)| ExperimentArm {
                name: name.to_string(),
                ratio: *ratio,
            })
            .collect()
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let p = normalize(&[1.0, 3.0]).unwrap();
        assert_eq!(p, vec![0.25, 0.75]);
    }

    #[test]
    fn test_normalize_rejects_zero_sum() {
        assert!(matches!(
            normalize(&[0.0, 0.0]),
            Err(TaskError::InvalidBucketConfig(_))
        ));
        assert!(normalize(&[]).is_err());
        assert!(normalize(&[1.0, -1.0]).is_err());
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let bucketizer = HashBucketizer::new("home", arms(&[("a", 0.5), ("b", 0.5)]), true);
        for key in ["u1", "u2", "u3", ""] {
            let first = bucketizer.assign(key).unwrap().to_string();
            for _ in 0..5 {
                assert_eq!(bucketizer.assign(key).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_single_arm_takes_all_traffic() {
        let bucketizer = HashBucketizer::new("home", arms(&[("only", 0.3)]), true);
        for i in 0..100 {
            assert_eq!(bucketizer.assign(&format!("user{i}")).unwrap(), "only");
        }
    }

    #[test]
    fn test_zero_weight_arm_never_selected() {
        let bucketizer = HashBucketizer::new("home", arms(&[("off", 0.0), ("on", 1.0)]), true);
        for i in 0..200 {
            assert_eq!(bucketizer.assign(&format!("user{i}")).unwrap(), "on");
        }
    }

    #[test]
    fn test_split_roughly_follows_ratios() {
        let bucketizer = HashBucketizer::new("home", arms(&[("a", 1.0), ("b", 3.0)]), true);
        let total = 10_000;
        let a = (0..total)
            .filter(|i| bucketizer.assign(&format!("user{i}")).unwrap() == "a")
            .count();
        let share = a as f64 / total as f64;
        assert!((0.22..0.28).contains(&share), "share of a was {share}");
    }

    #[test]
    fn test_zero_sum_fails_at_assignment() {
        let bucketizer = HashBucketizer::new("home", arms(&[("a", 0.0)]), true);
        let err = bucketizer.assign("u1").unwrap_err();
        assert!(err.to_string().contains("home"));
    }

    #[test]
    fn test_bucket_key_fallbacks() {
        let mut params = Map::new();
        params.insert("bucketKey".to_string(), json!("device-7"));
        let ctx = RequestContext::new(params.clone());
        assert_eq!(bucket_key(&ctx), "device-7");

        let ctx = RequestContext::new(params).with_id("u1");
        assert_eq!(bucket_key(&ctx), "u1");

        let ctx = RequestContext::from_value(Value::Null);
        assert_eq!(bucket_key(&ctx), "");
    }
}
