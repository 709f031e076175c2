//! Typed graph options.
//!
//! Callers hand options over as string key/value pairs. They are parsed once,
//! at `add_graph` (graph options) or `load_graph` (load options), into typed
//! records; nothing past that boundary reads the string map.

use crate::error::{GeError, Result};
use crate::types::DeviceAddr;
use std::collections::HashMap;
use std::time::Duration;

/// Option keys understood by the manager.
pub mod keys {
    /// Build-step selector.
    pub const BUILD_STEP: &str = "ge.buildStep";
    /// Whether refreshable feature memory may be rebound more than once.
    pub const FEATURE_BASE_REFRESHABLE: &str = "ge.featureBaseRefreshable";
    /// Graph inputs whose memory the model may reuse.
    pub const INPUT_REUSE_MEM_INDEXES: &str = "ge.exec.inputReuseMemIndexes";
    /// Graph outputs whose memory the model may reuse.
    pub const OUTPUT_REUSE_MEM_INDEXES: &str = "ge.exec.outputReuseMemIndexes";
    /// Dynamic batch-size gears.
    pub const DYNAMIC_BATCH_SIZE: &str = "ge.dynamicBatchSize";
    /// Dynamic image-size gears.
    pub const DYNAMIC_IMAGE_SIZE: &str = "ge.dynamicImageSize";
    /// Dynamic dims gears.
    pub const DYNAMIC_DIMS: &str = "ge.dynamicDims";
    /// Lifetime of constant weights.
    pub const CONST_LIFECYCLE: &str = "ge.constLifecycle";
    /// Optimization level.
    pub const OPTIMIZATION_LEVEL: &str = "ge.optimizationLevel";
    /// Execution timeout in milliseconds, 0 for none.
    pub const EXEC_TIMEOUT: &str = "ge.exec.graphExecTimeout";
    /// Frozen inputs as `index,address,size` triplets separated by `;`.
    pub const FROZEN_INPUT_INDEXES: &str = "ge.exec.frozenInputIndexes";
}

/// How far the compile pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStep {
    /// Full build.
    #[default]
    All,
    /// Stop before UB fusion matching.
    BeforeUbMatch,
    /// Stop after UB fusion matching.
    AfterUbMatch,
    /// Stop after the model builder.
    AfterBuilder,
    /// Stop after building sub-models.
    AfterBuilderSub,
}

impl BuildStep {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "" | "all" => Self::All,
            "before_ub_match" => Self::BeforeUbMatch,
            "after_ub_match" => Self::AfterUbMatch,
            "after_builder" => Self::AfterBuilder,
            "after_builder_sub" => Self::AfterBuilderSub,
            _ => return None,
        })
    }
}

/// Lifetime of constant weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstLifecycle {
    /// Weights live as long as the graph.
    #[default]
    Graph,
    /// Weights are shared across the session.
    Session,
}

/// Dynamic-shape gear hints. At most one kind may be given.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DynamicShapeHint {
    /// Shapes are static.
    #[default]
    None,
    /// Batch-size gears.
    BatchSize(Vec<u64>),
    /// `(height, width)` gears.
    ImageSize(Vec<(u64, u64)>),
    /// Full dims gears.
    Dims(Vec<Vec<u64>>),
}

/// Graph-scoped options, parsed at add time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    /// Build-step selector.
    pub build_step: BuildStep,
    /// Whether refreshable feature memory may be rebound repeatedly.
    pub feature_base_refreshable: bool,
    /// Input indexes whose memory may be reused.
    pub input_reuse_indexes: Vec<usize>,
    /// Output indexes whose memory may be reused.
    pub output_reuse_indexes: Vec<usize>,
    /// Dynamic-shape hints.
    pub dynamic_shape: DynamicShapeHint,
    /// Constant-weight lifetime.
    pub const_lifecycle: ConstLifecycle,
    /// Optimization level, 0..=3.
    pub optimization_level: u8,
    /// Execution timeout; `None` when the caller did not supply one.
    pub exec_timeout: Option<Duration>,
    /// Keys the manager does not interpret, forwarded untouched.
    pub extra: HashMap<String, String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            build_step: BuildStep::All,
            feature_base_refreshable: true,
            input_reuse_indexes: Vec::new(),
            output_reuse_indexes: Vec::new(),
            dynamic_shape: DynamicShapeHint::None,
            const_lifecycle: ConstLifecycle::Graph,
            optimization_level: 2,
            exec_timeout: None,
            extra: HashMap::new(),
        }
    }
}

impl GraphOptions {
    /// Parse the caller's option map.
    pub fn parse(map: &HashMap<String, String>) -> Result<Self> {
        let mut options = Self::default();
        let mut dynamic_hints = 0;

        for (key, value) in map {
            let value = value.trim();
            match key.as_str() {
                keys::BUILD_STEP => {
                    options.build_step = BuildStep::parse(value)
                        .ok_or_else(|| invalid(key, value, "unknown build step"))?;
                }
                keys::FEATURE_BASE_REFRESHABLE => {
                    options.feature_base_refreshable = parse_flag(key, value)?;
                }
                keys::INPUT_REUSE_MEM_INDEXES => {
                    options.input_reuse_indexes = parse_index_list(key, value)?;
                }
                keys::OUTPUT_REUSE_MEM_INDEXES => {
                    options.output_reuse_indexes = parse_index_list(key, value)?;
                }
                keys::DYNAMIC_BATCH_SIZE => {
                    dynamic_hints += 1;
                    options.dynamic_shape = DynamicShapeHint::BatchSize(parse_u64_list(key, value)?);
                }
                keys::DYNAMIC_IMAGE_SIZE => {
                    dynamic_hints += 1;
                    let gears = parse_gears(key, value)?
                        .into_iter()
                        .map(|g| match g.as_slice() {
                            [h, w] => Ok((*h, *w)),
                            _ => Err(invalid(key, value, "image size gear needs height,width")),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    options.dynamic_shape = DynamicShapeHint::ImageSize(gears);
                }
                keys::DYNAMIC_DIMS => {
                    dynamic_hints += 1;
                    options.dynamic_shape = DynamicShapeHint::Dims(parse_gears(key, value)?);
                }
                keys::CONST_LIFECYCLE => {
                    options.const_lifecycle = match value {
                        "graph" => ConstLifecycle::Graph,
                        "session" => ConstLifecycle::Session,
                        _ => return Err(invalid(key, value, "expected 'graph' or 'session'")),
                    };
                }
                keys::OPTIMIZATION_LEVEL => {
                    let level: u8 = value
                        .parse()
                        .map_err(|_| invalid(key, value, "not an integer"))?;
                    if level > 3 {
                        return Err(invalid(key, value, "level must be within 0..=3"));
                    }
                    options.optimization_level = level;
                }
                keys::EXEC_TIMEOUT => {
                    let ms: u64 = value
                        .parse()
                        .map_err(|_| invalid(key, value, "not a millisecond count"))?;
                    options.exec_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                _ => {
                    tracing::debug!(key = %key, "Forwarding uninterpreted graph option");
                    options.extra.insert(key.clone(), value.to_string());
                }
            }
        }

        if dynamic_hints > 1 {
            return Err(GeError::OptionsInvalid {
                key: "ge.dynamic*".to_string(),
                value: String::new(),
                cause: "only one dynamic-shape hint may be given".to_string(),
            });
        }

        Ok(options)
    }

    /// Whether a dynamic-shape hint was given.
    #[must_use]
    pub fn has_dynamic_hint(&self) -> bool {
        self.dynamic_shape != DynamicShapeHint::None
    }
}

/// An input bound to a caller-owned device buffer for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenInput {
    /// Graph input index.
    pub index: usize,
    /// Device address of the buffer.
    pub addr: DeviceAddr,
    /// Buffer length in bytes.
    pub size: u64,
}

/// Options accepted by `load_graph`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Frozen inputs, in the order given.
    pub frozen_inputs: Vec<FrozenInput>,
}

impl LoadOptions {
    /// Parse the caller's load option map.
    pub fn parse(map: &HashMap<String, String>) -> Result<Self> {
        let frozen_inputs = match map.get(keys::FROZEN_INPUT_INDEXES) {
            Some(value) => parse_frozen_inputs(value)?,
            None => Vec::new(),
        };
        Ok(Self { frozen_inputs })
    }
}

/// Parse `index,address,size;index,address,size`.
///
/// Addresses may be decimal or `0x`-prefixed hexadecimal.
pub fn parse_frozen_inputs(value: &str) -> Result<Vec<FrozenInput>> {
    let key = keys::FROZEN_INPUT_INDEXES;
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|triplet| {
            let parts: Vec<&str> = triplet.split(',').map(str::trim).collect();
            let [index, addr, size] = parts.as_slice() else {
                return Err(invalid(key, triplet, "expected index,address,size"));
            };
            Ok(FrozenInput {
                index: index
                    .parse()
                    .map_err(|_| invalid(key, triplet, "bad input index"))?,
                addr: DeviceAddr::new(
                    parse_u64(addr).ok_or_else(|| invalid(key, triplet, "bad address"))?,
                ),
                size: parse_u64(size).ok_or_else(|| invalid(key, triplet, "bad size"))?,
            })
        })
        .collect()
}

fn parse_u64(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(key, value, "expected 0 or 1")),
    }
}

fn parse_index_list(key: &str, value: &str) -> Result<Vec<usize>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| invalid(key, value, "bad index")))
        .collect()
}

fn parse_u64_list(key: &str, value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| invalid(key, value, "bad gear value")))
        .collect()
}

fn parse_gears(key: &str, value: &str) -> Result<Vec<Vec<u64>>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|gear| parse_u64_list(key, gear))
        .collect()
}

fn invalid(key: &str, value: &str, cause: &str) -> GeError {
    GeError::OptionsInvalid {
        key: key.to_string(),
        value: value.to_string(),
        cause: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_empty() {
        let options = GraphOptions::parse(&HashMap::new()).unwrap();
        assert_eq!(options, GraphOptions::default());
        assert!(options.feature_base_refreshable);
        assert!(options.exec_timeout.is_none());
    }

    #[test]
    fn parses_known_keys() {
        let options = GraphOptions::parse(&map(&[
            (keys::FEATURE_BASE_REFRESHABLE, "0"),
            (keys::INPUT_REUSE_MEM_INDEXES, "0, 2"),
            (keys::DYNAMIC_IMAGE_SIZE, "224,224;448,448"),
            (keys::EXEC_TIMEOUT, "500"),
            (keys::BUILD_STEP, "after_builder"),
            ("ge.custom", "x"),
        ]))
        .unwrap();

        assert!(!options.feature_base_refreshable);
        assert_eq!(options.input_reuse_indexes, vec![0, 2]);
        assert_eq!(
            options.dynamic_shape,
            DynamicShapeHint::ImageSize(vec![(224, 224), (448, 448)])
        );
        assert_eq!(options.exec_timeout, Some(Duration::from_millis(500)));
        assert_eq!(options.build_step, BuildStep::AfterBuilder);
        assert_eq!(options.extra.get("ge.custom").map(String::as_str), Some("x"));
    }

    #[test]
    fn zero_timeout_means_none() {
        let options = GraphOptions::parse(&map(&[(keys::EXEC_TIMEOUT, "0")])).unwrap();
        assert!(options.exec_timeout.is_none());
    }

    #[test]
    fn rejects_conflicting_dynamic_hints() {
        let err = GraphOptions::parse(&map(&[
            (keys::DYNAMIC_BATCH_SIZE, "1,2,4"),
            (keys::DYNAMIC_DIMS, "1,2;3,4"),
        ]))
        .unwrap_err();
        assert_eq!(err.status(), Status::OptionsInvalid);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(GraphOptions::parse(&map(&[(keys::OPTIMIZATION_LEVEL, "9")])).is_err());
        assert!(GraphOptions::parse(&map(&[(keys::FEATURE_BASE_REFRESHABLE, "yes")])).is_err());
        assert!(GraphOptions::parse(&map(&[(keys::BUILD_STEP, "sideways")])).is_err());
    }

    #[test]
    fn parses_frozen_triplets() {
        let frozen = parse_frozen_inputs("0,0x1000,64; 2,8192,128").unwrap();
        assert_eq!(
            frozen,
            vec![
                FrozenInput {
                    index: 0,
                    addr: DeviceAddr::new(0x1000),
                    size: 64
                },
                FrozenInput {
                    index: 2,
                    addr: DeviceAddr::new(8192),
                    size: 128
                },
            ]
        );
    }

    #[test]
    fn malformed_frozen_triplet_is_rejected() {
        let err = parse_frozen_inputs("0,0x1000").unwrap_err();
        assert_eq!(err.status(), Status::OptionsInvalid);
    }

    #[test]
    fn load_options_without_frozen_key() {
        let options = LoadOptions::parse(&HashMap::new()).unwrap();
        assert!(options.frozen_inputs.is_empty());
    }
}
