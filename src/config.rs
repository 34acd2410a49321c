use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("option '{option}' must be {requirement}, got {value}")]
    OutOfRange {
        option: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

fn require_positive(option: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            option,
            requirement: "a positive number",
            value,
        })
    }
}

/// Options for the harmonization pipeline. Distances are in dataset coordinate
/// units, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizeOptions {
    /// Run junction matching, cutpoint generation and resegmentation.
    /// When off, only the enabled cleaning/presplitting steps run.
    pub harmonize: bool,
    pub clean_reference: bool,
    pub clean_reference_radius: f64,
    pub clean_candidate: bool,
    pub clean_candidate_radius: f64,
    pub presplit_reference: bool,
    pub presplit_candidate: bool,
    /// Radius for junction pairing, cutpoint projection and checkpoints.
    pub search_radius: f64,
    /// Azimuth tolerance for junction sub-points and cutpoint orientation.
    pub azimuth_tolerance: f64,
    pub checkpoint_angle_tolerance: f64,
    /// Incident-count difference that normalizes to 1.
    pub max_count_diff: f64,
    /// Mean azimuth difference that normalizes to 1.
    pub max_azimuth_diff: f64,
    /// Junction distance that normalizes to 1.
    pub max_distance_diff: f64,
}

impl Default for HarmonizeOptions {
    fn default() -> Self {
        Self {
            harmonize: true,
            clean_reference: false,
            clean_reference_radius: 1e-7,
            clean_candidate: false,
            clean_candidate_radius: 1e-7,
            presplit_reference: true,
            presplit_candidate: true,
            search_radius: 0.0005,
            azimuth_tolerance: 0.785398163,
            checkpoint_angle_tolerance: 0.5,
            max_count_diff: 3.0,
            max_azimuth_diff: 3.15,
            max_distance_diff: 0.0002,
        }
    }
}

impl HarmonizeOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clean_reference {
            require_positive("clean_reference_radius", self.clean_reference_radius)?;
        }
        if self.clean_candidate {
            require_positive("clean_candidate_radius", self.clean_candidate_radius)?;
        }
        require_positive("search_radius", self.search_radius)?;
        require_positive("azimuth_tolerance", self.azimuth_tolerance)?;
        require_positive("checkpoint_angle_tolerance", self.checkpoint_angle_tolerance)?;
        require_positive("max_count_diff", self.max_count_diff)?;
        require_positive("max_azimuth_diff", self.max_azimuth_diff)?;
        require_positive("max_distance_diff", self.max_distance_diff)
    }
}

/// Options for the line matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub search_radius: f64,
    /// Pairs whose longer/shorter length ratio reaches this are rejected.
    pub max_length_ratio: f64,
    /// Both features must be longer than this to be considered.
    pub min_feature_length: f64,
    /// Stage-1 orientation-free direction limit.
    pub max_angle_diff: f64,
    pub max_candidates: usize,
    pub posdev_sample_interval: f64,
    pub hausdorff_sample_interval: f64,
    /// Stage-2 direction limit, also the direction normalizer of the fit.
    pub max_azimuth_diff: f64,
    pub max_posdev_to_length: f64,
    pub min_posdev_to_length: f64,
    pub max_abs_posdev: f64,
    /// Attribute holding feature names in both datasets.
    pub name_attribute: String,
    pub compute_name_similarity: bool,
    /// Coordinates are lon/lat; reported length differences are in metres.
    pub geographic: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            search_radius: 0.0005,
            max_length_ratio: 2.0,
            min_feature_length: 0.0001,
            max_angle_diff: 0.32,
            max_candidates: 10,
            posdev_sample_interval: 0.001,
            hausdorff_sample_interval: 0.005,
            max_azimuth_diff: 1.0472,
            max_posdev_to_length: 0.6,
            min_posdev_to_length: 0.0001,
            max_abs_posdev: 0.0005,
            name_attribute: "name".to_string(),
            compute_name_similarity: true,
            geographic: true,
        }
    }
}

impl MatchOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("search_radius", self.search_radius)?;
        require_positive("max_length_ratio", self.max_length_ratio)?;
        require_positive("max_angle_diff", self.max_angle_diff)?;
        require_positive("posdev_sample_interval", self.posdev_sample_interval)?;
        require_positive("hausdorff_sample_interval", self.hausdorff_sample_interval)?;
        require_positive("max_azimuth_diff", self.max_azimuth_diff)?;
        require_positive("max_posdev_to_length", self.max_posdev_to_length)?;
        require_positive("max_abs_posdev", self.max_abs_posdev)?;
        if self.max_candidates == 0 {
            return Err(ConfigError::OutOfRange {
                option: "max_candidates",
                requirement: "at least 1",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Which downstream result layers to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultOptions {
    pub deviation_vectors: bool,
    pub deviation_vector_interval: f64,
    pub matched_reference: bool,
    pub matched_reference_min_length: f64,
    pub matched_candidate: bool,
    pub matched_candidate_min_length: f64,
    pub unmatched_reference: bool,
    pub unmatched_reference_min_length: f64,
    pub unmatched_candidate: bool,
    pub unmatched_candidate_min_length: f64,
    pub min_levenshtein: Option<usize>,
    pub max_levenshtein: Option<usize>,
    pub max_deviation_grid: bool,
    pub matching_rate_grid: bool,
    pub completeness_grid: bool,
    pub grid_cell_size: f64,
}

impl Default for ResultOptions {
    fn default() -> Self {
        Self {
            deviation_vectors: false,
            deviation_vector_interval: 0.0001,
            matched_reference: false,
            matched_reference_min_length: 0.00001,
            matched_candidate: false,
            matched_candidate_min_length: 0.00001,
            unmatched_reference: false,
            unmatched_reference_min_length: 0.00001,
            unmatched_candidate: false,
            unmatched_candidate_min_length: 0.00001,
            min_levenshtein: None,
            max_levenshtein: None,
            max_deviation_grid: false,
            matching_rate_grid: false,
            completeness_grid: false,
            grid_cell_size: 0.01,
        }
    }
}

impl ResultOptions {
    /// Every layer on, with the stock thresholds.
    pub fn all() -> Self {
        Self {
            deviation_vectors: true,
            matched_reference: true,
            matched_candidate: true,
            unmatched_reference: true,
            unmatched_candidate: true,
            min_levenshtein: Some(3),
            max_levenshtein: Some(3),
            max_deviation_grid: true,
            matching_rate_grid: true,
            completeness_grid: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deviation_vectors || self.max_deviation_grid {
            require_positive("deviation_vector_interval", self.deviation_vector_interval)?;
        }
        if self.max_deviation_grid || self.matching_rate_grid || self.completeness_grid {
            require_positive("grid_cell_size", self.grid_cell_size)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub harmonize: HarmonizeOptions,
    pub matching: MatchOptions,
    pub results: ResultOptions,
}

impl JobConfig {
    pub fn from_ron_str(path: &str, raw: &str) -> Result<Self, ConfigError> {
        ron::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_ron_str(&display, &raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.harmonize.validate()?;
        self.matching.validate()?;
        self.results.validate()
    }
}
