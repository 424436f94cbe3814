//! # Node Configuration
//!
//! Typed settings for the three protocol sections of the node's INI file:
//!
//! ```ini
//! [membership]
//! c = 8
//! sampling_interval = 2
//! view_selection = healer
//!
//! [vivaldi]
//! cc = 0.25
//! ce = 0.25
//! coordinate_dimensions = 2
//! coordinate_space = euclidean
//! windowSize = 10
//! tau = 2.5
//! epsilon_r = 0.35
//! sampling_interval = 2
//! filter_type = mp
//! h = 4
//! p = 25
//!
//! [vivaldi_gossip]
//! feedback_counter = 3
//! feedback_coords_num = 5
//! sampling_interval = 2
//! retention_seconds = 60
//! retention_interval = 10
//! ```
//!
//! Every key is required. A missing or invalid value is a configuration
//! error, which is fatal at startup: a node with a half-formed view policy
//! or a zero-dimensional coordinate space cannot do anything useful.

use serde::Deserialize;
use thiserror::Error;

use crate::coord::SpaceKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The INI file could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value parsed but is outside its valid range.
    #[error("invalid configuration: [{section}] {key}: {reason}")]
    Invalid {
        /// INI section the offending key lives in.
        section: &'static str,
        /// The offending key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

fn invalid(section: &'static str, key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        key,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Policy enums
// ---------------------------------------------------------------------------

/// Cyclon view-selection policy, fixing the healer/swapper split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSelection {
    /// H = S = 0: purely random eviction.
    Blind,
    /// H = c/2, S = 0: bias toward evicting the oldest entries.
    Healer,
    /// H = 0, S = c/2: bias toward preserving the freshest entries.
    Swapper,
}

impl ViewSelection {
    /// Number of healer slots for a view of capacity `c`.
    pub fn healers(&self, c: usize) -> usize {
        match self {
            Self::Healer => c / 2,
            _ => 0,
        }
    }

    /// Number of swapper slots for a view of capacity `c`.
    pub fn swappers(&self, c: usize) -> usize {
        match self {
            Self::Swapper => c / 2,
            _ => 0,
        }
    }
}

/// Which RTT filter the Vivaldi engine runs behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Identity filter.
    Raw,
    /// Global exponentially weighted moving average.
    Ewma,
    /// Per-peer moving percentile.
    Mp,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `[membership]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipSettings {
    /// Partial-view capacity.
    pub c: usize,
    /// Base shuffle cadence in seconds; each round actually waits a uniform
    /// draw from [0, 4 · sampling_interval).
    pub sampling_interval: u64,
    /// View-selection policy.
    pub view_selection: ViewSelection,
}

/// `[vivaldi]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct VivaldiSettings {
    /// Coordinate correction gain (typically ≈ 0.25).
    pub cc: f64,
    /// Error-confidence gain (typically ≈ 0.25).
    pub ce: f64,
    /// Dimension of the coordinate point.
    pub coordinate_dimensions: usize,
    /// Coordinate-space variant.
    pub coordinate_space: SpaceKind,
    /// Stabilizer window size W. The INI key is `windowSize`; the alias
    /// covers sources that normalize keys to lowercase.
    #[serde(rename = "windowSize", alias = "windowsize")]
    pub window_size: usize,
    /// Energy-heuristic threshold τ.
    pub tau: f64,
    /// Relative-heuristic threshold ε_r.
    pub epsilon_r: f64,
    /// Seconds between Vivaldi sampling rounds.
    pub sampling_interval: u64,
    /// RTT filter selection.
    pub filter_type: FilterKind,
    /// Moving-percentile window size (only read when `filter_type = mp`).
    pub h: usize,
    /// Moving-percentile percentile in [0, 100].
    pub p: f64,
}

/// `[vivaldi_gossip]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GossipSettings {
    /// Initial feedback counter F for freshly infected records.
    pub feedback_counter: u32,
    /// Maximum number of records selected per gossip round.
    pub feedback_coords_num: usize,
    /// Seconds between gossip rounds.
    pub sampling_interval: u64,
    /// Store retention horizon in seconds.
    pub retention_seconds: u64,
    /// Seconds between retention sweeps.
    pub retention_interval: u64,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// The full node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Peer-sampling configuration.
    pub membership: MembershipSettings,
    /// Coordinate-engine and stabilizer configuration.
    pub vivaldi: VivaldiSettings,
    /// Epidemic and store configuration.
    pub vivaldi_gossip: GossipSettings,
}

impl Settings {
    /// Loads and validates settings from an INI file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Ini))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Range-checks every value. Called by [`Settings::load`]; public so
    /// hand-built settings in tests go through the same gate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.membership;
        if m.c == 0 {
            return Err(invalid("membership", "c", "view capacity must be positive"));
        }
        let healers = m.view_selection.healers(m.c);
        let swappers = m.view_selection.swappers(m.c);
        if healers + swappers > m.c {
            return Err(invalid(
                "membership",
                "view_selection",
                format!("H + S = {} exceeds c = {}", healers + swappers, m.c),
            ));
        }
        if m.sampling_interval == 0 {
            return Err(invalid(
                "membership",
                "sampling_interval",
                "must be at least one second",
            ));
        }

        let v = &self.vivaldi;
        if !(v.cc > 0.0 && v.cc <= 1.0) {
            return Err(invalid("vivaldi", "cc", "must be in (0, 1]"));
        }
        if !(v.ce > 0.0 && v.ce <= 1.0) {
            return Err(invalid("vivaldi", "ce", "must be in (0, 1]"));
        }
        if v.coordinate_dimensions == 0 {
            return Err(invalid(
                "vivaldi",
                "coordinate_dimensions",
                "must be at least 1",
            ));
        }
        if v.window_size == 0 {
            return Err(invalid("vivaldi", "windowSize", "must be at least 1"));
        }
        if v.sampling_interval == 0 {
            return Err(invalid(
                "vivaldi",
                "sampling_interval",
                "must be at least one second",
            ));
        }
        if v.filter_type == FilterKind::Mp {
            if v.h == 0 {
                return Err(invalid("vivaldi", "h", "must be at least 1"));
            }
            if !(0.0..=100.0).contains(&v.p) {
                return Err(invalid("vivaldi", "p", "must be in [0, 100]"));
            }
        }

        let g = &self.vivaldi_gossip;
        if g.feedback_counter == 0 {
            return Err(invalid(
                "vivaldi_gossip",
                "feedback_counter",
                "must be at least 1",
            ));
        }
        if g.sampling_interval == 0 {
            return Err(invalid(
                "vivaldi_gossip",
                "sampling_interval",
                "must be at least one second",
            ));
        }
        if g.retention_seconds == 0 {
            return Err(invalid(
                "vivaldi_gossip",
                "retention_seconds",
                "must be at least one second",
            ));
        }
        if g.retention_interval == 0 {
            return Err(invalid(
                "vivaldi_gossip",
                "retention_interval",
                "must be at least one second",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[membership]
c = 4
sampling_interval = 2
view_selection = healer

[vivaldi]
cc = 0.25
ce = 0.25
coordinate_dimensions = 2
coordinate_space = euclidean
windowSize = 10
tau = 2.5
epsilon_r = 0.35
sampling_interval = 2
filter_type = mp
h = 4
p = 25

[vivaldi_gossip]
feedback_counter = 3
feedback_coords_num = 5
sampling_interval = 2
retention_seconds = 60
retention_interval = 10
"#;

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".ini")
            .tempfile()
            .expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write ini");
        file
    }

    #[test]
    fn sample_config_loads() {
        let file = write_ini(SAMPLE);
        let settings = Settings::load(file.path().to_str().unwrap()).expect("load");

        assert_eq!(settings.membership.c, 4);
        assert_eq!(settings.membership.view_selection, ViewSelection::Healer);
        assert_eq!(settings.vivaldi.coordinate_space, SpaceKind::Euclidean);
        assert_eq!(settings.vivaldi.window_size, 10);
        assert_eq!(settings.vivaldi.filter_type, FilterKind::Mp);
        assert_eq!(settings.vivaldi_gossip.feedback_counter, 3);
    }

    #[test]
    fn view_selection_fixes_healer_swapper_split() {
        assert_eq!(ViewSelection::Blind.healers(8), 0);
        assert_eq!(ViewSelection::Blind.swappers(8), 0);
        assert_eq!(ViewSelection::Healer.healers(8), 4);
        assert_eq!(ViewSelection::Healer.swappers(8), 0);
        assert_eq!(ViewSelection::Swapper.healers(8), 0);
        assert_eq!(ViewSelection::Swapper.swappers(8), 4);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let file = write_ini(&SAMPLE.replace("c = 4", "c = 0"));
        let err = Settings::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "c", .. }));
    }

    #[test]
    fn bad_percentile_is_rejected() {
        let file = write_ini(&SAMPLE.replace("p = 25", "p = 250"));
        let err = Settings::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "p", .. }));
    }

    #[test]
    fn missing_key_is_a_load_error() {
        let file = write_ini(&SAMPLE.replace("tau = 2.5", ""));
        let err = Settings::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn unknown_view_selection_is_a_load_error() {
        let file = write_ini(&SAMPLE.replace("view_selection = healer", "view_selection = eager"));
        assert!(Settings::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn height_space_parses() {
        let file = write_ini(&SAMPLE.replace(
            "coordinate_space = euclidean",
            "coordinate_space = height_euclidean",
        ));
        let settings = Settings::load(file.path().to_str().unwrap()).expect("load");
        assert_eq!(
            settings.vivaldi.coordinate_space,
            SpaceKind::HeightEuclidean
        );
    }
}
