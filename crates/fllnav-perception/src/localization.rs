//! Monte Carlo localization over a known landmark map.
//!
//! A fixed population of weighted pose hypotheses is moved by odometry
//! increments with Gaussian noise, re-weighted by discrete landmark
//! readings and forward wall-distance readings, and resampled
//! systematically when the estimate spreads out.
//!
//! # Example
//!
//! ```rust
//! use fllnav_perception::localization::{Localizer, LocalizerConfig};
//! use fllnav_types::{FieldBounds, LandmarkMap};
//!
//! let config = LocalizerConfig { seed: Some(7), ..LocalizerConfig::default() };
//! let mut mcl = Localizer::new(config, FieldBounds::default(), LandmarkMap::standard(1200.0, 1200.0)).unwrap();
//! mcl.initialize(Some(600.0), Some(600.0), Some(0.0), 20.0);
//! mcl.predict(100.0, 0.0);
//!
//! let pose = mcl.get_localized_pose();
//! assert!((pose.x - 700.0).abs() < 30.0);
//! assert!(mcl.get_confidence() > 0.5);
//! ```

use fllnav_types::{FieldBounds, LandmarkMap, LandmarkReading, NavError, Pose, SensorOffset, normalize_heading};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{StandardNormal, Uniform};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Smallest and largest supported particle population.
pub const MIN_PARTICLES: usize = 30;
pub const MAX_PARTICLES: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Particle filter parameters.  The landmark weight factors are tunable
/// heuristics rather than a calibrated sensor likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LocalizerConfig {
    pub particle_count: usize,
    /// Heading standard deviation (degrees) when initializing around a prior.
    pub init_heading_noise: f64,
    /// Per-prediction distance noise (mm).
    pub distance_noise: f64,
    /// Per-prediction turn noise (degrees).
    pub angle_noise: f64,
    /// A landmark closer than this (mm) to a particle's sensor point explains
    /// the reading.
    pub match_radius: f64,
    pub match_weight: f64,
    pub mismatch_weight: f64,
    /// Factor for a `white` reading away from every landmark.
    pub background_weight: f64,
    /// Factor for a landmark reading away from every candidate landmark.
    pub off_landmark_weight: f64,
    /// Standard deviation (mm) of the forward distance sensor.
    pub distance_noise_std: f64,
    /// Distance readings at or beyond this (mm) carry no wall echo.
    pub max_distance_reading: f64,
    pub resample_position_noise: f64,
    pub resample_heading_noise: f64,
    /// Resample when confidence falls below this.
    pub resample_threshold: f64,
    /// Spread (mm) at which confidence is 0.5.
    pub confidence_scale: f64,
    pub sensor_offset: SensorOffset,
    /// Fixed RNG seed; entropy when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            particle_count: 75,
            init_heading_noise: 10.0,
            distance_noise: 3.0,
            angle_noise: 2.0,
            match_radius: 50.0,
            match_weight: 10.0,
            mismatch_weight: 0.1,
            background_weight: 1.0,
            off_landmark_weight: 0.5,
            distance_noise_std: 20.0,
            max_distance_reading: 2000.0,
            resample_position_noise: 5.0,
            resample_heading_noise: 2.0,
            resample_threshold: 0.5,
            confidence_scale: 100.0,
            sensor_offset: SensorOffset::default(),
            seed: None,
        }
    }
}

impl LocalizerConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        if !(MIN_PARTICLES..=MAX_PARTICLES).contains(&self.particle_count) {
            return Err(NavError::Configuration(format!(
                "particle_count must be in {MIN_PARTICLES}..={MAX_PARTICLES} (got {})",
                self.particle_count
            )));
        }
        let non_negative = [
            ("init_heading_noise", self.init_heading_noise),
            ("distance_noise", self.distance_noise),
            ("angle_noise", self.angle_noise),
            ("resample_position_noise", self.resample_position_noise),
            ("resample_heading_noise", self.resample_heading_noise),
            ("match_weight", self.match_weight),
            ("mismatch_weight", self.mismatch_weight),
            ("background_weight", self.background_weight),
            ("off_landmark_weight", self.off_landmark_weight),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(NavError::Configuration(format!("{name} must be finite and >= 0 (got {value})")));
            }
        }
        if !(self.match_radius > 0.0 && self.match_radius.is_finite()) {
            return Err(NavError::Configuration("match_radius must be positive".into()));
        }
        if !(self.distance_noise_std > 0.0 && self.distance_noise_std.is_finite()) {
            return Err(NavError::Configuration("distance_noise_std must be positive".into()));
        }
        if !(self.max_distance_reading > 0.0 && self.max_distance_reading.is_finite()) {
            return Err(NavError::Configuration("max_distance_reading must be positive".into()));
        }
        if !(self.confidence_scale > 0.0 && self.confidence_scale.is_finite()) {
            return Err(NavError::Configuration("confidence_scale must be positive".into()));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Localizer
// ────────────────────────────────────────────────────────────────────────────

/// One pose hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    pub weight: f64,
}

/// Particle-filter pose estimator.
pub struct Localizer {
    config: LocalizerConfig,
    field: FieldBounds,
    map: LandmarkMap,
    particles: Vec<Particle>,
    rng: SmallRng,
}

impl Localizer {
    /// Build a localizer; particles start uniformly over the field.
    pub fn new(config: LocalizerConfig, field: FieldBounds, map: LandmarkMap) -> Result<Self, NavError> {
        config.validate()?;
        field.validate()?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let mut localizer = Self {
            config,
            field,
            map,
            particles: Vec::new(),
            rng,
        };
        localizer.initialize(None, None, None, 0.0);
        Ok(localizer)
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    fn clamped(&self, mut pose: Pose) -> Pose {
        (pose.x, pose.y) = self.field.clamp(pose.x, pose.y);
        pose
    }

    /// Scatter the particles.
    ///
    /// With `x` and `y` given, positions are Gaussian around them with
    /// standard deviation `spread`; otherwise uniform over the field.
    /// With `heading` given, headings are Gaussian around it
    /// (`init_heading_noise`); otherwise uniform.
    pub fn initialize(&mut self, x: Option<f64>, y: Option<f64>, heading: Option<f64>, spread: f64) {
        let n = self.config.particle_count;
        let weight = 1.0 / n as f64;
        let across = Uniform::new_inclusive(0.0, self.field.width);
        let along = Uniform::new_inclusive(0.0, self.field.height);
        let compass = Uniform::new(0.0, 360.0);
        let heading_noise = self.config.init_heading_noise;

        self.particles.clear();
        for _ in 0..n {
            let (px, py) = match (x, y) {
                (Some(x), Some(y)) => (x + self.gaussian(spread), y + self.gaussian(spread)),
                _ => (across.sample(&mut self.rng), along.sample(&mut self.rng)),
            };
            let ph = match heading {
                Some(h) => h + self.gaussian(heading_noise),
                None => compass.sample(&mut self.rng),
            };
            let pose = self.clamped(Pose::new(px, py, ph));
            self.particles.push(Particle { pose, weight });
        }
        debug!(particles = n, ?x, ?y, ?heading, spread, "particles initialized");
    }

    /// Move every particle by one odometry increment plus independent noise.
    pub fn predict(&mut self, distance: f64, angle: f64) {
        let (sd, sa) = (self.config.distance_noise, self.config.angle_noise);
        for i in 0..self.particles.len() {
            let d = distance + self.gaussian(sd);
            let a = angle + self.gaussian(sa);
            let moved = self.particles[i].pose.advanced(d, a);
            self.particles[i].pose = self.clamped(moved);
        }
        trace!(distance, angle, "particles predicted");
    }

    /// Landmark likelihood factor for a particle at `pose`.
    fn reading_factor(&self, pose: &Pose, observation: LandmarkReading) -> f64 {
        let (sx, sy) = self.config.sensor_offset.sensor_point(pose);
        match self.map.nearest_candidate(sx, sy, observation) {
            Some((landmark, d)) if d <= self.config.match_radius => {
                if landmark.reading == observation {
                    self.config.match_weight
                } else {
                    self.config.mismatch_weight
                }
            }
            _ if observation == LandmarkReading::White => self.config.background_weight,
            _ => self.config.off_landmark_weight,
        }
    }

    /// Re-weight the particles by one landmark reading.  `none` readings are
    /// ignored; returns whether the weights were updated.
    pub fn correct(&mut self, observation: LandmarkReading) -> bool {
        if observation == LandmarkReading::None {
            return false;
        }
        for i in 0..self.particles.len() {
            let factor = self.reading_factor(&self.particles[i].pose, observation);
            self.particles[i].weight *= factor;
        }
        self.normalize();
        debug!(%observation, confidence = self.get_confidence(), "landmark correction");
        true
    }

    /// Re-weight the particles by a forward wall-distance reading (mm) from
    /// a sensor at the robot centre.  Each particle's expected reading is the
    /// distance along its heading to the field edge; the factor is Gaussian
    /// in the difference.  Non-finite, negative and out-of-range readings are
    /// ignored; returns whether the weights were updated.
    pub fn correct_distance(&mut self, measured: f64) -> bool {
        if !(measured.is_finite() && measured >= 0.0 && measured < self.config.max_distance_reading) {
            trace!(measured, "distance reading out of range");
            return false;
        }
        let std = self.config.distance_noise_std;
        for i in 0..self.particles.len() {
            let pose = self.particles[i].pose;
            let factor = match self.field.wall_distance(pose.x, pose.y, pose.heading) {
                Some(expected) => (-0.5 * ((measured - expected) / std).powi(2)).exp(),
                None => 1.0,
            };
            self.particles[i].weight *= factor;
        }
        self.normalize();
        debug!(measured, confidence = self.get_confidence(), "distance correction");
        true
    }

    /// Scale weights to sum to 1; degenerate totals reset them to uniform.
    fn normalize(&mut self) {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        let n = self.particles.len() as f64;
        if total > 0.0 && total.is_finite() {
            for p in &mut self.particles {
                p.weight /= total;
            }
        } else {
            debug!(total, "degenerate particle weights, resetting to uniform");
            for p in &mut self.particles {
                p.weight = 1.0 / n;
            }
        }
    }

    /// Systematic resampling: one random offset in `[0, 1/N)` and a fixed
    /// stride through the cumulative weights.  Copies are jittered and the
    /// weights reset to `1/N`.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        if n == 0 {
            return;
        }
        self.normalize();
        let step = 1.0 / n as f64;
        let start = Uniform::new(0.0, step).sample(&mut self.rng);

        let mut chosen = Vec::with_capacity(n);
        let mut cumulative = self.particles[0].weight;
        let mut i = 0;
        for m in 0..n {
            let u = start + m as f64 * step;
            while u > cumulative && i < n - 1 {
                i += 1;
                cumulative += self.particles[i].weight;
            }
            chosen.push(self.particles[i].pose);
        }

        let (sp, sh) = (self.config.resample_position_noise, self.config.resample_heading_noise);
        let jittered: Vec<Particle> = chosen
            .into_iter()
            .map(|pose| {
                let x = pose.x + self.gaussian(sp);
                let y = pose.y + self.gaussian(sp);
                let h = pose.heading + self.gaussian(sh);
                Particle {
                    pose: self.clamped(Pose::new(x, y, h)),
                    weight: step,
                }
            })
            .collect();
        self.particles = jittered;
        debug!(particles = n, "particles resampled");
    }

    /// Whether the estimate has spread enough to warrant resampling.
    pub fn needs_resample(&self) -> bool {
        self.get_confidence() < self.config.resample_threshold
    }

    fn weights_or_uniform(&self) -> (Vec<f64>, f64) {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if total > 0.0 && total.is_finite() {
            (self.particles.iter().map(|p| p.weight).collect(), total)
        } else {
            (vec![1.0; self.particles.len()], self.particles.len() as f64)
        }
    }

    /// Weighted mean position and circular-mean heading.  Falls back to the
    /// unweighted mean when the total weight is zero.
    pub fn get_localized_pose(&self) -> Pose {
        if self.particles.is_empty() {
            return Pose::default();
        }
        let (weights, total) = self.weights_or_uniform();
        let (mut x, mut y, mut sin, mut cos) = (0.0, 0.0, 0.0, 0.0);
        for (p, w) in self.particles.iter().zip(&weights) {
            x += w * p.pose.x;
            y += w * p.pose.y;
            let (s, c) = p.pose.heading.to_radians().sin_cos();
            sin += w * s;
            cos += w * c;
        }
        Pose::new(x / total, y / total, normalize_heading(sin.atan2(cos).to_degrees()))
    }

    /// Root of the summed weighted positional variances (mm).
    pub fn spread(&self) -> f64 {
        if self.particles.is_empty() {
            return f64::INFINITY;
        }
        let mean = self.get_localized_pose();
        let (weights, total) = self.weights_or_uniform();
        let (mut var_x, mut var_y) = (0.0, 0.0);
        for (p, w) in self.particles.iter().zip(&weights) {
            var_x += w * (p.pose.x - mean.x).powi(2);
            var_y += w * (p.pose.y - mean.y).powi(2);
        }
        ((var_x + var_y) / total).sqrt()
    }

    /// `1 / (1 + spread / confidence_scale)`, in `(0, 1]`.
    pub fn get_confidence(&self) -> f64 {
        1.0 / (1.0 + self.spread() / self.config.confidence_scale)
    }
}
