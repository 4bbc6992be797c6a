//! Kinematic states and closed-form motion models.
//!
//! # Models
//! - **CTRV** (constant turn rate and velocity): x = [px, py, v, yaw, ω]
//! - **CTRA** (constant turn rate and acceleration): x = [px, py, v, yaw, ω, a]
//!
//! Both propagate analytically; no numerical integration is involved, so a
//! forward step of Δt followed by a step of −Δt returns the original state.
//!
//! ## CTRV, ω ≠ 0
//! px' = px + v/ω · (sin(yaw + ωΔt) − sin(yaw))
//! py' = py + v/ω · (cos(yaw) − cos(yaw + ωΔt))
//!
//! ## CTRA, ω ≠ 0  (θ' = yaw + ωΔt, v' = v + aΔt)
//! px' = px + (v'ω sin θ' + a cos θ' − vω sin yaw − a cos yaw) / ω²
//! py' = py + (−v'ω cos θ' + a sin θ' + vω cos yaw − a sin yaw) / ω²
//!
//! CTRV switches to the straight-line form explicitly when ω ≈ 0. CTRA
//! integrates a power series in ω·Δt when the turn over the step is small;
//! at ω = 0 the series reduces to the straight-line form exactly.

use crate::types::{DMat, DVec};
use crate::units::Angle;
use approx::{AbsDiffEq, RelativeEq};
use serde::{Deserialize, Serialize};

/// Below this |ω| (rad/s) CTRV uses the straight-line branch.
pub const CTRV_YAW_RATE_EPSILON: f64 = 1e-9;

/// Below this |ω·Δt| (rad) CTRA uses the series form. The closed form
/// divides by ω² and loses precision for small turns.
pub const CTRA_SERIES_TURN_LIMIT: f64 = 1e-2;

/// Series terms; the first omitted one is below 1e-18 of the displacement.
const CTRA_SERIES_TERMS: usize = 8;

// State vector layout shared by both models.
pub const IDX_X: usize = 0;
pub const IDX_Y: usize = 1;
pub const IDX_VELOCITY: usize = 2;
pub const IDX_YAW: usize = 3;
pub const IDX_YAW_RATE: usize = 4;
pub const IDX_ACCELERATION: usize = 5;

/// Closed set of motion models. Adding a variant forces every `match` on
/// [`KinematicState`] to be revisited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionModelKind {
    Ctrv,
    Ctra,
}

impl MotionModelKind {
    /// Dimension of the state vector.
    pub fn dim(self) -> usize {
        match self {
            MotionModelKind::Ctrv => 5,
            MotionModelKind::Ctra => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MotionModelKind::Ctrv => "CTRV",
            MotionModelKind::Ctra => "CTRA",
        }
    }
}

/// Common interface of the closed-form models.
pub trait MotionModel: Sized + Copy {
    const KIND: MotionModelKind;

    /// Deterministic propagation by `dt` seconds (may be negative).
    fn propagate(&self, dt: f64) -> Self;

    /// Propagation under sampled process noise: `linear_accel_noise` (m/s²)
    /// and `yaw_accel_noise` (rad/s²). Used for sigma-point expansion.
    fn propagate_with_noise(&self, dt: f64, linear_accel_noise: f64, yaw_accel_noise: f64) -> Self;

    fn to_vector(&self) -> DVec;

    /// Inverse of [`MotionModel::to_vector`]; yaw is re-wrapped.
    fn from_vector(v: &DVec) -> Self;
}

// ---------------------------------------------------------------------------
// CTRV
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CtrvState {
    /// m
    pub position_x: f64,
    /// m
    pub position_y: f64,
    /// m/s along the heading
    pub velocity: f64,
    pub yaw: Angle,
    /// rad/s
    pub yaw_rate: f64,
}

impl CtrvState {
    pub fn new(position_x: f64, position_y: f64, velocity: f64, yaw: f64, yaw_rate: f64) -> Self {
        Self {
            position_x,
            position_y,
            velocity,
            yaw: Angle::new(yaw),
            yaw_rate,
        }
    }
}

/// Additive process-noise terms shared by both models.
fn noise_terms(yaw: Angle, dt: f64, nu_a: f64, nu_w: f64) -> [f64; 5] {
    let half_dt2 = 0.5 * dt * dt;
    [
        half_dt2 * yaw.cos() * nu_a,
        half_dt2 * yaw.sin() * nu_a,
        dt * nu_a,
        half_dt2 * nu_w,
        dt * nu_w,
    ]
}

impl MotionModel for CtrvState {
    const KIND: MotionModelKind = MotionModelKind::Ctrv;

    fn propagate(&self, dt: f64) -> Self {
        let v = self.velocity;
        let w = self.yaw_rate;
        let yaw = self.yaw.radians();

        let (dx, dy) = if w.abs() < CTRV_YAW_RATE_EPSILON {
            (v * yaw.cos() * dt, v * yaw.sin() * dt)
        } else {
            let yaw_next = yaw + w * dt;
            (
                v / w * (yaw_next.sin() - yaw.sin()),
                v / w * (-yaw_next.cos() + yaw.cos()),
            )
        };

        Self {
            position_x: self.position_x + dx,
            position_y: self.position_y + dy,
            velocity: v,
            yaw: self.yaw + w * dt,
            yaw_rate: w,
        }
    }

    fn propagate_with_noise(&self, dt: f64, linear_accel_noise: f64, yaw_accel_noise: f64) -> Self {
        let next = self.propagate(dt);
        let n = noise_terms(self.yaw, dt, linear_accel_noise, yaw_accel_noise);
        Self {
            position_x: next.position_x + n[0],
            position_y: next.position_y + n[1],
            velocity: next.velocity + n[2],
            yaw: next.yaw + n[3],
            yaw_rate: next.yaw_rate + n[4],
        }
    }

    fn to_vector(&self) -> DVec {
        DVec::from_vec(vec![
            self.position_x,
            self.position_y,
            self.velocity,
            self.yaw.radians(),
            self.yaw_rate,
        ])
    }

    fn from_vector(v: &DVec) -> Self {
        Self::new(
            v[IDX_X],
            v[IDX_Y],
            v[IDX_VELOCITY],
            v[IDX_YAW],
            v[IDX_YAW_RATE],
        )
    }
}

// ---------------------------------------------------------------------------
// CTRA
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CtraState {
    /// m
    pub position_x: f64,
    /// m
    pub position_y: f64,
    /// m/s along the heading
    pub velocity: f64,
    pub yaw: Angle,
    /// rad/s
    pub yaw_rate: f64,
    /// m/s² along the heading
    pub acceleration: f64,
}

impl CtraState {
    pub fn new(
        position_x: f64,
        position_y: f64,
        velocity: f64,
        yaw: f64,
        yaw_rate: f64,
        acceleration: f64,
    ) -> Self {
        Self {
            position_x,
            position_y,
            velocity,
            yaw: Angle::new(yaw),
            yaw_rate,
            acceleration,
        }
    }

    /// Drop the acceleration component.
    pub fn to_ctrv(&self) -> CtrvState {
        CtrvState {
            position_x: self.position_x,
            position_y: self.position_y,
            velocity: self.velocity,
            yaw: self.yaw,
            yaw_rate: self.yaw_rate,
        }
    }
}

impl From<CtrvState> for CtraState {
    /// Embed a CTRV state with zero acceleration.
    fn from(s: CtrvState) -> Self {
        Self {
            position_x: s.position_x,
            position_y: s.position_y,
            velocity: s.velocity,
            yaw: s.yaw,
            yaw_rate: s.yaw_rate,
            acceleration: 0.0,
        }
    }
}

impl MotionModel for CtraState {
    const KIND: MotionModelKind = MotionModelKind::Ctra;

    fn propagate(&self, dt: f64) -> Self {
        let v = self.velocity;
        let a = self.acceleration;
        let w = self.yaw_rate;
        let yaw = self.yaw.radians();
        let v_next = v + a * dt;

        let (dx, dy) = if (w * dt).abs() < CTRA_SERIES_TURN_LIMIT {
            ctra_series_displacement(v, a, w, yaw, dt)
        } else {
            let yaw_next = yaw + w * dt;
            let w2 = w * w;
            (
                (v_next * w * yaw_next.sin() + a * yaw_next.cos() - v * w * yaw.sin() - a * yaw.cos())
                    / w2,
                (-v_next * w * yaw_next.cos() + a * yaw_next.sin() + v * w * yaw.cos() - a * yaw.sin())
                    / w2,
            )
        };

        Self {
            position_x: self.position_x + dx,
            position_y: self.position_y + dy,
            velocity: v_next,
            yaw: self.yaw + w * dt,
            yaw_rate: w,
            acceleration: a,
        }
    }

    fn propagate_with_noise(&self, dt: f64, linear_accel_noise: f64, yaw_accel_noise: f64) -> Self {
        let next = self.propagate(dt);
        let n = noise_terms(self.yaw, dt, linear_accel_noise, yaw_accel_noise);
        Self {
            position_x: next.position_x + n[0],
            position_y: next.position_y + n[1],
            velocity: next.velocity + n[2],
            yaw: next.yaw + n[3],
            yaw_rate: next.yaw_rate + n[4],
            acceleration: next.acceleration,
        }
    }

    fn to_vector(&self) -> DVec {
        DVec::from_vec(vec![
            self.position_x,
            self.position_y,
            self.velocity,
            self.yaw.radians(),
            self.yaw_rate,
            self.acceleration,
        ])
    }

    fn from_vector(v: &DVec) -> Self {
        Self::new(
            v[IDX_X],
            v[IDX_Y],
            v[IDX_VELOCITY],
            v[IDX_YAW],
            v[IDX_YAW_RATE],
            v[IDX_ACCELERATION],
        )
    }
}

/// Displacement ∫₀^Δt (v + aτ)·e^{i(yaw + ωτ)} dτ expanded in powers of ω:
/// Σₖ (iω)ᵏ/k! · (v·Δtᵏ⁺¹/(k+1) + a·Δtᵏ⁺²/(k+2)), rotated by yaw.
fn ctra_series_displacement(v: f64, a: f64, w: f64, yaw: f64, dt: f64) -> (f64, f64) {
    let (mut re, mut im) = (0.0, 0.0);
    let mut w_pow = 1.0; // ωᵏ / k!
    let mut t_pow = dt; // Δtᵏ⁺¹
    for k in 0..CTRA_SERIES_TERMS {
        let term = w_pow * (v * t_pow / (k + 1) as f64 + a * t_pow * dt / (k + 2) as f64);
        match k % 4 {
            0 => re += term,
            1 => im += term,
            2 => re -= term,
            _ => im -= term,
        }
        w_pow *= w / (k + 1) as f64;
        t_pow *= dt;
    }
    let (sin, cos) = yaw.sin_cos();
    (re * cos - im * sin, re * sin + im * cos)
}

// ---------------------------------------------------------------------------
// KinematicState: tagged union over the model set
// ---------------------------------------------------------------------------

/// State of a track or object under its own motion model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum KinematicState {
    Ctrv(CtrvState),
    Ctra(CtraState),
}

impl KinematicState {
    pub fn kind(&self) -> MotionModelKind {
        match self {
            KinematicState::Ctrv(_) => MotionModelKind::Ctrv,
            KinematicState::Ctra(_) => MotionModelKind::Ctra,
        }
    }

    pub fn dim(&self) -> usize {
        self.kind().dim()
    }

    pub fn propagate(&self, dt: f64) -> Self {
        match self {
            KinematicState::Ctrv(s) => KinematicState::Ctrv(s.propagate(dt)),
            KinematicState::Ctra(s) => KinematicState::Ctra(s.propagate(dt)),
        }
    }

    pub fn propagate_with_noise(&self, dt: f64, linear_accel_noise: f64, yaw_accel_noise: f64) -> Self {
        match self {
            KinematicState::Ctrv(s) => {
                KinematicState::Ctrv(s.propagate_with_noise(dt, linear_accel_noise, yaw_accel_noise))
            }
            KinematicState::Ctra(s) => {
                KinematicState::Ctra(s.propagate_with_noise(dt, linear_accel_noise, yaw_accel_noise))
            }
        }
    }

    /// Covariance of the additive noise terms over `dt` for independent
    /// ν_a and ν_ω with the given standard deviations: G·diag(σ_a², σ_ω̇²)·Gᵀ.
    /// The acceleration row of a CTRA state stays zero.
    pub fn process_noise(&self, dt: f64, linear_accel_std: f64, yaw_accel_std: f64) -> DMat {
        let n = self.dim();
        let g_a = noise_terms(self.yaw(), dt, 1.0, 0.0);
        let g_w = noise_terms(self.yaw(), dt, 0.0, 1.0);
        let (var_a, var_w) = (linear_accel_std * linear_accel_std, yaw_accel_std * yaw_accel_std);
        DMat::from_fn(n, n, |r, c| {
            if r >= g_a.len() || c >= g_a.len() {
                0.0
            } else {
                var_a * g_a[r] * g_a[c] + var_w * g_w[r] * g_w[c]
            }
        })
    }

    /// Planar position (m).
    pub fn position(&self) -> (f64, f64) {
        match self {
            KinematicState::Ctrv(s) => (s.position_x, s.position_y),
            KinematicState::Ctra(s) => (s.position_x, s.position_y),
        }
    }

    pub fn velocity(&self) -> f64 {
        match self {
            KinematicState::Ctrv(s) => s.velocity,
            KinematicState::Ctra(s) => s.velocity,
        }
    }

    pub fn yaw(&self) -> Angle {
        match self {
            KinematicState::Ctrv(s) => s.yaw,
            KinematicState::Ctra(s) => s.yaw,
        }
    }

    /// Projection onto the CTRV subspace shared by every model.
    pub fn common(&self) -> CtrvState {
        match self {
            KinematicState::Ctrv(s) => *s,
            KinematicState::Ctra(s) => s.to_ctrv(),
        }
    }

    pub fn to_vector(&self) -> DVec {
        match self {
            KinematicState::Ctrv(s) => s.to_vector(),
            KinematicState::Ctra(s) => s.to_vector(),
        }
    }

    pub fn from_vector(kind: MotionModelKind, v: &DVec) -> Self {
        match kind {
            MotionModelKind::Ctrv => KinematicState::Ctrv(CtrvState::from_vector(v)),
            MotionModelKind::Ctra => KinematicState::Ctra(CtraState::from_vector(v)),
        }
    }

    /// Re-express the state under `kind`: CTRV → CTRA adds zero
    /// acceleration, CTRA → CTRV drops it.
    pub fn convert(&self, kind: MotionModelKind) -> Self {
        match (self, kind) {
            (KinematicState::Ctrv(s), MotionModelKind::Ctra) => KinematicState::Ctra((*s).into()),
            (KinematicState::Ctra(s), MotionModelKind::Ctrv) => KinematicState::Ctrv(s.to_ctrv()),
            _ => *self,
        }
    }
}

impl From<CtrvState> for KinematicState {
    fn from(s: CtrvState) -> Self {
        KinematicState::Ctrv(s)
    }
}

impl From<CtraState> for KinematicState {
    fn from(s: CtraState) -> Self {
        KinematicState::Ctra(s)
    }
}

// ---------------------------------------------------------------------------
// Tolerance-based equality
// ---------------------------------------------------------------------------

impl AbsDiffEq for CtrvState {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.position_x.abs_diff_eq(&other.position_x, epsilon)
            && self.position_y.abs_diff_eq(&other.position_y, epsilon)
            && self.velocity.abs_diff_eq(&other.velocity, epsilon)
            && self.yaw.abs_diff_eq(&other.yaw, epsilon)
            && self.yaw_rate.abs_diff_eq(&other.yaw_rate, epsilon)
    }
}

impl RelativeEq for CtrvState {
    fn default_max_relative() -> f64 {
        f64::EPSILON
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.position_x.relative_eq(&other.position_x, epsilon, max_relative)
            && self.position_y.relative_eq(&other.position_y, epsilon, max_relative)
            && self.velocity.relative_eq(&other.velocity, epsilon, max_relative)
            && self.yaw.relative_eq(&other.yaw, epsilon, max_relative)
            && self.yaw_rate.relative_eq(&other.yaw_rate, epsilon, max_relative)
    }
}

impl AbsDiffEq for CtraState {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.to_ctrv().abs_diff_eq(&other.to_ctrv(), epsilon)
            && self.acceleration.abs_diff_eq(&other.acceleration, epsilon)
    }
}

impl RelativeEq for CtraState {
    fn default_max_relative() -> f64 {
        f64::EPSILON
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.to_ctrv().relative_eq(&other.to_ctrv(), epsilon, max_relative)
            && self.acceleration.relative_eq(&other.acceleration, epsilon, max_relative)
    }
}

impl AbsDiffEq for KinematicState {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        match (self, other) {
            (KinematicState::Ctrv(a), KinematicState::Ctrv(b)) => a.abs_diff_eq(b, epsilon),
            (KinematicState::Ctra(a), KinematicState::Ctra(b)) => a.abs_diff_eq(b, epsilon),
            _ => false,
        }
    }
}

impl RelativeEq for KinematicState {
    fn default_max_relative() -> f64 {
        f64::EPSILON
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        match (self, other) {
            (KinematicState::Ctrv(a), KinematicState::Ctrv(b)) => {
                a.relative_eq(b, epsilon, max_relative)
            }
            (KinematicState::Ctra(a), KinematicState::Ctra(b)) => {
                a.relative_eq(b, epsilon, max_relative)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
