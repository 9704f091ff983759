//! Motion integration for gyroscope and accelerometer sources
//!
//! [`MotionInput`] turns a stream of raw IMU samples into accumulated
//! rotation and an orientation estimate. Orientation is tracked as a unit
//! quaternion corrected toward the measured gravity vector with a PID
//! feedback term (a Mahony-style complementary filter). Gyro drift is
//! estimated continuously while the sensor is at rest.

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Default proportional gain of the gravity correction
pub const DEFAULT_KP: f32 = 0.3;
/// Default integral gain of the gravity correction
pub const DEFAULT_KI: f32 = 0.005;
/// Default derivative gain of the gravity correction
pub const DEFAULT_KD: f32 = 0.0;

/// Squared gyro magnitude below which angular velocity is treated as noise
const GYRO_THRESHOLD: f32 = 0.007;

/// Samples spaced further apart than this (seconds) are ignored
const MAX_SAMPLE_PERIOD: f32 = 0.1;

/// Simple three component vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalized(&self) -> Vec3 {
        let length = self.length();
        if length == 0.0 {
            return Vec3::ZERO;
        }
        *self * (1.0 / length)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Quaternion {
    w: f32,
    x: f32,
    y: f32,
    z: f32,
}

impl Quaternion {
    const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    fn normalized(&self) -> Quaternion {
        let length = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if length == 0.0 {
            return Quaternion::IDENTITY;
        }
        Quaternion {
            w: self.w / length,
            x: self.x / length,
            y: self.y / length,
            z: self.z / length,
        }
    }

    /// Row-major 3x3 rotation matrix
    fn to_matrix(self) -> [[f32; 3]; 3] {
        let (x2, y2, z2) = (self.x * self.x, self.y * self.y, self.z * self.z);
        let (xy, xz, yz) = (self.x * self.y, self.x * self.z, self.y * self.z);
        let (wx, wy, wz) = (self.w * self.x, self.w * self.y, self.w * self.z);
        [
            [1.0 - 2.0 * (y2 + z2), 2.0 * (xy + wz), 2.0 * (xz - wy)],
            [2.0 * (xy - wz), 1.0 - 2.0 * (x2 + z2), 2.0 * (yz + wx)],
            [2.0 * (xz + wy), 2.0 * (yz - wx), 1.0 - 2.0 * (x2 + y2)],
        ]
    }
}

/// Stateful motion integrator owned by one motion input
#[derive(Debug, Clone)]
pub struct MotionInput {
    kp: f32,
    ki: f32,
    kd: f32,

    accel: Vec3,
    gyro: Vec3,
    gyro_drift: Vec3,
    rotations: Vec3,
    quat: Quaternion,

    real_error: Vec3,
    integral_error: Vec3,
    derivative_error: Vec3,

    /// No gyro sample above the noise floor has been seen yet
    only_accelerometer: bool,
}

impl Default for MotionInput {
    fn default() -> Self {
        Self::new(DEFAULT_KP, DEFAULT_KI, DEFAULT_KD)
    }
}

impl MotionInput {
    /// Create an integrator with the given PID gains
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            accel: Vec3::ZERO,
            gyro: Vec3::ZERO,
            gyro_drift: Vec3::ZERO,
            rotations: Vec3::ZERO,
            quat: Quaternion::IDENTITY,
            real_error: Vec3::ZERO,
            integral_error: Vec3::ZERO,
            derivative_error: Vec3::ZERO,
            only_accelerometer: true,
        }
    }

    pub fn set_acceleration(&mut self, acceleration: Vec3) {
        self.accel = acceleration;
    }

    /// Feed an angular velocity sample (revolutions per second)
    ///
    /// Drift is re-estimated while the sensor is still, and readings under
    /// the noise floor are zeroed.
    pub fn set_gyroscope(&mut self, gyroscope: Vec3) {
        self.gyro = gyroscope - self.gyro_drift;

        if !self.is_moving(0.1) {
            self.gyro_drift = self.gyro_drift * 0.9999 + gyroscope * 0.0001;
        }

        if self.gyro.length_squared() < GYRO_THRESHOLD {
            self.gyro = Vec3::ZERO;
        } else {
            self.only_accelerometer = false;
        }
    }

    /// Accumulate rotation over `elapsed_us` microseconds
    pub fn update_rotation(&mut self, elapsed_us: u64) {
        let sample_period = elapsed_us as f32 / 1_000_000.0;
        if sample_period > MAX_SAMPLE_PERIOD {
            return;
        }
        self.rotations += self.gyro * sample_period;
    }

    /// Advance the orientation estimate by `elapsed_us` microseconds
    pub fn update_orientation(&mut self, elapsed_us: u64) {
        let sample_period = elapsed_us as f32 / 1_000_000.0;
        if sample_period > MAX_SAMPLE_PERIOD {
            return;
        }

        let Quaternion {
            w: mut q1,
            x: mut q2,
            y: mut q3,
            z: mut q4,
        } = self.quat;

        let normal_accel = self.accel.normalized();
        let mut rad_gyro = self.gyro * (std::f32::consts::PI * 2.0);
        // Sensor frame to filter frame
        rad_gyro = Vec3::new(rad_gyro.y, -rad_gyro.x, -rad_gyro.z);

        if self.only_accelerometer {
            rad_gyro = Vec3::ZERO;
        }

        // Gravity is only a usable reference while the sensor is not accelerating
        let accel_length = self.accel.length();
        if (0.75..=1.25).contains(&accel_length) {
            let ax = -normal_accel.x;
            let ay = normal_accel.y;
            let az = -normal_accel.z;

            // Estimated direction of gravity
            let vx = 2.0 * (q2 * q4 - q1 * q3);
            let vy = 2.0 * (q1 * q2 + q3 * q4);
            let vz = q1 * q1 - q2 * q2 - q3 * q3 + q4 * q4;

            // Error is the cross product of estimated and measured gravity
            let new_real_error = Vec3::new(az * vx - ax * vz, ay * vz - az * vy, ax * vy - ay * vx);

            self.derivative_error = new_real_error - self.real_error;
            self.real_error = new_real_error;

            // Integral windup guard
            if self.ki != 0.0 && !self.is_calibrated(0.05) {
                self.integral_error += self.real_error;
            } else {
                self.integral_error = Vec3::ZERO;
            }

            if !self.only_accelerometer {
                rad_gyro += self.real_error * self.kp;
                rad_gyro += self.integral_error * self.ki;
                rad_gyro += self.derivative_error * self.kd;
            } else {
                // Lean harder on the accelerometer when there is no gyro
                rad_gyro += self.real_error * (35.0 * self.kp);
                rad_gyro += self.integral_error * (10.0 * self.ki);
                rad_gyro += self.derivative_error * (10.0 * self.kd);

                // Synthesize gyro readings for consumers that need them
                self.gyro = Vec3::new(-rad_gyro.y, rad_gyro.x, -rad_gyro.z);
                self.update_rotation(elapsed_us);
            }
        }

        let gx = rad_gyro.y;
        let gy = rad_gyro.x;
        let gz = rad_gyro.z;

        // Integrate rate of change of the quaternion
        let half_period = 0.5 * sample_period;
        let (pa, pb, pc) = (q2, q3, q4);
        q1 += (-q2 * gx - q3 * gy - q4 * gz) * half_period;
        q2 = pa + (q1 * gx + pb * gz - pc * gy) * half_period;
        q3 = pb + (q1 * gy - pa * gz + pc * gx) * half_period;
        q4 = pc + (q1 * gz + pa * gy - pb * gx) * half_period;

        self.quat = Quaternion {
            w: q1,
            x: q2,
            y: q3,
            z: q4,
        }
        .normalized();
    }

    pub fn acceleration(&self) -> Vec3 {
        self.accel
    }

    pub fn gyroscope(&self) -> Vec3 {
        self.gyro
    }

    pub fn rotations(&self) -> Vec3 {
        self.rotations
    }

    /// Orientation as three basis vectors in the console's axis convention
    pub fn orientation(&self) -> [Vec3; 3] {
        let remapped = Quaternion {
            w: -self.quat.z,
            x: -self.quat.y,
            y: -self.quat.x,
            z: -self.quat.w,
        };
        let m = remapped.to_matrix();
        [
            Vec3::new(m[0][0], m[0][1], -m[0][2]),
            Vec3::new(m[1][0], m[1][1], -m[1][2]),
            Vec3::new(-m[2][0], -m[2][1], m[2][2]),
        ]
    }

    /// Whether the sensor is rotating faster than `sensitivity` or not
    /// measuring a steady 1g
    pub fn is_moving(&self, sensitivity: f32) -> bool {
        let accel_length = self.accel.length();
        self.gyro.length() >= sensitivity || accel_length <= 0.9 || accel_length >= 1.1
    }

    /// Whether the gravity error is below `sensitivity`
    pub fn is_calibrated(&self, sensitivity: f32) -> bool {
        self.real_error.length() < sensitivity
    }

    pub fn reset_rotations(&mut self) {
        self.rotations = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resting() -> MotionInput {
        let mut motion = MotionInput::default();
        motion.set_acceleration(Vec3::new(0.0, 0.0, -1.0));
        motion.set_gyroscope(Vec3::ZERO);
        motion
    }

    #[test]
    fn test_resting_sensor_is_not_moving() {
        let motion = resting();
        assert!(!motion.is_moving(0.01));
    }

    #[test]
    fn test_free_fall_is_moving() {
        let mut motion = resting();
        motion.set_acceleration(Vec3::new(0.0, 0.0, -0.2));
        assert!(motion.is_moving(0.01));
    }

    #[test]
    fn test_rotation_accumulates() {
        let mut motion = resting();
        motion.set_gyroscope(Vec3::new(0.0, 0.0, 1.0));
        for _ in 0..10 {
            motion.update_rotation(10_000);
        }
        assert!((motion.rotations().z - 0.1).abs() < 1e-4);
        assert!(motion.is_moving(0.01));
    }

    #[test]
    fn test_stale_sample_is_ignored() {
        let mut motion = resting();
        motion.set_gyroscope(Vec3::new(1.0, 0.0, 0.0));
        motion.update_rotation(500_000);
        assert_eq!(motion.rotations(), Vec3::ZERO);
    }

    #[test]
    fn test_gyro_noise_floor() {
        let mut motion = resting();
        motion.set_gyroscope(Vec3::new(0.01, 0.01, 0.01));
        assert_eq!(motion.gyroscope(), Vec3::ZERO);
    }

    #[test]
    fn test_orientation_stays_orthonormal() {
        let mut motion = resting();
        motion.set_gyroscope(Vec3::new(0.3, -0.2, 0.5));
        for _ in 0..200 {
            motion.update_orientation(5_000);
        }
        for axis in motion.orientation() {
            assert!((axis.length() - 1.0).abs() < 1e-3);
        }
    }
}
