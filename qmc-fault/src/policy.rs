use std::sync::Mutex;

use qmc_datahub::{MotorId, MAX_MOTORS};

/// The operator-configured immediate-stop matrix: `cell(fault, victim)`
/// is true when a fault on `fault` motor should also stop `victim` motor
/// (spec §4.3 "stop-policy matrix"; `fault_get_immediate_stop_config`).
/// A motor always stops itself; cross-motor cells default to false.
pub struct StopPolicy {
    matrix: Mutex<[[bool; MAX_MOTORS]; MAX_MOTORS]>,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self { matrix: Mutex::new([[false; MAX_MOTORS]; MAX_MOTORS]) }
    }
}

impl StopPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// `fault_get_immediate_stop_config`: true for `fault == victim`
    /// unconditionally (a faulted motor always stops itself), or per the
    /// configured cell otherwise.
    pub fn should_stop(&self, fault_motor: MotorId, victim_motor: MotorId) -> bool {
        if fault_motor == victim_motor {
            return true;
        }
        self.matrix.lock().unwrap()[fault_motor.get() as usize][victim_motor.get() as usize]
    }

    pub fn set(&self, fault_motor: MotorId, victim_motor: MotorId, stop: bool) {
        self.matrix.lock().unwrap()[fault_motor.get() as usize][victim_motor.get() as usize] = stop;
    }

    /// Every motor that should stop when `fault_motor` faults, including
    /// itself.
    pub fn affected_motors(&self, fault_motor: MotorId) -> Vec<MotorId> {
        MotorId::all().filter(|&m| self.should_stop(fault_motor, m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_stop_is_always_true() {
        let policy = StopPolicy::new();
        let m = MotorId::new(2).unwrap();
        assert!(policy.should_stop(m, m));
    }

    #[test]
    fn cross_motor_defaults_to_false_until_configured() {
        let policy = StopPolicy::new();
        let a = MotorId::new(0).unwrap();
        let b = MotorId::new(1).unwrap();
        assert!(!policy.should_stop(a, b));
        policy.set(a, b, true);
        assert!(policy.should_stop(a, b));
    }

    #[test]
    fn affected_motors_includes_self_and_configured_victims() {
        let policy = StopPolicy::new();
        let a = MotorId::new(0).unwrap();
        let c = MotorId::new(2).unwrap();
        policy.set(a, c, true);
        let affected = policy.affected_motors(a);
        assert!(affected.contains(&a));
        assert!(affected.contains(&c));
        assert_eq!(affected.len(), 2);
    }
}
